//! Global Descriptor Table and stack configuration.

/// Number of 8-byte slots in the GDT: five segments plus the two-slot TSS descriptor.
pub const GDT_ENTRIES: usize = 7;

pub const NULL_INDEX: u16 = 0;
pub const KERNEL_CODE_INDEX: u16 = 1;
pub const KERNEL_DATA_INDEX: u16 = 2;
pub const USER_CODE_INDEX: u16 = 3;
pub const USER_DATA_INDEX: u16 = 4;
pub const TSS_INDEX: u16 = 5;

/// Selector of the kernel code segment, loaded into CS and written into every IDT gate.
pub const KERNEL_CODE_SELECTOR: u16 = KERNEL_CODE_INDEX * 8;
pub const KERNEL_DATA_SELECTOR: u16 = KERNEL_DATA_INDEX * 8;

/// Limit used by every flat segment; with 4 KiB granularity this spans 4 GiB.
pub const FLAT_LIMIT: u32 = 0xF_FFFF;

// Access bytes
pub const ACCESS_KERNEL_CODE: u8 = 0x9A;
pub const ACCESS_KERNEL_DATA: u8 = 0x92;
pub const ACCESS_USER_CODE: u8 = 0xFA;
pub const ACCESS_USER_DATA: u8 = 0xF2;
/// Present, DPL 0, available 64-bit TSS.
pub const ACCESS_TSS: u8 = 0x89;

// Upper nibble of the granularity byte
pub const FLAGS_CODE64: u8 = 0xA; // 4 KiB granularity + long mode
pub const FLAGS_DATA: u8 = 0xC; // 4 KiB granularity + 32-bit default size

/// IST slots (1-based, as written into an IDT gate).
pub const NMI_IST_INDEX: u8 = 1;
pub const DOUBLE_FAULT_IST_INDEX: u8 = 2;
pub const STACK_FAULT_IST_INDEX: u8 = 3;
pub const INVALID_TSS_IST_INDEX: u8 = 4;

/// Number of dedicated stacks carved for IST-isolated vectors.
pub const IST_STACK_COUNT: usize = 4;

/// Size of each IST stack in bytes.
/// Set to 16KB (4 pages) to handle deep call stacks during faults.
pub const IST_STACK_SIZE: usize = 4096 * 4;
