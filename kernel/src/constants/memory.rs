pub const PAGE_SIZE: u64 = 4096;
pub const HUGE_PAGE_SIZE: u64 = 0x20_0000;

/// Physical location of the bootloader's page-directory-pointer table.
pub const BOOT_PDPT: u64 = 0x4000;
/// Physical location of the bootloader's page directory.
pub const BOOT_PD: u64 = 0x5000;

/// Low physical memory holding the boot page tables is identity mapped.
pub const BOOT_IDENTITY_OFFSET: u64 = 0;

/// Mask extracting the physical frame address from a page-table entry.
pub const ENTRY_ADDRESS_MASK: u64 = 0x000F_FFFF_FFFF_F000;
