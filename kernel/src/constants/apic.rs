//! Local APIC configuration constants.

/// Model-specific register holding the APIC physical base and global enable bit.
pub const APIC_BASE_MSR: u32 = 0x1B;
pub const APIC_BASE_ENABLE: u64 = 1 << 11;
/// Bits of the base MSR holding the register block's physical page.
pub const APIC_BASE_ADDRESS_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// Power-on register block address; firmware may relocate it.
pub const APIC_PHYS_BASE: u64 = 0xFEE0_0000;
pub const APIC_VIRT_BASE: u64 = 0xFFFF_FFFF_FEE0_0000;

// Register offsets from the MMIO base; each register is 32 bits wide at a 0x10 stride.
pub const APIC_ID: u32 = 0x20;
pub const APIC_EOI: u32 = 0xB0;
pub const APIC_SPURIOUS: u32 = 0xF0;
pub const APIC_LVT_TIMER: u32 = 0x320;
pub const APIC_TIMER_INIT: u32 = 0x380;
pub const APIC_TIMER_DIV: u32 = 0x3E0;

pub const SPURIOUS_ENABLE: u32 = 1 << 8;
pub const LVT_MASKED: u32 = 1 << 16;
pub const LVT_TIMER_PERIODIC: u32 = 1 << 17;

/// Initial count loaded into the APIC timer when none is configured.
pub const DEFAULT_TIMER_INITIAL_COUNT: u32 = 0x0010_0000;
