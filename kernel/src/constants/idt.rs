//! Interrupt Descriptor Table configuration.

pub const IDT_ENTRIES: usize = 256;

/// Vectors covered by the fixed dispatch table (exceptions plus remapped IRQ lines).
pub const DISPATCH_VECTORS: usize = 48;

/// First vector used by remapped hardware IRQ lines.
pub const IRQ_BASE_VECTOR: u8 = 32;
pub const IRQ_LINES: u8 = 16;

/// Vector number assigned to the timer interrupt.
pub const TIMER_VECTOR: u8 = IRQ_BASE_VECTOR;
pub const KEYBOARD_VECTOR: u8 = IRQ_BASE_VECTOR + 1;
pub const SPURIOUS_VECTOR: u8 = 0xFF;

/// Present, DPL 0, 64-bit interrupt gate.
pub const GATE_INTERRUPT: u8 = 0x8E;

/// Default IRQ0 rate on the legacy timer path.
pub const TIMER_FREQUENCY_HZ: u32 = 100;
