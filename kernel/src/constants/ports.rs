//! I/O port definitions.

/// Base I/O port address for the first serial port (COM1).
pub const SERIAL_PORT: u16 = 0x3F8;

pub const PIC_MASTER_COMMAND: u16 = 0x20;
pub const PIC_MASTER_DATA: u16 = 0x21;
pub const PIC_SLAVE_COMMAND: u16 = 0xA0;
pub const PIC_SLAVE_DATA: u16 = 0xA1;

pub const KEYBOARD_DATA: u16 = 0x60;

pub const PIT_CHANNEL_0: u16 = 0x40;
pub const PIT_COMMAND: u16 = 0x43;

/// Unused POST diagnostic port; a write gives slow devices time to settle.
pub const IO_WAIT: u16 = 0x80;
