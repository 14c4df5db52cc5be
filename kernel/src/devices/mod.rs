//! Devices the interrupt subsystem talks to directly.
//!
//! - Serial port for diagnostics output
//! - Raw port I/O shared by the PIC, PIT and keyboard
//! - PS/2 keyboard scancode translation
//! - Legacy programmable interval timer

pub mod keyboard;
pub mod pit;
pub mod port;
pub mod serial;
