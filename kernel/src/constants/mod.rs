//! System-wide constants and hardware-specific values.

pub mod apic;
pub mod gdt;
pub mod idt;
pub mod memory;
pub mod ports;
