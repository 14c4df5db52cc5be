//! x86_64 long-mode interrupt subsystem for the vOS kernel: descriptor
//! tables, IST stacks, exception and IRQ dispatch, the legacy 8259 pair or
//! the local APIC, and the single MMIO mapping the APIC needs.
//!
//! The boot entry point installs the logger and then runs
//! [`interrupts::init`] (or its individual steps in order).

#![feature(abi_x86_interrupt)]
#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

use x86_64::instructions::hlt;

pub mod config;
pub mod constants;
pub mod cpu;
pub mod devices;
pub mod interrupts;
pub mod logging;
pub mod memory;

#[cfg(test)]
pub(crate) mod testing;

pub use devices::serial;

/// Parks the processor. Interrupts stay in whatever state the caller left them.
pub fn idle_loop() -> ! {
    loop {
        hlt();
    }
}
