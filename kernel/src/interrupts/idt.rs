//! Interrupt Descriptor Table.
//!
//! This module provides:
//! - Gate encoding and decoding over plain integers
//! - The 256-entry table, defaulted so every vector traps somewhere
//! - Installation of the fixed dispatch bindings for vectors 0-47

use spin::Mutex;
use x86_64::instructions::tables::lidt;
use x86_64::structures::DescriptorTablePointer;
use x86_64::VirtAddr;

use crate::constants::{
    gdt::KERNEL_CODE_SELECTOR,
    idt::{DISPATCH_VECTORS, GATE_INTERRUPT, IDT_ENTRIES},
};
use crate::interrupts::dispatch::{binding, VectorBinding};
use crate::interrupts::stubs;

const GATE_PRESENT: u8 = 1 << 7;

/// One interrupt gate in decoded form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdtGate {
    pub handler: u64,
    pub selector: u16,
    /// 0 keeps the current stack, 1-7 switch to that TSS IST slot.
    pub ist: u8,
    pub type_attr: u8,
}

impl IdtGate {
    pub const MISSING: Self = Self {
        handler: 0,
        selector: 0,
        ist: 0,
        type_attr: 0,
    };

    /// Present ring-0 interrupt gate through the kernel code segment.
    pub const fn interrupt(handler: u64) -> Self {
        Self {
            handler,
            selector: KERNEL_CODE_SELECTOR,
            ist: 0,
            type_attr: GATE_INTERRUPT,
        }
    }

    pub const fn with_ist(mut self, ist: u8) -> Self {
        self.ist = ist & 0x7;
        self
    }

    pub const fn encode(self) -> [u64; 2] {
        let handler = self.handler;
        let low = (handler & 0xFFFF)
            | (self.selector as u64) << 16
            | ((self.ist & 0x7) as u64) << 32
            | (self.type_attr as u64) << 40
            | ((handler >> 16) & 0xFFFF) << 48;
        [low, handler >> 32]
    }

    pub const fn decode(raw: [u64; 2]) -> Self {
        let low = raw[0];
        Self {
            handler: (low & 0xFFFF) | ((low >> 48) & 0xFFFF) << 16 | (raw[1] & 0xFFFF_FFFF) << 32,
            selector: (low >> 16) as u16,
            ist: ((low >> 32) & 0x7) as u8,
            type_attr: (low >> 40) as u8,
        }
    }

    pub const fn is_present(&self) -> bool {
        self.type_attr & GATE_PRESENT != 0
    }

    pub const fn privilege(&self) -> u8 {
        (self.type_attr >> 5) & 0x3
    }

    /// 0xE for an interrupt gate, 0xF for a trap gate.
    pub const fn gate_type(&self) -> u8 {
        self.type_attr & 0xF
    }
}

#[derive(Clone)]
#[repr(C, align(16))]
pub struct Idt {
    entries: [[u64; 2]; IDT_ENTRIES],
}

impl Idt {
    pub const fn new() -> Self {
        Self {
            entries: [IdtGate::MISSING.encode(); IDT_ENTRIES],
        }
    }

    pub fn set(&mut self, vector: u8, gate: IdtGate) {
        self.entries[usize::from(vector)] = gate.encode();
    }

    pub fn gate(&self, vector: u8) -> IdtGate {
        IdtGate::decode(self.entries[usize::from(vector)])
    }

    /// Points every vector at its own "unhandled vector" stub.
    pub fn fill_default(&mut self) {
        for vector in 0..=u8::MAX {
            self.set(vector, IdtGate::interrupt(stubs::unhandled_handler(vector)));
        }
    }

    /// Overwrites the populated exception and IRQ vectors with their
    /// handlers and IST requirements.
    pub fn install_dispatch(&mut self) {
        for vector in 0..DISPATCH_VECTORS as u8 {
            let gate = match binding(vector) {
                VectorBinding::Exception(exception) => {
                    let gate = IdtGate::interrupt(stubs::exception_handler(exception.exception));
                    match exception.ist {
                        Some(slot) => gate.with_ist(slot.index()),
                        None => gate,
                    }
                }
                VectorBinding::Irq(line) => IdtGate::interrupt(stubs::irq_handler(line)),
                VectorBinding::Unhandled => continue,
            };
            self.set(vector, gate);
        }
    }

    fn pointer(&'static self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (IDT_ENTRIES * 16 - 1) as u16,
            base: VirtAddr::from_ptr(self.entries.as_ptr()),
        }
    }
}

impl Default for Idt {
    fn default() -> Self {
        Self::new()
    }
}

/// The live table. The processor reads gates straight out of this memory,
/// so vectors can be installed after `lidt` as long as interrupts are off.
static IDT: Mutex<Idt> = Mutex::new(Idt::new());

/// Fills all 256 gates with their defaults and loads the table.
pub(crate) fn build_idt() {
    let mut idt = IDT.lock();
    idt.fill_default();

    let table: &'static Idt = unsafe { &*(&*idt as *const Idt) };
    unsafe { lidt(&table.pointer()) };

    log::debug!("idt: {} default gates loaded", IDT_ENTRIES);
}

/// Installs the fixed exception and IRQ bindings into the live table.
pub(crate) fn install_dispatch_table() {
    IDT.lock().install_dispatch();
    log::debug!("idt: dispatch table installed for vectors 0-{}", DISPATCH_VECTORS - 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn populated_idt() -> Idt {
        let mut idt = Idt::new();
        idt.fill_default();
        idt.install_dispatch();
        idt
    }

    #[test]
    fn gate_encoding_splits_handler_address() {
        let gate = IdtGate::interrupt(0xFFFF_8000_1234_5678).with_ist(3);
        let [low, high] = gate.encode();

        assert_eq!(low & 0xFFFF, 0x5678);
        assert_eq!((low >> 16) & 0xFFFF, 0x08);
        assert_eq!((low >> 32) & 0xFF, 3);
        assert_eq!((low >> 40) & 0xFF, 0x8E);
        assert_eq!(low >> 48, 0x1234);
        assert_eq!(high, 0xFFFF_8000);
        assert_eq!(IdtGate::decode([low, high]), gate);
    }

    #[test]
    fn default_gates_are_present_kernel_interrupt_gates() {
        let mut idt = Idt::new();
        idt.fill_default();

        for vector in 0..=u8::MAX {
            let gate = idt.gate(vector);
            assert!(gate.is_present(), "vector {vector}");
            assert_eq!(gate.gate_type(), 0xE);
            assert_eq!(gate.privilege(), 0);
            assert_eq!(gate.selector, KERNEL_CODE_SELECTOR);
            assert_eq!(gate.ist, 0);
            assert_ne!(gate.handler, 0);
        }
    }

    #[test]
    fn no_two_vectors_share_a_handler() {
        let idt = populated_idt();
        let handlers: HashSet<u64> = (0..=u8::MAX).map(|v| idt.gate(v).handler).collect();
        assert_eq!(handlers.len(), IDT_ENTRIES);
    }

    #[test]
    fn unpopulated_vectors_stay_on_unhandled_stubs() {
        let idt = populated_idt();
        let mut exceptions = 0;
        let mut irqs = 0;

        for vector in 0..=u8::MAX {
            let handler = idt.gate(vector).handler;
            let unhandled = stubs::unhandled_handler(vector);
            match binding(vector) {
                VectorBinding::Exception(_) => {
                    exceptions += 1;
                    assert_ne!(handler, unhandled, "vector {vector}");
                }
                VectorBinding::Irq(_) => {
                    irqs += 1;
                    assert_ne!(handler, unhandled, "vector {vector}");
                }
                VectorBinding::Unhandled => assert_eq!(handler, unhandled, "vector {vector}"),
            }
        }

        assert_eq!(exceptions, 20);
        assert_eq!(irqs, 16);
    }

    #[test]
    fn ist_only_on_isolated_vectors() {
        let idt = populated_idt();
        for vector in 0..=u8::MAX {
            let ist = idt.gate(vector).ist;
            match vector {
                2 | 8 | 10 | 12 => assert_ne!(ist, 0, "vector {vector}"),
                _ => assert_eq!(ist, 0, "vector {vector}"),
            }
        }
    }
}
