//! Local APIC in xAPIC (MMIO) mode.
//!
//! Registers are 32 bits wide at a 0x10 stride from the base the MMIO
//! bootstrap mapped. Only the timer is routed through the local vector
//! table; legacy lines stay on the (masked) 8259 pair.

use x86_64::registers::model_specific::Msr;
use x86_64::{PhysAddr, VirtAddr};

use crate::constants::apic::*;
use crate::constants::idt::{SPURIOUS_VECTOR, TIMER_VECTOR};
use crate::interrupts::controller::{ControllerError, InterruptController};
use crate::interrupts::irq::IrqLine;

/// Access to the memory-mapped register block.
pub trait ApicRegisters {
    fn read(&self, offset: u32) -> u32;
    fn write(&mut self, offset: u32, value: u32);
}

pub trait ModelSpecificRegisters {
    fn read(&self, msr: u32) -> u64;
    fn write(&mut self, msr: u32, value: u64);
}

/// Register block reached through a virtual mapping.
#[derive(Debug)]
pub struct MmioApic {
    base: VirtAddr,
}

impl MmioApic {
    /// # Safety
    ///
    /// `base` must map the APIC register page uncached for as long as this
    /// value lives.
    pub const unsafe fn new(base: VirtAddr) -> Self {
        Self { base }
    }

    fn register(&self, offset: u32) -> *mut u32 {
        (self.base + u64::from(offset)).as_mut_ptr()
    }
}

impl ApicRegisters for MmioApic {
    fn read(&self, offset: u32) -> u32 {
        unsafe { core::ptr::read_volatile(self.register(offset)) }
    }

    fn write(&mut self, offset: u32, value: u32) {
        unsafe { core::ptr::write_volatile(self.register(offset), value) }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HardwareMsr;

impl ModelSpecificRegisters for HardwareMsr {
    fn read(&self, msr: u32) -> u64 {
        unsafe { Msr::new(msr).read() }
    }

    fn write(&mut self, msr: u32, value: u64) {
        unsafe { Msr::new(msr).write(value) }
    }
}

/// Timer input clock divider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDivide {
    By1,
    By2,
    By4,
    By8,
    By16,
    By32,
    By64,
    By128,
}

impl TimerDivide {
    /// Value for the divide configuration register (bits 0, 1 and 3).
    pub const fn encoding(self) -> u32 {
        match self {
            TimerDivide::By1 => 0b1011,
            TimerDivide::By2 => 0b0000,
            TimerDivide::By4 => 0b0001,
            TimerDivide::By8 => 0b0010,
            TimerDivide::By16 => 0b0011,
            TimerDivide::By32 => 0b1000,
            TimerDivide::By64 => 0b1001,
            TimerDivide::By128 => 0b1010,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApicTimerConfig {
    pub vector: u8,
    pub divide: TimerDivide,
    pub initial_count: u32,
}

impl ApicTimerConfig {
    pub const fn new() -> Self {
        Self {
            vector: TIMER_VECTOR,
            divide: TimerDivide::By16,
            initial_count: DEFAULT_TIMER_INITIAL_COUNT,
        }
    }
}

impl Default for ApicTimerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Physical address of the register block named by a base MSR value.
pub const fn base_address(msr: u64) -> PhysAddr {
    PhysAddr::new_truncate(msr & APIC_BASE_ADDRESS_MASK)
}

#[derive(Debug)]
pub struct LocalApic<R, M> {
    regs: R,
    msr: M,
    timer: ApicTimerConfig,
}

impl<R: ApicRegisters, M: ModelSpecificRegisters> LocalApic<R, M> {
    pub const fn new(regs: R, msr: M, timer: ApicTimerConfig) -> Self {
        Self { regs, msr, timer }
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    pub fn msr(&self) -> &M {
        &self.msr
    }

    /// Register block address the firmware put in the base MSR.
    pub fn physical_base(&self) -> PhysAddr {
        base_address(self.msr.read(APIC_BASE_MSR))
    }

    /// Sets the global enable bit in the base MSR, keeping the physical
    /// base the firmware chose, then software-enables the APIC with the
    /// spurious vector.
    pub fn enable(&mut self) {
        let base = self.msr.read(APIC_BASE_MSR);
        self.msr.write(APIC_BASE_MSR, base | APIC_BASE_ENABLE);

        let spurious = self.regs.read(APIC_SPURIOUS) & !0xFF;
        self.regs.write(
            APIC_SPURIOUS,
            spurious | SPURIOUS_ENABLE | u32::from(SPURIOUS_VECTOR),
        );
    }

    /// Starts the periodic timer. The initial count goes last: writing it
    /// arms the counter.
    pub fn start_timer(&mut self) {
        self.regs.write(APIC_TIMER_DIV, self.timer.divide.encoding());
        self.regs.write(
            APIC_LVT_TIMER,
            u32::from(self.timer.vector) | LVT_TIMER_PERIODIC,
        );
        self.regs.write(APIC_TIMER_INIT, self.timer.initial_count);
    }

    pub fn id(&self) -> u8 {
        (self.regs.read(APIC_ID) >> 24) as u8
    }

    /// Completion is a write of 0 to the EOI register; no line identity.
    pub fn eoi(&mut self) {
        self.regs.write(APIC_EOI, 0);
    }
}

impl<R: ApicRegisters, M: ModelSpecificRegisters> InterruptController for LocalApic<R, M> {
    fn init(&mut self) -> Result<(), ControllerError> {
        self.enable();
        self.start_timer();
        log::debug!(
            "apic: id {} at {:#x} enabled, timer vector {} count {:#x}",
            self.id(),
            self.physical_base().as_u64(),
            self.timer.vector,
            self.timer.initial_count
        );
        Ok(())
    }

    fn end_of_interrupt(&mut self, _line: IrqLine) {
        self.eoi();
    }

    fn set_masked(&mut self, line: IrqLine, masked: bool) -> Result<(), ControllerError> {
        if line != IrqLine::TIMER {
            return Err(ControllerError::LineNotRoutable(line.index()));
        }
        let lvt = self.regs.read(APIC_LVT_TIMER);
        let lvt = if masked { lvt | LVT_MASKED } else { lvt & !LVT_MASKED };
        self.regs.write(APIC_LVT_TIMER, lvt);
        Ok(())
    }

    fn vector_for(&self, line: IrqLine) -> Result<u8, ControllerError> {
        if line == IrqLine::TIMER {
            Ok(self.timer.vector)
        } else {
            Err(ControllerError::LineNotRoutable(line.index()))
        }
    }
}
