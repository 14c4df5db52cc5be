//! Simulated hardware for host-run unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};

use x86_64::{structures::paging::PageTableFlags, PhysAddr, VirtAddr};

use crate::constants::apic::{
    APIC_EOI, APIC_LVT_TIMER, APIC_SPURIOUS, APIC_TIMER_INIT, LVT_MASKED, SPURIOUS_ENABLE,
};
use crate::constants::memory::{ENTRY_ADDRESS_MASK, HUGE_PAGE_SIZE};
use crate::constants::ports::{
    IO_WAIT, PIC_MASTER_COMMAND, PIC_MASTER_DATA, PIC_SLAVE_COMMAND, PIC_SLAVE_DATA,
};
use crate::devices::port::PortIo;
use crate::devices::serial::ConsoleSink;
use crate::interrupts::apic::{ApicRegisters, ModelSpecificRegisters};
use crate::interrupts::controller::{ControllerError, InterruptController};
use crate::interrupts::irq::IrqLine;
use crate::memory::tlb::TranslationCache;
use crate::memory::PhysMemory;

/// Port bus that logs every access. Reads return queued values first, then
/// the last value written to the port, then 0.
#[derive(Debug, Default)]
pub struct RecordingPorts {
    pub writes: Vec<(u16, u8)>,
    pub reads: Vec<u16>,
    queued: HashMap<u16, VecDeque<u8>>,
}

impl RecordingPorts {
    pub fn queue_read(&mut self, port: u16, value: u8) {
        self.queued.entry(port).or_default().push_back(value);
    }
}

impl PortIo for RecordingPorts {
    fn read_u8(&mut self, port: u16) -> u8 {
        self.reads.push(port);
        if let Some(value) = self.queued.get_mut(&port).and_then(VecDeque::pop_front) {
            return value;
        }
        self.writes
            .iter()
            .rev()
            .find(|(p, _)| *p == port)
            .map_or(0, |&(_, value)| value)
    }

    fn write_u8(&mut self, port: u16, value: u8) {
        self.writes.push((port, value));
    }
}

/// One 8259: tracks the initialization words, the mask and in-service
/// registers and acknowledgements.
#[derive(Debug, Default)]
struct Chip {
    /// Data-port words still expected from the ICW sequence.
    pending_icw: u8,
    initialized: bool,
    offset: u8,
    imr: u8,
    isr: u8,
    /// OCW3 selected the in-service register for command-port reads.
    read_isr: bool,
    eois: usize,
}

impl Chip {
    fn command(&mut self, value: u8) {
        if value & 0x10 != 0 {
            // ICW1 with ICW4 requested: vector offset, cascade, mode follow.
            self.pending_icw = 3;
            self.initialized = false;
            self.isr = 0;
        } else if value == 0x0B {
            self.read_isr = true;
        } else if value == 0x0A {
            self.read_isr = false;
        } else if value == 0x20 {
            // Non-specific EOI retires the highest-priority request.
            self.isr &= self.isr.wrapping_sub(1);
            self.eois += 1;
        }
    }

    fn data(&mut self, value: u8) {
        match self.pending_icw {
            3 => self.offset = value,
            2 => {}
            1 => self.initialized = true,
            _ => {
                self.imr = value;
                return;
            }
        }
        self.pending_icw -= 1;
    }

    fn status(&self) -> u8 {
        // The request register is not modelled.
        if self.read_isr {
            self.isr
        } else {
            0
        }
    }

    fn accepts(&self, input: u8) -> bool {
        self.initialized && self.imr & (1 << input) == 0
    }
}

/// A master/slave 8259 pair on the real port numbers. Other ports are
/// logged in `other_writes`; the I/O delay port is ignored.
#[derive(Debug, Default)]
pub struct Sim8259 {
    master: Chip,
    slave: Chip,
    pub master_eois: usize,
    pub slave_eois: usize,
    pub other_writes: Vec<(u16, u8)>,
}

impl Sim8259 {
    /// Asserts input `line` and returns the vector the processor would
    /// receive, or `None` if the line is masked anywhere on its path. A
    /// delivered request stays in service until its EOI.
    pub fn raise(&mut self, line: u8) -> Option<u8> {
        if line < 8 {
            if !self.master.accepts(line) {
                return None;
            }
            self.master.isr |= 1 << line;
            Some(self.master.offset + line)
        } else {
            let input = line - 8;
            if !(self.slave.accepts(input) && self.master.accepts(2)) {
                return None;
            }
            self.slave.isr |= 1 << input;
            self.master.isr |= 1 << 2;
            Some(self.slave.offset + input)
        }
    }
}

impl PortIo for Sim8259 {
    fn read_u8(&mut self, port: u16) -> u8 {
        match port {
            PIC_MASTER_COMMAND => self.master.status(),
            PIC_MASTER_DATA => self.master.imr,
            PIC_SLAVE_COMMAND => self.slave.status(),
            PIC_SLAVE_DATA => self.slave.imr,
            _ => 0,
        }
    }

    fn write_u8(&mut self, port: u16, value: u8) {
        match port {
            PIC_MASTER_COMMAND => self.master.command(value),
            PIC_MASTER_DATA => self.master.data(value),
            PIC_SLAVE_COMMAND => self.slave.command(value),
            PIC_SLAVE_DATA => self.slave.data(value),
            IO_WAIT => {}
            _ => self.other_writes.push((port, value)),
        }
        self.master_eois = self.master.eois;
        self.slave_eois = self.slave.eois;
    }
}

/// Local APIC register file with a timer that can be fired by hand.
#[derive(Debug, Default)]
pub struct SimApic {
    regs: BTreeMap<u32, u32>,
    writes: Vec<u32>,
    pub eoi_writes: usize,
    pub delivered: usize,
    pub in_service: Option<u8>,
}

impl SimApic {
    /// Register offsets in the order they were written.
    pub fn write_order(&self) -> Vec<u32> {
        self.writes.clone()
    }

    /// Lets the timer expire once. Delivers only when the APIC is
    /// software-enabled and the timer is unmasked and armed.
    pub fn fire_timer(&mut self) -> Option<u8> {
        let spurious = self.read(APIC_SPURIOUS);
        let lvt = self.read(APIC_LVT_TIMER);
        let count = self.read(APIC_TIMER_INIT);
        if spurious & SPURIOUS_ENABLE == 0 || lvt & LVT_MASKED != 0 || count == 0 {
            return None;
        }
        let vector = (lvt & 0xFF) as u8;
        self.delivered += 1;
        self.in_service = Some(vector);
        Some(vector)
    }
}

impl ApicRegisters for SimApic {
    fn read(&self, offset: u32) -> u32 {
        self.regs.get(&offset).copied().unwrap_or(0)
    }

    fn write(&mut self, offset: u32, value: u32) {
        self.writes.push(offset);
        if offset == APIC_EOI {
            // Retires the in-service interrupt, if any; never raises one.
            self.eoi_writes += 1;
            self.in_service = None;
        }
        self.regs.insert(offset, value);
    }
}

#[derive(Debug, Default)]
pub struct SimMsr {
    values: HashMap<u32, u64>,
}

impl ModelSpecificRegisters for SimMsr {
    fn read(&self, msr: u32) -> u64 {
        self.values.get(&msr).copied().unwrap_or(0)
    }

    fn write(&mut self, msr: u32, value: u64) {
        self.values.insert(msr, value);
    }
}

/// Sparse byte-addressed physical memory, zero where never written.
#[derive(Debug, Default)]
pub struct SimMemory {
    bytes: HashMap<u64, u8>,
}

impl SimMemory {
    pub fn read_u8(&self, phys: PhysAddr) -> u8 {
        self.bytes.get(&phys.as_u64()).copied().unwrap_or(0)
    }

    pub fn write_u8(&mut self, phys: PhysAddr, value: u8) {
        self.bytes.insert(phys.as_u64(), value);
    }
}

impl PhysMemory for SimMemory {
    fn read_u64(&self, phys: PhysAddr) -> u64 {
        let mut raw = [0u8; 8];
        for (i, byte) in raw.iter_mut().enumerate() {
            *byte = self.read_u8(phys + i as u64);
        }
        u64::from_le_bytes(raw)
    }

    fn write_u64(&mut self, phys: PhysAddr, value: u64) {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.write_u8(phys + i as u64, byte);
        }
    }
}

/// Page walker for 2 MiB mappings with a translation cache that is only
/// dropped by an explicit flush.
#[derive(Debug)]
pub struct SimMmu {
    pml4: PhysAddr,
    tlb: HashMap<u64, u64>,
    pub flushes: usize,
}

impl SimMmu {
    pub fn new(pml4: PhysAddr) -> Self {
        Self {
            pml4,
            tlb: HashMap::new(),
            flushes: 0,
        }
    }

    fn walk(&self, mem: &SimMemory, virt: VirtAddr) -> Option<u64> {
        let present = PageTableFlags::PRESENT.bits();

        let pml4e = mem.read_u64(self.pml4 + u64::from(virt.p4_index()) * 8);
        if pml4e & present == 0 {
            return None;
        }
        let pdpt = PhysAddr::new(pml4e & ENTRY_ADDRESS_MASK);
        let pdpte = mem.read_u64(pdpt + u64::from(virt.p3_index()) * 8);
        if pdpte & present == 0 {
            return None;
        }
        let pd = PhysAddr::new(pdpte & ENTRY_ADDRESS_MASK);
        let pde = mem.read_u64(pd + u64::from(virt.p2_index()) * 8);
        let huge = PageTableFlags::HUGE_PAGE.bits();
        if pde & present == 0 || pde & huge == 0 {
            return None;
        }
        Some(pde & ENTRY_ADDRESS_MASK & !(HUGE_PAGE_SIZE - 1))
    }

    /// Reads one byte through the virtual address, caching the translation.
    pub fn load_u8(&mut self, mem: &SimMemory, virt: VirtAddr) -> Option<u8> {
        let page = virt.as_u64() & !(HUGE_PAGE_SIZE - 1);
        let frame = match self.tlb.get(&page) {
            Some(&frame) => frame,
            None => {
                let frame = self.walk(mem, virt)?;
                self.tlb.insert(page, frame);
                frame
            }
        };
        let offset = virt.as_u64() & (HUGE_PAGE_SIZE - 1);
        Some(mem.read_u8(PhysAddr::new(frame + offset)))
    }
}

impl TranslationCache for SimMmu {
    fn flush_all(&mut self) {
        self.tlb.clear();
        self.flushes += 1;
    }
}

/// Controller that only records completions.
#[derive(Debug, Default)]
pub struct MockController {
    pub completions: Vec<IrqLine>,
}

impl InterruptController for MockController {
    fn init(&mut self) -> Result<(), ControllerError> {
        Ok(())
    }

    fn end_of_interrupt(&mut self, line: IrqLine) {
        self.completions.push(line);
    }

    fn set_masked(&mut self, _line: IrqLine, _masked: bool) -> Result<(), ControllerError> {
        Ok(())
    }

    fn vector_for(&self, line: IrqLine) -> Result<u8, ControllerError> {
        Ok(line.vector())
    }
}

#[derive(Debug, Default)]
pub struct CollectingConsole {
    pub output: String,
}

impl ConsoleSink for CollectingConsole {
    fn put_char(&mut self, c: char) {
        self.output.push(c);
    }
}
