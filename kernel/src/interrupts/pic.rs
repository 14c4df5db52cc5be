//! Cascaded 8259 programmable interrupt controllers.
//!
//! The master chip serves lines 0-7 and receives the slave on its input 2;
//! the slave serves lines 8-15. Both are remapped to vectors 32-47 so
//! they never collide with processor exceptions.

use crate::constants::{
    idt::IRQ_BASE_VECTOR,
    ports::{PIC_MASTER_COMMAND, PIC_MASTER_DATA, PIC_SLAVE_COMMAND, PIC_SLAVE_DATA},
};
use crate::devices::port::PortIo;
use crate::interrupts::controller::{ControllerError, InterruptController};
use crate::interrupts::irq::IrqLine;

const ICW1_INIT: u8 = 0x11;
const ICW4_8086: u8 = 0x01;
const MASTER_CASCADE: u8 = 0x04; // slave on IR2
const SLAVE_CASCADE: u8 = 0x02;
const EOI: u8 = 0x20;
const OCW3_READ_ISR: u8 = 0x0B;
/// Lowest-priority input of each chip, where spurious requests show up.
const SPURIOUS_INPUT: u8 = 7;
const ALL_MASKED: u8 = 0xFF;

#[derive(Debug)]
pub struct ChainedPic<P> {
    ports: P,
    master_offset: u8,
    slave_offset: u8,
}

impl<P: PortIo> ChainedPic<P> {
    /// Master on vectors 32-39, slave on 40-47.
    pub const fn new(ports: P) -> Self {
        Self {
            ports,
            master_offset: IRQ_BASE_VECTOR,
            slave_offset: IRQ_BASE_VECTOR + 8,
        }
    }

    pub fn ports(&self) -> &P {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut P {
        &mut self.ports
    }

    fn write(&mut self, port: u16, value: u8) {
        self.ports.write_u8(port, value);
        self.ports.io_wait();
    }

    /// Runs the four-word initialization on both chips and leaves every
    /// line masked.
    pub fn initialize(&mut self) {
        self.write(PIC_MASTER_COMMAND, ICW1_INIT);
        self.write(PIC_SLAVE_COMMAND, ICW1_INIT);

        self.write(PIC_MASTER_DATA, self.master_offset);
        self.write(PIC_SLAVE_DATA, self.slave_offset);

        self.write(PIC_MASTER_DATA, MASTER_CASCADE);
        self.write(PIC_SLAVE_DATA, SLAVE_CASCADE);

        self.write(PIC_MASTER_DATA, ICW4_8086);
        self.write(PIC_SLAVE_DATA, ICW4_8086);

        self.mask_all();
    }

    pub fn mask_all(&mut self) {
        self.set_masks(ALL_MASKED, ALL_MASKED);
    }

    /// Current interrupt mask registers as (master, slave).
    pub fn masks(&mut self) -> (u8, u8) {
        (
            self.ports.read_u8(PIC_MASTER_DATA),
            self.ports.read_u8(PIC_SLAVE_DATA),
        )
    }

    pub fn set_masks(&mut self, master: u8, slave: u8) {
        self.ports.write_u8(PIC_MASTER_DATA, master);
        self.ports.write_u8(PIC_SLAVE_DATA, slave);
    }

    /// Read-modify-write of the one mask register owning `line`. Unmasking
    /// a slave line also opens the cascade input on the master.
    pub fn set_line_masked(&mut self, line: IrqLine, masked: bool) {
        let (port, bit) = if line.is_slave() {
            (PIC_SLAVE_DATA, line.index() - 8)
        } else {
            (PIC_MASTER_DATA, line.index())
        };

        let current = self.ports.read_u8(port);
        let value = if masked {
            current | (1 << bit)
        } else {
            current & !(1 << bit)
        };
        self.ports.write_u8(port, value);

        if line.is_slave() && !masked {
            self.set_line_masked(IrqLine::CASCADE, false);
        }
    }

    /// In-service registers as (master, slave).
    pub fn in_service(&mut self) -> (u8, u8) {
        self.ports.write_u8(PIC_MASTER_COMMAND, OCW3_READ_ISR);
        self.ports.write_u8(PIC_SLAVE_COMMAND, OCW3_READ_ISR);
        (
            self.ports.read_u8(PIC_MASTER_COMMAND),
            self.ports.read_u8(PIC_SLAVE_COMMAND),
        )
    }

    /// A request on a chip's input 7 whose in-service bit is clear was
    /// withdrawn before the acknowledge cycle. The master still counts the
    /// cascade input as in service for a spurious slave request, so it gets
    /// its EOI here.
    pub fn is_spurious(&mut self, line: IrqLine) -> bool {
        if line.index() % 8 != SPURIOUS_INPUT {
            return false;
        }
        let (master, slave) = self.in_service();
        let isr = if line.is_slave() { slave } else { master };
        if isr & (1 << SPURIOUS_INPUT) != 0 {
            return false;
        }
        if line.is_slave() {
            self.ports.write_u8(PIC_MASTER_COMMAND, EOI);
        }
        true
    }

    pub fn handles_vector(&self, vector: u8) -> bool {
        (self.master_offset..self.slave_offset + 8).contains(&vector)
    }

    /// Acknowledges `line`: the slave first when it raised the line, then
    /// always the master.
    pub fn notify_end_of_interrupt(&mut self, line: IrqLine) {
        if line.is_slave() {
            self.ports.write_u8(PIC_SLAVE_COMMAND, EOI);
        }
        self.ports.write_u8(PIC_MASTER_COMMAND, EOI);
    }
}

impl<P: PortIo> InterruptController for ChainedPic<P> {
    fn init(&mut self) -> Result<(), ControllerError> {
        self.initialize();
        Ok(())
    }

    fn end_of_interrupt(&mut self, line: IrqLine) {
        self.notify_end_of_interrupt(line);
    }

    fn set_masked(&mut self, line: IrqLine, masked: bool) -> Result<(), ControllerError> {
        self.set_line_masked(line, masked);
        Ok(())
    }

    fn check_spurious(&mut self, line: IrqLine) -> bool {
        self.is_spurious(line)
    }

    fn vector_for(&self, line: IrqLine) -> Result<u8, ControllerError> {
        let offset = if line.is_slave() {
            self.slave_offset + line.index() - 8
        } else {
            self.master_offset + line.index()
        };
        Ok(offset)
    }
}
