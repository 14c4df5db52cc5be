//! Raw byte-wide port I/O.
//!
//! Everything that touches an I/O port goes through [`PortIo`] so the
//! controller and device code can be driven by a simulated bus in tests.

use x86_64::instructions::port::Port;

use crate::constants::ports::IO_WAIT;

pub trait PortIo {
    fn read_u8(&mut self, port: u16) -> u8;
    fn write_u8(&mut self, port: u16, value: u8);

    /// Gives an old device roughly a microsecond to process the previous write.
    fn io_wait(&mut self) {
        self.write_u8(IO_WAIT, 0);
    }
}

/// The processor's real I/O address space.
#[derive(Debug)]
pub struct HardwarePorts {
    _private: (),
}

impl HardwarePorts {
    /// # Safety
    ///
    /// Port writes reprogram hardware behind the compiler's back. The caller
    /// must own the devices it is about to talk to.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl PortIo for HardwarePorts {
    #[inline]
    fn read_u8(&mut self, port: u16) -> u8 {
        unsafe { Port::<u8>::new(port).read() }
    }

    #[inline]
    fn write_u8(&mut self, port: u16, value: u8) {
        unsafe { Port::<u8>::new(port).write(value) }
    }
}
