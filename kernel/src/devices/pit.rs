//! Legacy 8253/8254 programmable interval timer, channel 0.
//!
//! On the legacy PIC path channel 0 drives IRQ0 at a fixed rate.

use crate::constants::ports::{PIT_CHANNEL_0, PIT_COMMAND};
use crate::devices::port::PortIo;

/// Input clock of the PIT in Hz.
pub const PIT_FREQ: u32 = 1_193_182;

/// Channel 0, access mode LSB/MSB, mode 3 (square wave), binary.
const SQUARE_WAVE_CHANNEL_0: u8 = 0x36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitError {
    /// The requested rate cannot be expressed with a 16-bit divisor.
    FrequencyOutOfRange(u32),
}

impl core::fmt::Display for PitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::FrequencyOutOfRange(hz) => {
                write!(f, "PIT cannot tick at {hz} Hz (valid range 19..={PIT_FREQ})")
            }
        }
    }
}

/// Computes the reload value for `hz`.
pub fn divisor_for(hz: u32) -> Result<u16, PitError> {
    if hz == 0 {
        return Err(PitError::FrequencyOutOfRange(hz));
    }
    u16::try_from(PIT_FREQ / hz)
        .ok()
        .filter(|&divisor| divisor != 0)
        .ok_or(PitError::FrequencyOutOfRange(hz))
}

/// Programs channel 0 to fire periodically at `hz`.
pub fn configure_periodic<P: PortIo>(ports: &mut P, hz: u32) -> Result<u16, PitError> {
    let divisor = divisor_for(hz)?;

    ports.write_u8(PIT_COMMAND, SQUARE_WAVE_CHANNEL_0);
    // Write count value - LSB first, then MSB
    ports.write_u8(PIT_CHANNEL_0, (divisor & 0xFF) as u8);
    ports.write_u8(PIT_CHANNEL_0, (divisor >> 8) as u8);

    Ok(divisor)
}
