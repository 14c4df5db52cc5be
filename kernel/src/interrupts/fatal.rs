//! The single terminal-failure path.

use core::fmt;

use x86_64::instructions::interrupts;

use crate::interrupts::exceptions::{ExceptionReport, FrameSnapshot};
use crate::interrupts::InitError;
use crate::serial;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    Exception(ExceptionReport),
    /// A vector with no populated handler fired.
    UnhandledVector { vector: u8, frame: FrameSnapshot },
    /// An IRQ arrived before any controller was installed.
    UninitializedIrq(u8),
    Init(InitError),
}

impl FatalReason {
    pub fn headline(&self) -> &'static str {
        match self {
            FatalReason::Exception(_) => "unrecoverable exception",
            FatalReason::UnhandledVector { .. } => "unhandled interrupt vector",
            FatalReason::UninitializedIrq(_) => "IRQ before controller initialization",
            FatalReason::Init(_) => "interrupt subsystem initialization failed",
        }
    }
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalReason::Exception(report) => write!(f, "{report}"),
            FatalReason::UnhandledVector { vector, frame } => {
                writeln!(f, "UNHANDLED VECTOR: {vector} ({vector:#x})")?;
                write!(f, "{frame}")
            }
            FatalReason::UninitializedIrq(vector) => {
                write!(f, "IRQ on vector {vector} with no interrupt controller")
            }
            FatalReason::Init(err) => write!(f, "INIT FAILED: {err}"),
        }
    }
}

/// Reports `reason` and parks the processor for good.
pub fn fatal(reason: FatalReason) -> ! {
    interrupts::disable();

    serial::emergency_print(format_args!("{reason}\n"));
    log::error!("{}, halting", reason.headline());

    crate::idle_loop()
}
