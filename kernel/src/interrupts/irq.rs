//! Hardware IRQ handling for the sixteen remapped legacy lines.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::constants::{
    idt::{IRQ_BASE_VECTOR, IRQ_LINES},
    ports::KEYBOARD_DATA,
};
use crate::devices::{
    keyboard,
    port::{HardwarePorts, PortIo},
    serial::{ConsoleSink, SerialConsole},
};
use crate::interrupts::controller::{self, InterruptController};
use crate::interrupts::critical;
use crate::interrupts::fatal::{fatal, FatalReason};
use crate::interrupts::lifecycle::{self, BootStage, LifecycleError};

/// Ticks between two progress lines in the log.
const TICK_LOG_INTERVAL: u64 = 100;
/// Level of the tick progress line; visible with the release filter.
const TICK_LOG_LEVEL: log::Level = log::Level::Info;

/// A legacy interrupt line, 0 through 15.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IrqLine(u8);

impl IrqLine {
    pub const TIMER: IrqLine = IrqLine(0);
    pub const KEYBOARD: IrqLine = IrqLine(1);
    /// Master input wired to the slave chip.
    pub const CASCADE: IrqLine = IrqLine(2);

    pub const fn new(line: u8) -> Option<Self> {
        if line < IRQ_LINES {
            Some(Self(line))
        } else {
            None
        }
    }

    pub const fn index(self) -> u8 {
        self.0
    }

    pub const fn vector(self) -> u8 {
        IRQ_BASE_VECTOR + self.0
    }

    pub const fn from_vector(vector: u8) -> Option<Self> {
        if vector < IRQ_BASE_VECTOR {
            return None;
        }
        Self::new(vector - IRQ_BASE_VECTOR)
    }

    /// Lines 8-15 arrive through the slave chip.
    pub const fn is_slave(self) -> bool {
        self.0 >= 8
    }
}

impl core::fmt::Display for IrqLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "IRQ{}", self.0)
    }
}

/// Monotonic count of timer interrupts.
#[derive(Debug, Default)]
pub struct TickCounter(AtomicU64);

impl TickCounter {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Records one tick and returns the new count.
    pub fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

static TICKS: TickCounter = TickCounter::new();

/// Timer interrupts taken since the controller came up.
pub fn ticks() -> Result<u64, LifecycleError> {
    lifecycle::require(BootStage::ControllerReady)?;
    Ok(critical(|| TICKS.get()))
}

/// Everything an IRQ handler may touch.
pub struct IrqContext<'a, C: ?Sized, P, S> {
    pub controller: &'a mut C,
    pub ports: &'a mut P,
    pub console: &'a mut S,
    pub ticks: &'a TickCounter,
}

/// Does the per-line work for `line`, then signals completion. Completion
/// is unconditional for real requests and always the last controller
/// access; spurious requests are dropped without one.
pub fn handle_irq<C, P, S>(ctx: &mut IrqContext<'_, C, P, S>, line: IrqLine)
where
    C: InterruptController + ?Sized,
    P: PortIo,
    S: ConsoleSink,
{
    if ctx.controller.check_spurious(line) {
        return;
    }

    match line {
        IrqLine::TIMER => {
            let count = ctx.ticks.tick();
            if count % TICK_LOG_INTERVAL == 0 {
                log::log!(TICK_LOG_LEVEL, "Tick: {}", count);
            }
        }
        IrqLine::KEYBOARD => {
            let scancode = ctx.ports.read_u8(KEYBOARD_DATA);
            if let Some(c) = keyboard::translate(scancode) {
                ctx.console.put_char(c);
            }
        }
        _ => {}
    }

    ctx.controller.end_of_interrupt(line);
}

/// Entry from the per-line stubs.
pub(crate) fn dispatch(line: IrqLine) {
    let mut ports = unsafe { HardwarePorts::new() };
    let mut console = SerialConsole;

    let handled = controller::with_active(|active| {
        handle_irq(
            &mut IrqContext {
                controller: active,
                ports: &mut ports,
                console: &mut console,
                ticks: &TICKS,
            },
            line,
        )
    });

    if handled.is_none() {
        fatal(FatalReason::UninitializedIrq(line.vector()));
    }
}
