//! One interface over the two interrupt controllers, chosen once at boot.

use spin::Mutex;

use crate::config::{BootConfig, ControllerKind};
use crate::devices::pit::{self, PitError};
use crate::devices::port::{HardwarePorts, PortIo};
use crate::interrupts::apic::{
    ApicRegisters, ApicTimerConfig, HardwareMsr, LocalApic, MmioApic, ModelSpecificRegisters,
};
use crate::interrupts::critical;
use crate::interrupts::irq::IrqLine;
use crate::interrupts::pic::ChainedPic;
use crate::memory::paging;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerError {
    /// The active controller has no route for this line.
    LineNotRoutable(u8),
    /// Not a legacy line number (0-15).
    InvalidLine(u8),
    Pit(PitError),
    /// No controller has been brought up yet.
    Uninitialized,
    /// The APIC was selected before its register window was mapped.
    RegistersUnmapped,
}

impl From<PitError> for ControllerError {
    fn from(err: PitError) -> Self {
        ControllerError::Pit(err)
    }
}

impl core::fmt::Display for ControllerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::LineNotRoutable(line) => {
                write!(f, "IRQ{line} is not routable through the active controller")
            }
            Self::InvalidLine(line) => write!(f, "IRQ line {line} outside 0..=15"),
            Self::Pit(err) => write!(f, "timer: {err}"),
            Self::Uninitialized => f.write_str("interrupt controller not initialized"),
            Self::RegistersUnmapped => f.write_str("APIC register window not mapped"),
        }
    }
}

pub trait InterruptController {
    /// Programs the controller, remaps its vectors and leaves lines masked
    /// unless the controller routes them itself.
    fn init(&mut self) -> Result<(), ControllerError>;

    /// Completion signal for `line`. Must be the last thing an IRQ handler
    /// does with the controller.
    fn end_of_interrupt(&mut self, line: IrqLine);

    fn set_masked(&mut self, line: IrqLine, masked: bool) -> Result<(), ControllerError>;

    /// Vector `line` is delivered on.
    fn vector_for(&self, line: IrqLine) -> Result<u8, ControllerError>;

    /// Whether the request on `line` was spurious. A spurious request gets
    /// no completion signal; any partial acknowledgement the hardware still
    /// expects is sent here before returning true.
    fn check_spurious(&mut self, _line: IrqLine) -> bool {
        false
    }
}

pub enum Controller<P, R, M> {
    Legacy(ChainedPic<P>),
    /// The 8259 pair stays remapped and fully masked underneath, so a
    /// stray legacy line still lands on 32-47.
    Apic {
        legacy: ChainedPic<P>,
        local: LocalApic<R, M>,
    },
}

impl<P, R, M> Controller<P, R, M>
where
    P: PortIo,
    R: ApicRegisters,
    M: ModelSpecificRegisters,
{
    pub fn legacy(ports: P) -> Self {
        Controller::Legacy(ChainedPic::new(ports))
    }

    pub fn apic(ports: P, regs: R, msr: M, timer: ApicTimerConfig) -> Self {
        Controller::Apic {
            legacy: ChainedPic::new(ports),
            local: LocalApic::new(regs, msr, timer),
        }
    }

    pub fn kind(&self) -> ControllerKind {
        match self {
            Controller::Legacy(_) => ControllerKind::LegacyPic,
            Controller::Apic { .. } => ControllerKind::LocalApic,
        }
    }

    /// Initializes the controller, starts the timer source and unmasks the
    /// configured lines.
    pub fn bring_up(&mut self, config: &BootConfig) -> Result<(), ControllerError> {
        self.init()?;

        if let Controller::Legacy(pic) = self {
            let divisor = pit::configure_periodic(pic.ports_mut(), config.pit_frequency_hz)?;
            log::debug!(
                "pit: channel 0 at {} Hz (divisor {})",
                config.pit_frequency_hz,
                divisor
            );
        }

        for &n in config.unmasked_lines {
            let line = IrqLine::new(n).ok_or(ControllerError::InvalidLine(n))?;
            self.set_masked(line, false)?;
        }
        Ok(())
    }
}

impl<P, R, M> InterruptController for Controller<P, R, M>
where
    P: PortIo,
    R: ApicRegisters,
    M: ModelSpecificRegisters,
{
    fn init(&mut self) -> Result<(), ControllerError> {
        match self {
            Controller::Legacy(pic) => pic.init(),
            Controller::Apic { legacy, local } => {
                legacy.init()?;
                local.init()
            }
        }
    }

    fn end_of_interrupt(&mut self, line: IrqLine) {
        match self {
            Controller::Legacy(pic) => pic.end_of_interrupt(line),
            Controller::Apic { local, .. } => local.end_of_interrupt(line),
        }
    }

    fn set_masked(&mut self, line: IrqLine, masked: bool) -> Result<(), ControllerError> {
        match self {
            Controller::Legacy(pic) => pic.set_masked(line, masked),
            Controller::Apic { local, .. } => local.set_masked(line, masked),
        }
    }

    fn vector_for(&self, line: IrqLine) -> Result<u8, ControllerError> {
        match self {
            Controller::Legacy(pic) => pic.vector_for(line),
            Controller::Apic { local, .. } => local.vector_for(line),
        }
    }

    /// Spurious requests come from the 8259 pair on either path; the local
    /// APIC must not see an EOI for them.
    fn check_spurious(&mut self, line: IrqLine) -> bool {
        match self {
            Controller::Legacy(pic) => pic.check_spurious(line),
            Controller::Apic { legacy, .. } => legacy.check_spurious(line),
        }
    }
}

pub type HardwareController = Controller<HardwarePorts, MmioApic, HardwareMsr>;

impl HardwareController {
    /// # Safety
    ///
    /// Takes ownership of the controller hardware.
    pub unsafe fn for_config(config: &BootConfig) -> Result<Self, ControllerError> {
        let ports = HardwarePorts::new();
        let controller = match config.controller {
            ControllerKind::LegacyPic => Controller::legacy(ports),
            ControllerKind::LocalApic => {
                let registers =
                    paging::apic_registers().ok_or(ControllerError::RegistersUnmapped)?;
                Controller::apic(
                    ports,
                    MmioApic::new(registers),
                    HardwareMsr,
                    config.apic_timer,
                )
            }
        };
        Ok(controller)
    }
}

/// The controller IRQ handlers acknowledge through. Outside interrupt
/// context it is only locked with interrupts masked.
static CONTROLLER: Mutex<Option<HardwareController>> = Mutex::new(None);

pub(crate) fn install(controller: HardwareController) {
    critical(|| {
        *CONTROLLER.lock() = Some(controller);
    });
}

/// Runs `f` on the live controller, if one is installed.
pub fn with_active<T>(f: impl FnOnce(&mut HardwareController) -> T) -> Option<T> {
    critical(|| CONTROLLER.lock().as_mut().map(f))
}

/// Masks or unmasks one legacy line on the live controller.
pub fn set_line_masked(line: u8, masked: bool) -> Result<(), ControllerError> {
    let line = IrqLine::new(line).ok_or(ControllerError::InvalidLine(line))?;
    with_active(|controller| controller.set_masked(line, masked))
        .unwrap_or(Err(ControllerError::Uninitialized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::apic::{APIC_BASE_ENABLE, APIC_BASE_MSR, APIC_EOI, APIC_LVT_TIMER};
    use crate::constants::ports::{PIT_CHANNEL_0, PIT_COMMAND};
    use crate::testing::{Sim8259, SimApic, SimMsr};

    type SimController = Controller<Sim8259, SimApic, SimMsr>;

    fn legacy() -> SimController {
        Controller::legacy(Sim8259::default())
    }

    fn apic() -> SimController {
        Controller::apic(
            Sim8259::default(),
            SimApic::default(),
            SimMsr::default(),
            ApicTimerConfig::default(),
        )
    }

    #[test]
    fn legacy_bring_up_unmasks_configured_lines() {
        let mut controller = legacy();
        controller.bring_up(&BootConfig::legacy()).unwrap();

        let Controller::Legacy(pic) = &mut controller else {
            panic!("legacy controller expected");
        };
        assert_eq!(pic.masks(), (0xFF & !0b11, 0xFF));
        assert_eq!(pic.ports_mut().raise(0), Some(32));
        assert_eq!(pic.ports_mut().raise(1), Some(33));
        assert_eq!(pic.ports_mut().raise(4), None);
    }

    #[test]
    fn legacy_bring_up_programs_pit() {
        let mut controller = legacy();
        controller.bring_up(&BootConfig::legacy()).unwrap();

        let Controller::Legacy(pic) = &controller else {
            panic!("legacy controller expected");
        };
        let divisor = 1_193_182 / BootConfig::legacy().pit_frequency_hz;
        assert_eq!(
            pic.ports().other_writes,
            vec![
                (PIT_COMMAND, 0x36),
                (PIT_CHANNEL_0, (divisor & 0xFF) as u8),
                (PIT_CHANNEL_0, (divisor >> 8) as u8),
            ]
        );
    }

    #[test]
    fn apic_bring_up_masks_legacy_pair() {
        let mut controller = apic();
        controller.bring_up(&BootConfig::apic()).unwrap();
        assert_eq!(controller.kind(), ControllerKind::LocalApic);

        let Controller::Apic { legacy, local } = &mut controller else {
            panic!("apic controller expected");
        };
        assert_eq!(legacy.masks(), (0xFF, 0xFF));
        assert_eq!(legacy.ports_mut().raise(1), None);
        assert_ne!(local.msr().read(APIC_BASE_MSR) & APIC_BASE_ENABLE, 0);
        assert_eq!(local.registers().read(APIC_LVT_TIMER) & 0xFF, 32);
        assert!(legacy.ports().other_writes.is_empty(), "PIT untouched");
    }

    #[test]
    fn apic_rejects_unroutable_lines() {
        let mut controller = apic();
        let config = BootConfig {
            unmasked_lines: &[0, 1],
            ..BootConfig::apic()
        };
        assert_eq!(
            controller.bring_up(&config),
            Err(ControllerError::LineNotRoutable(1))
        );
    }

    #[test]
    fn invalid_line_numbers_are_rejected() {
        let mut controller = legacy();
        let config = BootConfig {
            unmasked_lines: &[16],
            ..BootConfig::legacy()
        };
        assert_eq!(
            controller.bring_up(&config),
            Err(ControllerError::InvalidLine(16))
        );
    }

    #[test]
    fn completion_goes_to_the_active_variant() {
        let mut controller = apic();
        controller.bring_up(&BootConfig::apic()).unwrap();
        controller.end_of_interrupt(IrqLine::TIMER);
        controller.end_of_interrupt(IrqLine::new(9).unwrap());

        let Controller::Apic { legacy: pair, local } = &controller else {
            panic!("apic controller expected");
        };
        assert_eq!(local.registers().eoi_writes, 2);
        assert_eq!(local.registers().read(APIC_EOI), 0);
        assert_eq!(pair.ports().master_eois, 0);
        assert_eq!(pair.ports().slave_eois, 0);

        let mut controller = legacy();
        controller.bring_up(&BootConfig::legacy()).unwrap();
        controller.end_of_interrupt(IrqLine::new(9).unwrap());
        let Controller::Legacy(pic) = &controller else {
            panic!("legacy controller expected");
        };
        assert_eq!((pic.ports().slave_eois, pic.ports().master_eois), (1, 1));
    }

    #[test]
    fn bad_pit_rate_surfaces() {
        let mut controller = legacy();
        let config = BootConfig {
            pit_frequency_hz: 0,
            ..BootConfig::legacy()
        };
        assert_eq!(
            controller.bring_up(&config),
            Err(ControllerError::Pit(PitError::FrequencyOutOfRange(0)))
        );
    }

    #[test]
    fn apic_path_drops_spurious_legacy_requests() {
        let mut controller = apic();
        controller.bring_up(&BootConfig::apic()).unwrap();

        assert!(controller.check_spurious(IrqLine::new(7).unwrap()));
        assert!(!controller.check_spurious(IrqLine::TIMER));

        let Controller::Apic { local, .. } = &controller else {
            panic!("apic controller expected");
        };
        assert_eq!(local.registers().eoi_writes, 0);
    }

    #[test]
    fn runtime_masking_needs_a_controller() {
        assert_eq!(set_line_masked(1, false), Err(ControllerError::Uninitialized));
        assert_eq!(set_line_masked(16, false), Err(ControllerError::InvalidLine(16)));
    }
}
