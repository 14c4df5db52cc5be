//! Interrupt and exception handling.
//!
//! Bring-up runs as a fixed sequence of steps, each checked against the
//! boot lifecycle:
//!
//! 1. [`detect_features`]
//! 2. [`load_gdt`]
//! 3. [`map_apic_mmio`] (APIC controller only)
//! 4. [`load_idt`]
//! 5. [`bind_ist_stacks`]
//! 6. [`install_dispatch`]
//! 7. [`init_controller`]
//! 8. [`enable`]
//!
//! [`init`] runs all of them in order.

use core::fmt;

use x86_64::VirtAddr;

use crate::config::{BootConfig, ControllerKind};
use crate::constants::apic::APIC_BASE_MSR;
use crate::cpu::{self, CpuError, CpuFeatures};
use crate::memory::paging::{self, PagingError};

pub mod apic;
pub mod controller;
pub mod dispatch;
pub mod exceptions;
pub mod fatal;
pub mod gdt;
pub mod idt;
pub mod irq;
pub mod ist;
pub mod lifecycle;
pub mod pic;
pub mod stubs;
pub mod tss;

pub use x86_64::instructions::interrupts::{are_enabled, disable, without_interrupts};

/// Runs `f` with maskable interrupts held off, for state an IRQ handler
/// also locks. Host test builds take no interrupts and may not execute
/// `cli`, so there `f` just runs.
#[cfg(not(test))]
pub(crate) fn critical<R>(f: impl FnOnce() -> R) -> R {
    without_interrupts(f)
}

#[cfg(test)]
pub(crate) fn critical<R>(f: impl FnOnce() -> R) -> R {
    f()
}

use apic::{HardwareMsr, ModelSpecificRegisters};
use controller::{ControllerError, HardwareController};
use fatal::{fatal, FatalReason};
use lifecycle::{BootStage, LifecycleError};
use tss::IstError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    Cpu(CpuError),
    Lifecycle(LifecycleError),
    Ist(IstError),
    Paging(PagingError),
    Controller(ControllerError),
    /// The controller step asked for a different controller than the one
    /// feature detection validated.
    ControllerMismatch {
        detected: ControllerKind,
        requested: ControllerKind,
    },
}

impl From<CpuError> for InitError {
    fn from(err: CpuError) -> Self {
        InitError::Cpu(err)
    }
}

impl From<LifecycleError> for InitError {
    fn from(err: LifecycleError) -> Self {
        InitError::Lifecycle(err)
    }
}

impl From<IstError> for InitError {
    fn from(err: IstError) -> Self {
        InitError::Ist(err)
    }
}

impl From<PagingError> for InitError {
    fn from(err: PagingError) -> Self {
        InitError::Paging(err)
    }
}

impl From<ControllerError> for InitError {
    fn from(err: ControllerError) -> Self {
        InitError::Controller(err)
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu(err) => write!(f, "cpu: {err}"),
            Self::Lifecycle(err) => write!(f, "lifecycle: {err}"),
            Self::Ist(err) => write!(f, "ist: {err}"),
            Self::Paging(err) => write!(f, "paging: {err}"),
            Self::Controller(err) => write!(f, "controller: {err}"),
            Self::ControllerMismatch { detected, requested } => write!(
                f,
                "controller {requested:?} requested after detecting {detected:?}"
            ),
        }
    }
}

/// Checks the processor against `config` and turns on PAE (and global
/// pages where supported).
pub fn detect_features(config: &BootConfig) -> Result<CpuFeatures, InitError> {
    let current = lifecycle::stage();
    if current != BootStage::Uninitialized {
        return Err(LifecycleError::OutOfOrder {
            current,
            requested: BootStage::FeaturesDetected,
        }
        .into());
    }

    let features = CpuFeatures::detect()?;
    features.require(config.controller)?;
    unsafe { cpu::enable_paging_extensions(&features) };

    lifecycle::begin(config.controller)?;
    Ok(features)
}

pub fn load_gdt() -> Result<(), InitError> {
    lifecycle::check_next(BootStage::GdtLoaded)?;
    gdt::build_gdt();
    lifecycle::advance(BootStage::GdtLoaded)?;
    Ok(())
}

/// Maps the APIC register block named by the base MSR. Must precede the
/// first register access.
pub fn map_apic_mmio() -> Result<VirtAddr, InitError> {
    lifecycle::check_next(BootStage::MmioMapped)?;
    let phys = apic::base_address(HardwareMsr.read(APIC_BASE_MSR));
    let base = paging::map_apic_window(phys)?;
    lifecycle::advance(BootStage::MmioMapped)?;
    Ok(base)
}

pub fn load_idt() -> Result<(), InitError> {
    lifecycle::check_next(BootStage::IdtLoaded)?;
    idt::build_idt();
    lifecycle::advance(BootStage::IdtLoaded)?;
    Ok(())
}

pub fn bind_ist_stacks() -> Result<(), InitError> {
    lifecycle::check_next(BootStage::IstBound)?;
    ist::bind_all()?;
    lifecycle::advance(BootStage::IstBound)?;
    Ok(())
}

pub fn install_dispatch() -> Result<(), InitError> {
    lifecycle::check_next(BootStage::DispatchInstalled)?;
    idt::install_dispatch_table();
    lifecycle::advance(BootStage::DispatchInstalled)?;
    Ok(())
}

/// Brings up the configured controller and makes it the one IRQ handlers
/// acknowledge through.
pub fn init_controller(config: &BootConfig) -> Result<(), InitError> {
    lifecycle::check_next(BootStage::ControllerReady)?;

    let detected = lifecycle::controller();
    if detected != config.controller {
        return Err(InitError::ControllerMismatch {
            detected,
            requested: config.controller,
        });
    }

    let mut active = unsafe { HardwareController::for_config(config) }?;
    without_interrupts(|| active.bring_up(config))?;
    controller::install(active);

    lifecycle::advance(BootStage::ControllerReady)?;
    log::info!("interrupts: {:?} controller ready", config.controller);
    Ok(())
}

/// Unmasks interrupts on the processor.
pub fn enable() -> Result<(), InitError> {
    lifecycle::advance(BootStage::Live)?;
    x86_64::instructions::interrupts::enable();
    Ok(())
}

/// Runs every bring-up step in order.
pub fn init(config: &BootConfig) -> Result<(), InitError> {
    detect_features(config)?;
    load_gdt()?;
    if config.controller == ControllerKind::LocalApic {
        map_apic_mmio()?;
    }
    load_idt()?;
    bind_ist_stacks()?;
    install_dispatch()?;
    init_controller(config)?;
    enable()
}

/// [`init`], with any failure routed to the fatal path.
pub fn init_or_halt(config: &BootConfig) {
    if let Err(err) = init(config) {
        fatal(FatalReason::Init(err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_convert_into_init_error() {
        let err: InitError = IstError::InvalidIndex(9).into();
        assert_eq!(err, InitError::Ist(IstError::InvalidIndex(9)));
        assert_eq!(err.to_string(), "ist: IST index 9 outside 1..=7");

        let err: InitError = ControllerError::LineNotRoutable(1).into();
        assert_eq!(
            err.to_string(),
            "controller: IRQ1 is not routable through the active controller"
        );

        let err: InitError = PagingError::WindowInUse {
            mapped: 0x1000,
            requested: 0x2000,
        }
        .into();
        assert!(matches!(err, InitError::Paging(_)));
    }

    #[test]
    fn mismatch_names_both_controllers() {
        let err = InitError::ControllerMismatch {
            detected: ControllerKind::LegacyPic,
            requested: ControllerKind::LocalApic,
        };
        assert_eq!(
            err.to_string(),
            "controller LocalApic requested after detecting LegacyPic"
        );
    }

    #[test]
    fn steps_refuse_to_run_before_feature_detection() {
        assert_eq!(
            map_apic_mmio(),
            Err(InitError::Lifecycle(LifecycleError::OutOfOrder {
                current: BootStage::Uninitialized,
                requested: BootStage::MmioMapped,
            }))
        );
        assert!(matches!(load_gdt(), Err(InitError::Lifecycle(_))));
        assert!(matches!(install_dispatch(), Err(InitError::Lifecycle(_))));
        assert!(matches!(enable(), Err(InitError::Lifecycle(_))));
        assert_eq!(
            irq::ticks(),
            Err(LifecycleError::NotReached {
                required: BootStage::ControllerReady,
                current: BootStage::Uninitialized,
            })
        );
    }
}
