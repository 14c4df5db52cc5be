//! Boot-stage tracking for the interrupt subsystem.
//!
//! Every initialization step advances a single tracker and is refused when
//! taken out of order or twice. Runtime operations that need a configured
//! subsystem check the stage they depend on.

use core::fmt;

use spin::Mutex;

use crate::config::ControllerKind;
use crate::interrupts::critical;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootStage {
    Uninitialized,
    FeaturesDetected,
    GdtLoaded,
    /// APIC path only.
    MmioMapped,
    IdtLoaded,
    IstBound,
    DispatchInstalled,
    ControllerReady,
    /// Interrupts unmasked on the processor.
    Live,
}

impl BootStage {
    /// Stage following `self` for a given controller.
    pub const fn successor(self, controller: ControllerKind) -> Option<BootStage> {
        match self {
            BootStage::Uninitialized => Some(BootStage::FeaturesDetected),
            BootStage::FeaturesDetected => Some(BootStage::GdtLoaded),
            BootStage::GdtLoaded => match controller {
                ControllerKind::LocalApic => Some(BootStage::MmioMapped),
                ControllerKind::LegacyPic => Some(BootStage::IdtLoaded),
            },
            BootStage::MmioMapped => Some(BootStage::IdtLoaded),
            BootStage::IdtLoaded => Some(BootStage::IstBound),
            BootStage::IstBound => Some(BootStage::DispatchInstalled),
            BootStage::DispatchInstalled => Some(BootStage::ControllerReady),
            BootStage::ControllerReady => Some(BootStage::Live),
            BootStage::Live => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    /// The step is not the next one in boot order.
    OutOfOrder {
        current: BootStage,
        requested: BootStage,
    },
    /// An operation needs a stage the subsystem has not reached.
    NotReached {
        required: BootStage,
        current: BootStage,
    },
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfOrder { current, requested } => {
                write!(f, "cannot enter {requested:?} from {current:?}")
            }
            Self::NotReached { required, current } => {
                write!(f, "requires {required:?}, subsystem is at {current:?}")
            }
        }
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    stage: BootStage,
    controller: ControllerKind,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            stage: BootStage::Uninitialized,
            controller: ControllerKind::LegacyPic,
        }
    }

    pub fn stage(&self) -> BootStage {
        self.stage
    }

    pub fn controller(&self) -> ControllerKind {
        self.controller
    }

    /// First step. Fixes the controller, which decides whether the MMIO
    /// stage is part of the sequence.
    pub fn begin(&mut self, controller: ControllerKind) -> Result<(), LifecycleError> {
        if self.stage != BootStage::Uninitialized {
            return Err(LifecycleError::OutOfOrder {
                current: self.stage,
                requested: BootStage::FeaturesDetected,
            });
        }
        self.controller = controller;
        self.stage = BootStage::FeaturesDetected;
        Ok(())
    }

    /// Checks that `next` may be entered now, without entering it.
    pub fn check_next(&self, next: BootStage) -> Result<(), LifecycleError> {
        if next == BootStage::FeaturesDetected
            || self.stage.successor(self.controller) != Some(next)
        {
            return Err(LifecycleError::OutOfOrder {
                current: self.stage,
                requested: next,
            });
        }
        Ok(())
    }

    pub fn advance(&mut self, next: BootStage) -> Result<(), LifecycleError> {
        self.check_next(next)?;
        self.stage = next;
        Ok(())
    }

    pub fn require(&self, stage: BootStage) -> Result<(), LifecycleError> {
        if self.stage < stage {
            return Err(LifecycleError::NotReached {
                required: stage,
                current: self.stage,
            });
        }
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

static LIFECYCLE: Mutex<Lifecycle> = Mutex::new(Lifecycle::new());

fn with_lifecycle<T>(f: impl FnOnce(&mut Lifecycle) -> T) -> T {
    critical(|| f(&mut LIFECYCLE.lock()))
}

pub fn stage() -> BootStage {
    with_lifecycle(|lifecycle| lifecycle.stage())
}

pub fn require(stage: BootStage) -> Result<(), LifecycleError> {
    with_lifecycle(|lifecycle| lifecycle.require(stage))
}

/// Controller fixed by feature detection.
pub fn controller() -> ControllerKind {
    with_lifecycle(|lifecycle| lifecycle.controller())
}

pub(crate) fn begin(controller: ControllerKind) -> Result<(), LifecycleError> {
    with_lifecycle(|lifecycle| lifecycle.begin(controller))
}

pub(crate) fn check_next(next: BootStage) -> Result<(), LifecycleError> {
    with_lifecycle(|lifecycle| lifecycle.check_next(next))
}

pub(crate) fn advance(next: BootStage) -> Result<(), LifecycleError> {
    let result = with_lifecycle(|lifecycle| lifecycle.advance(next));
    if result.is_ok() {
        log::debug!("interrupts: entered {:?}", next);
    }
    result
}
