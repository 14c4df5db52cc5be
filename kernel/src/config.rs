//! Boot-time configuration of the interrupt subsystem.

use crate::constants::idt::TIMER_FREQUENCY_HZ;
use crate::interrupts::apic::ApicTimerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    LegacyPic,
    LocalApic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    pub controller: ControllerKind,
    /// IRQ0 rate on the legacy path.
    pub pit_frequency_hz: u32,
    /// Timer programming on the APIC path.
    pub apic_timer: ApicTimerConfig,
    /// Lines unmasked once the controller is up.
    pub unmasked_lines: &'static [u8],
}

impl BootConfig {
    /// 8259 pair with the PIT on IRQ0 and the keyboard on IRQ1.
    pub const fn legacy() -> Self {
        Self {
            controller: ControllerKind::LegacyPic,
            pit_frequency_hz: TIMER_FREQUENCY_HZ,
            apic_timer: ApicTimerConfig::new(),
            unmasked_lines: &[0, 1],
        }
    }

    /// Local APIC timer only. The APIC routes no other legacy line.
    pub const fn apic() -> Self {
        Self {
            controller: ControllerKind::LocalApic,
            pit_frequency_hz: TIMER_FREQUENCY_HZ,
            apic_timer: ApicTimerConfig::new(),
            unmasked_lines: &[0],
        }
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        if cfg!(feature = "apic") {
            Self::apic()
        } else {
            Self::legacy()
        }
    }
}
