//! Processor feature detection.
//!
//! The interrupt subsystem needs PAE paging and MSR access everywhere, and
//! an on-chip APIC when that controller is selected.

use core::fmt;

use raw_cpuid::CpuId;
use x86_64::registers::control::{Cr4, Cr4Flags};

use crate::config::ControllerKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuFeature {
    Pae,
    Msr,
    Apic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuError {
    /// CPUID leaf 1 is not available at all.
    NoFeatureLeaf,
    Missing(CpuFeature),
}

impl fmt::Display for CpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFeatureLeaf => f.write_str("CPUID feature leaf unavailable"),
            Self::Missing(feature) => write!(f, "required CPU feature {feature:?} missing"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CpuFeatures {
    pub pae: bool,
    pub msr: bool,
    pub apic: bool,
    pub pge: bool,
}

impl CpuFeatures {
    /// Reads CPUID leaf 1 and logs the vendor.
    pub fn detect() -> Result<Self, CpuError> {
        let cpuid = CpuId::new();

        if let Some(vendor) = cpuid.get_vendor_info() {
            log::info!("cpu: vendor {}", vendor.as_str());
        }

        let info = cpuid.get_feature_info().ok_or(CpuError::NoFeatureLeaf)?;
        Ok(Self {
            pae: info.has_pae(),
            msr: info.has_msr(),
            apic: info.has_apic(),
            pge: info.has_pge(),
        })
    }

    /// Checks everything `controller` depends on.
    pub fn require(&self, controller: ControllerKind) -> Result<(), CpuError> {
        if !self.pae {
            return Err(CpuError::Missing(CpuFeature::Pae));
        }
        if !self.msr {
            return Err(CpuError::Missing(CpuFeature::Msr));
        }
        if controller == ControllerKind::LocalApic && !self.apic {
            return Err(CpuError::Missing(CpuFeature::Apic));
        }
        Ok(())
    }

    pub fn paging_extensions(&self) -> Cr4Flags {
        let mut flags = Cr4Flags::empty();
        if self.pae {
            flags |= Cr4Flags::PHYSICAL_ADDRESS_EXTENSION;
        }
        if self.pge {
            flags |= Cr4Flags::PAGE_GLOBAL;
        }
        flags
    }
}

/// Turns on PAE and, where supported, global pages.
///
/// # Safety
///
/// Must run in ring 0 on a processor whose features were detected into
/// `features`.
pub unsafe fn enable_paging_extensions(features: &CpuFeatures) {
    let extra = features.paging_extensions();
    Cr4::update(|flags| flags.insert(extra));
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: CpuFeatures = CpuFeatures {
        pae: true,
        msr: true,
        apic: true,
        pge: true,
    };

    #[test]
    fn legacy_path_needs_pae_and_msr() {
        assert_eq!(FULL.require(ControllerKind::LegacyPic), Ok(()));

        let no_pae = CpuFeatures { pae: false, ..FULL };
        assert_eq!(
            no_pae.require(ControllerKind::LegacyPic),
            Err(CpuError::Missing(CpuFeature::Pae))
        );

        let no_msr = CpuFeatures { msr: false, ..FULL };
        assert_eq!(
            no_msr.require(ControllerKind::LegacyPic),
            Err(CpuError::Missing(CpuFeature::Msr))
        );

        let no_apic = CpuFeatures { apic: false, ..FULL };
        assert_eq!(no_apic.require(ControllerKind::LegacyPic), Ok(()));
    }

    #[test]
    fn apic_path_needs_apic() {
        let no_apic = CpuFeatures { apic: false, ..FULL };
        assert_eq!(
            no_apic.require(ControllerKind::LocalApic),
            Err(CpuError::Missing(CpuFeature::Apic))
        );
        assert_eq!(FULL.require(ControllerKind::LocalApic), Ok(()));
    }

    #[test]
    fn global_pages_only_when_supported() {
        assert_eq!(
            FULL.paging_extensions(),
            Cr4Flags::PHYSICAL_ADDRESS_EXTENSION | Cr4Flags::PAGE_GLOBAL
        );
        let no_pge = CpuFeatures { pge: false, ..FULL };
        assert_eq!(
            no_pge.paging_extensions(),
            Cr4Flags::PHYSICAL_ADDRESS_EXTENSION
        );
    }
}
