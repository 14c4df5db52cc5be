//! MMIO paging bootstrap.
//!
//! The bootloader leaves a PML4 → PDPT → PD chain in low physical memory.
//! Mapping the local APIC only needs one 2 MiB uncached huge page patched
//! into that chain, so this module writes the two entries directly instead
//! of carrying a general mapper.

use spin::Mutex;
use x86_64::{structures::paging::PageTableFlags, PhysAddr, VirtAddr};

use crate::constants::{
    apic::APIC_VIRT_BASE,
    memory::{BOOT_IDENTITY_OFFSET, BOOT_PD, BOOT_PDPT, ENTRY_ADDRESS_MASK, HUGE_PAGE_SIZE},
};
use crate::memory::{
    tlb::{HardwareTlb, TranslationCache},
    OffsetPhysMemory, PhysMemory,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingError {
    /// Huge-page mappings need both addresses on a 2 MiB boundary.
    Misaligned { virt: u64, phys: u64 },
    /// A different virtual address is already mapped; only one window exists.
    WindowInUse { mapped: u64, requested: u64 },
}

impl core::fmt::Display for PagingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Misaligned { virt, phys } => write!(
                f,
                "huge page mapping {virt:#x} -> {phys:#x} is not 2 MiB aligned"
            ),
            Self::WindowInUse { mapped, requested } => write!(
                f,
                "MMIO window already maps {mapped:#x}, refusing to map {requested:#x}"
            ),
        }
    }
}

/// Flags used for the APIC register window.
pub fn mmio_flags() -> PageTableFlags {
    PageTableFlags::PRESENT
        | PageTableFlags::WRITABLE
        | PageTableFlags::NO_CACHE
        | PageTableFlags::HUGE_PAGE
}

/// Patches huge-page entries into a pre-existing PDPT/PD pair.
#[derive(Debug)]
pub struct MmioBootstrap {
    pdpt: PhysAddr,
    pd: PhysAddr,
    mapped: Option<VirtAddr>,
}

impl MmioBootstrap {
    pub const fn new(pdpt: PhysAddr, pd: PhysAddr) -> Self {
        Self {
            pdpt,
            pd,
            mapped: None,
        }
    }

    /// The virtual address currently backed by this bootstrap, if any.
    pub fn mapped(&self) -> Option<VirtAddr> {
        self.mapped
    }

    /// Writes the PDPT and PD entries for `virt -> phys` without touching
    /// the translation cache. Until the caller flushes, the processor may
    /// keep using whatever translation it cached before.
    pub fn install<M: PhysMemory>(
        &mut self,
        mem: &mut M,
        virt: VirtAddr,
        phys: PhysAddr,
        flags: PageTableFlags,
    ) -> Result<(), PagingError> {
        if virt.as_u64() % HUGE_PAGE_SIZE != 0 || phys.as_u64() % HUGE_PAGE_SIZE != 0 {
            return Err(PagingError::Misaligned {
                virt: virt.as_u64(),
                phys: phys.as_u64(),
            });
        }
        if let Some(mapped) = self.mapped {
            if mapped != virt {
                return Err(PagingError::WindowInUse {
                    mapped: mapped.as_u64(),
                    requested: virt.as_u64(),
                });
            }
        }

        let pdpt_index = u64::from(virt.p3_index());
        let pd_index = u64::from(virt.p2_index());

        let table_flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE;
        mem.write_u64(
            self.pdpt + pdpt_index * 8,
            self.pd.as_u64() | table_flags.bits(),
        );

        let leaf_flags = flags | PageTableFlags::PRESENT | PageTableFlags::HUGE_PAGE;
        mem.write_u64(self.pd + pd_index * 8, phys.as_u64() | leaf_flags.bits());

        self.mapped = Some(virt);
        Ok(())
    }

    /// Maps `virt` to `phys` as a 2 MiB page and flushes the translation cache.
    pub fn map_page<M: PhysMemory, T: TranslationCache>(
        &mut self,
        mem: &mut M,
        tlb: &mut T,
        virt: VirtAddr,
        phys: PhysAddr,
        flags: PageTableFlags,
    ) -> Result<(), PagingError> {
        self.install(mem, virt, phys, flags)?;
        tlb.flush_all();
        Ok(())
    }

    /// Maps the huge page containing `phys` at `window` and returns the
    /// virtual address of `phys` itself.
    pub fn map_containing<M: PhysMemory, T: TranslationCache>(
        &mut self,
        mem: &mut M,
        tlb: &mut T,
        window: VirtAddr,
        phys: PhysAddr,
        flags: PageTableFlags,
    ) -> Result<VirtAddr, PagingError> {
        let frame = phys.align_down(HUGE_PAGE_SIZE);
        self.map_page(mem, tlb, window, frame, flags)?;
        Ok(window + (phys - frame))
    }
}

static BOOTSTRAP: Mutex<MmioBootstrap> = Mutex::new(MmioBootstrap::new(
    PhysAddr::new_truncate(BOOT_PDPT),
    PhysAddr::new_truncate(BOOT_PD),
));

/// Virtual address of the APIC register block once mapped.
static APIC_REGISTERS: Mutex<Option<VirtAddr>> = Mutex::new(None);

/// Maps the local APIC register block at `phys` (as read from the base
/// MSR) behind the fixed virtual window and returns its virtual address.
pub(crate) fn map_apic_window(phys: PhysAddr) -> Result<VirtAddr, PagingError> {
    let window = VirtAddr::new_truncate(APIC_VIRT_BASE);

    // The boot page tables live in identity-mapped low memory.
    let mut mem = unsafe { OffsetPhysMemory::new(BOOT_IDENTITY_OFFSET) };
    let registers = BOOTSTRAP.lock().map_containing(
        &mut mem,
        &mut HardwareTlb,
        window,
        phys,
        mmio_flags(),
    )?;
    *APIC_REGISTERS.lock() = Some(registers);

    log::debug!(
        "paging: {:#x} -> {:#x} mapped uncached",
        registers.as_u64(),
        phys.as_u64()
    );
    Ok(registers)
}

/// Where the APIC registers were mapped, if [`map_apic_window`] ran.
pub fn apic_registers() -> Option<VirtAddr> {
    *APIC_REGISTERS.lock()
}

/// Result of walking the two top paging levels for an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopLevelWalk {
    pub pml4_index: u16,
    pub pml4_entry: u64,
    /// Index and value of the PDPT entry, when the PML4 entry is present.
    pub pdpt: Option<(u16, u64)>,
}

impl core::fmt::Display for TopLevelWalk {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PML4[{}] = {:#x}", self.pml4_index, self.pml4_entry)?;
        if let Some((index, entry)) = self.pdpt {
            write!(f, "\nPDP[{index}] = {entry:#x}")?;
        }
        Ok(())
    }
}

/// Reads the PML4 and (if present) PDPT entries covering `addr`.
/// Purely diagnostic; nothing is modified.
pub fn walk_top_levels<M: PhysMemory>(mem: &M, pml4: PhysAddr, addr: VirtAddr) -> TopLevelWalk {
    let pml4_index = u16::from(addr.p4_index());
    let pml4_entry = mem.read_u64(pml4 + u64::from(pml4_index) * 8);

    let pdpt = if pml4_entry & PageTableFlags::PRESENT.bits() != 0 {
        let pdpt_base = PhysAddr::new_truncate(pml4_entry & ENTRY_ADDRESS_MASK);
        let pdpt_index = u16::from(addr.p3_index());
        Some((
            pdpt_index,
            mem.read_u64(pdpt_base + u64::from(pdpt_index) * 8),
        ))
    } else {
        None
    };

    TopLevelWalk {
        pml4_index,
        pml4_entry,
        pdpt,
    }
}
