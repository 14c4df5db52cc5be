//! The slice of memory management the interrupt subsystem needs: access to
//! the bootloader's page tables and the single MMIO mapping for the APIC.

pub mod paging;
pub mod tlb;

use x86_64::PhysAddr;

/// Word-granular access to physical memory.
///
/// Page-table manipulation goes through this trait so it can run against a
/// simulated address space in tests.
pub trait PhysMemory {
    fn read_u64(&self, phys: PhysAddr) -> u64;
    fn write_u64(&mut self, phys: PhysAddr, value: u64);
}

/// Physical memory reached through a fixed virtual offset (zero for the
/// identity-mapped low region the bootloader leaves behind).
#[derive(Debug, Clone, Copy)]
pub struct OffsetPhysMemory {
    offset: u64,
}

impl OffsetPhysMemory {
    /// # Safety
    ///
    /// Every physical address later passed in must be mapped at
    /// `phys + offset` for the lifetime of this value.
    pub const unsafe fn new(offset: u64) -> Self {
        Self { offset }
    }

    fn ptr(&self, phys: PhysAddr) -> *mut u64 {
        (phys.as_u64() + self.offset) as *mut u64
    }
}

impl PhysMemory for OffsetPhysMemory {
    fn read_u64(&self, phys: PhysAddr) -> u64 {
        unsafe { core::ptr::read_volatile(self.ptr(phys)) }
    }

    fn write_u64(&mut self, phys: PhysAddr, value: u64) {
        unsafe { core::ptr::write_volatile(self.ptr(phys), value) }
    }
}
