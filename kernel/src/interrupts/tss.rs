//! Task State Segment.
//!
//! In long mode the TSS only carries stack pointers: RSP0 for privilege
//! changes into ring 0 and the seven IST slots used by gates with a
//! non-zero stack index.

use spin::Mutex;
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

use crate::interrupts::critical;
use crate::interrupts::lifecycle::{self, BootStage, LifecycleError};

/// Byte limit written into the TSS descriptor.
pub const TSS_LIMIT: u32 = core::mem::size_of::<TaskStateSegment>() as u32 - 1;

/// The single process-wide TSS. Its address is baked into the GDT, so it
/// must never move.
static TSS: Mutex<TaskStateSegment> = Mutex::new(TaskStateSegment::new());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IstError {
    /// IST slots are numbered 1 through 7; 0 means "no stack switch".
    InvalidIndex(u8),
    /// Stack tops must be 16-byte aligned for the interrupt frame push.
    MisalignedStack(u64),
}

impl core::fmt::Display for IstError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidIndex(index) => write!(f, "IST index {index} outside 1..=7"),
            Self::MisalignedStack(top) => write!(f, "IST stack top {top:#x} is not 16-byte aligned"),
        }
    }
}

/// Address of the TSS, as written into its GDT descriptor.
pub fn base() -> VirtAddr {
    let tss: *const TaskStateSegment = &*TSS.lock();
    VirtAddr::from_ptr(tss)
}

/// Writes `stack_top` into IST slot `index` (1-based) of `tss`.
pub fn set_ist(tss: &mut TaskStateSegment, index: u8, stack_top: VirtAddr) -> Result<(), IstError> {
    if !(1..=7).contains(&index) {
        return Err(IstError::InvalidIndex(index));
    }
    if stack_top.as_u64() % 16 != 0 {
        return Err(IstError::MisalignedStack(stack_top.as_u64()));
    }
    tss.interrupt_stack_table[usize::from(index - 1)] = stack_top;
    Ok(())
}

/// Binds `stack_top` to IST slot `index` of the live TSS.
pub(crate) fn bind_ist(index: u8, stack_top: VirtAddr) -> Result<(), IstError> {
    critical(|| set_ist(&mut TSS.lock(), index, stack_top))
}

/// Update kernel stack pointer used on entry into ring 0. The TSS is only
/// live once the GDT carrying its descriptor is loaded.
pub fn set_kernel_stack(stack_top: VirtAddr) -> Result<(), LifecycleError> {
    lifecycle::require(BootStage::GdtLoaded)?;
    critical(|| {
        TSS.lock().privilege_stack_table[0] = stack_top;
    });
    Ok(())
}

/// Get current ring 0 stack pointer
pub fn kernel_stack() -> Result<VirtAddr, LifecycleError> {
    lifecycle::require(BootStage::GdtLoaded)?;
    let tss = critical(|| *TSS.lock());
    let table = tss.privilege_stack_table;
    Ok(table[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_matches_hardware_layout() {
        assert_eq!(TSS_LIMIT, 0x67);
    }

    #[test]
    fn ist_index_is_one_based() {
        let mut tss = TaskStateSegment::new();
        let top = VirtAddr::new(0x8000);

        set_ist(&mut tss, 1, top).unwrap();
        set_ist(&mut tss, 7, top + 0x1000u64).unwrap();

        let table = tss.interrupt_stack_table;
        assert_eq!(table[0], top);
        assert_eq!(table[6], top + 0x1000u64);
        assert!(table[1..6].iter().all(|slot| slot.is_null()));
    }

    #[test]
    fn rejects_out_of_range_indices() {
        let mut tss = TaskStateSegment::new();
        let top = VirtAddr::new(0x8000);

        assert_eq!(set_ist(&mut tss, 0, top), Err(IstError::InvalidIndex(0)));
        assert_eq!(set_ist(&mut tss, 8, top), Err(IstError::InvalidIndex(8)));
        assert_eq!(
            set_ist(&mut tss, 1, VirtAddr::new(0x8008)),
            Err(IstError::MisalignedStack(0x8008))
        );
        let table = tss.interrupt_stack_table;
        assert!(table.iter().all(|slot| slot.is_null()));
    }

    #[test]
    fn kernel_stack_needs_loaded_gdt() {
        let early = LifecycleError::NotReached {
            required: BootStage::GdtLoaded,
            current: BootStage::Uninitialized,
        };
        assert_eq!(set_kernel_stack(VirtAddr::new(0x9000)), Err(early));
        assert_eq!(kernel_stack(), Err(early));
    }
}
