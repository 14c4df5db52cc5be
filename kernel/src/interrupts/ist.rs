//! Dedicated interrupt stacks.
//!
//! Vectors whose handler must run even when the interrupted stack is
//! unusable (NMI, double fault, stack-segment fault, invalid TSS) get their
//! own stack through the TSS interrupt stack table. The stacks are carved
//! once from static storage and never released.

use spin::Once;
use x86_64::VirtAddr;

use crate::constants::gdt::{
    DOUBLE_FAULT_IST_INDEX, INVALID_TSS_IST_INDEX, IST_STACK_COUNT, IST_STACK_SIZE,
    NMI_IST_INDEX, STACK_FAULT_IST_INDEX,
};
use crate::interrupts::tss::{self, IstError};

#[repr(C, align(16))]
struct IstStack([u8; IST_STACK_SIZE]);

static mut STACKS: [IstStack; IST_STACK_COUNT] =
    [const { IstStack([0; IST_STACK_SIZE]) }; IST_STACK_COUNT];

static STACK_TOPS: Once<[VirtAddr; IST_STACK_COUNT]> = Once::new();

/// An IST slot owned by one critical vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IstSlot {
    Nmi,
    DoubleFault,
    StackFault,
    InvalidTss,
}

impl IstSlot {
    pub const ALL: [IstSlot; IST_STACK_COUNT] = [
        IstSlot::Nmi,
        IstSlot::DoubleFault,
        IstSlot::StackFault,
        IstSlot::InvalidTss,
    ];

    /// 1-based index as written into an IDT gate.
    pub const fn index(self) -> u8 {
        match self {
            IstSlot::Nmi => NMI_IST_INDEX,
            IstSlot::DoubleFault => DOUBLE_FAULT_IST_INDEX,
            IstSlot::StackFault => STACK_FAULT_IST_INDEX,
            IstSlot::InvalidTss => INVALID_TSS_IST_INDEX,
        }
    }
}

/// Returns the top of every dedicated stack, carving them on first use.
/// Stacks grow down, so the top is one past the last byte.
pub fn stack_tops() -> &'static [VirtAddr; IST_STACK_COUNT] {
    STACK_TOPS.call_once(|| {
        let mut tops = [VirtAddr::zero(); IST_STACK_COUNT];
        for (i, top) in tops.iter_mut().enumerate() {
            let start = VirtAddr::from_ptr(unsafe { core::ptr::addr_of!(STACKS[i]) });
            *top = start + IST_STACK_SIZE as u64;
        }
        tops
    })
}

/// Top of the stack reserved for `slot`.
pub fn stack_top(slot: IstSlot) -> VirtAddr {
    stack_tops()[usize::from(slot.index() - 1)]
}

/// Installs every dedicated stack into its TSS slot.
pub(crate) fn bind_all() -> Result<(), IstError> {
    for slot in IstSlot::ALL {
        let top = stack_top(slot);
        tss::bind_ist(slot.index(), top)?;
        log::debug!("ist: slot {} ({:?}) -> {:#x}", slot.index(), slot, top.as_u64());
    }
    Ok(())
}
