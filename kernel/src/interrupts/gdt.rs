//! Global Descriptor Table.
//!
//! Seven 8-byte slots: null, kernel code/data, user code/data and the
//! 16-byte TSS descriptor. Every descriptor is encoded by hand from plain
//! integers so the layout can be checked bit for bit.

use spin::Once;
use x86_64::instructions::segmentation::{Segment, CS, DS, ES, FS, GS, SS};
use x86_64::instructions::tables::{lgdt, load_tss};
use x86_64::structures::gdt::SegmentSelector;
use x86_64::structures::DescriptorTablePointer;
use x86_64::VirtAddr;

use crate::constants::gdt::*;
use crate::interrupts::tss;

// Access byte bits
const ACCESS_PRESENT: u8 = 1 << 7;
const ACCESS_CODE_DATA: u8 = 1 << 4;
const ACCESS_EXECUTABLE: u8 = 1 << 3;
const ACCESS_READ_WRITE: u8 = 1 << 1;

// Flag nibble bits
const FLAG_GRANULARITY_4K: u8 = 1 << 3;
const FLAG_LONG_MODE: u8 = 1 << 1;

/// One code or data segment descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub base: u32,
    /// 20-bit limit, in units selected by the granularity flag.
    pub limit: u32,
    pub access: u8,
    /// Upper nibble of the granularity byte (G, D/B, L, AVL).
    pub flags: u8,
}

impl SegmentDescriptor {
    pub const NULL: Self = Self {
        base: 0,
        limit: 0,
        access: 0,
        flags: 0,
    };

    /// A flat 4 GiB segment starting at 0.
    pub const fn flat(access: u8, flags: u8) -> Self {
        Self {
            base: 0,
            limit: FLAT_LIMIT,
            access,
            flags,
        }
    }

    pub const fn encode(self) -> u64 {
        let base = self.base as u64;
        let limit = self.limit as u64;
        (limit & 0xFFFF)
            | (base & 0xFF_FFFF) << 16
            | (self.access as u64) << 40
            | ((limit >> 16) & 0xF) << 48
            | ((self.flags & 0xF) as u64) << 52
            | ((base >> 24) & 0xFF) << 56
    }

    pub const fn decode(raw: u64) -> Self {
        Self {
            base: (((raw >> 16) & 0xFF_FFFF) | ((raw >> 56) & 0xFF) << 24) as u32,
            limit: ((raw & 0xFFFF) | ((raw >> 48) & 0xF) << 16) as u32,
            access: (raw >> 40) as u8,
            flags: ((raw >> 52) & 0xF) as u8,
        }
    }

    pub const fn is_present(&self) -> bool {
        self.access & ACCESS_PRESENT != 0
    }

    pub const fn privilege(&self) -> u8 {
        (self.access >> 5) & 0x3
    }

    pub const fn is_executable(&self) -> bool {
        self.access & ACCESS_CODE_DATA != 0 && self.access & ACCESS_EXECUTABLE != 0
    }

    /// Readable for code segments, writable for data segments.
    pub const fn is_read_write(&self) -> bool {
        self.access & ACCESS_READ_WRITE != 0
    }

    pub const fn is_long_mode(&self) -> bool {
        self.flags & FLAG_LONG_MODE != 0
    }

    pub const fn has_page_granularity(&self) -> bool {
        self.flags & FLAG_GRANULARITY_4K != 0
    }
}

/// The 16-byte system descriptor pointing at the TSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TssDescriptor {
    pub base: u64,
    pub limit: u32,
}

impl TssDescriptor {
    pub const fn encode(self) -> [u64; 2] {
        let low = SegmentDescriptor {
            base: self.base as u32,
            limit: self.limit,
            access: ACCESS_TSS,
            flags: 0,
        }
        .encode();
        [low, self.base >> 32]
    }

    pub const fn decode(raw: [u64; 2]) -> Self {
        let low = SegmentDescriptor::decode(raw[0]);
        Self {
            base: low.base as u64 | (raw[1] & 0xFFFF_FFFF) << 32,
            limit: low.limit,
        }
    }
}

/// Descriptor roles, one slot each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentRole {
    Null,
    KernelCode,
    KernelData,
    UserCode,
    UserData,
    Tss,
}

impl SegmentRole {
    pub const ALL: [SegmentRole; 6] = [
        SegmentRole::Null,
        SegmentRole::KernelCode,
        SegmentRole::KernelData,
        SegmentRole::UserCode,
        SegmentRole::UserData,
        SegmentRole::Tss,
    ];

    pub const fn index(self) -> u16 {
        match self {
            SegmentRole::Null => NULL_INDEX,
            SegmentRole::KernelCode => KERNEL_CODE_INDEX,
            SegmentRole::KernelData => KERNEL_DATA_INDEX,
            SegmentRole::UserCode => USER_CODE_INDEX,
            SegmentRole::UserData => USER_DATA_INDEX,
            SegmentRole::Tss => TSS_INDEX,
        }
    }

    /// Table-relative selector with RPL 0.
    pub const fn selector(self) -> SegmentSelector {
        SegmentSelector(self.index() * 8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct Gdt {
    entries: [u64; GDT_ENTRIES],
}

impl Gdt {
    pub const fn new(tss_base: u64) -> Self {
        let tss = TssDescriptor {
            base: tss_base,
            limit: tss::TSS_LIMIT,
        }
        .encode();

        Self {
            entries: [
                SegmentDescriptor::NULL.encode(),
                SegmentDescriptor::flat(ACCESS_KERNEL_CODE, FLAGS_CODE64).encode(),
                SegmentDescriptor::flat(ACCESS_KERNEL_DATA, FLAGS_DATA).encode(),
                SegmentDescriptor::flat(ACCESS_USER_CODE, FLAGS_CODE64).encode(),
                SegmentDescriptor::flat(ACCESS_USER_DATA, FLAGS_DATA).encode(),
                tss[0],
                tss[1],
            ],
        }
    }

    pub fn raw(&self, index: usize) -> u64 {
        self.entries[index]
    }

    pub fn segment(&self, role: SegmentRole) -> SegmentDescriptor {
        SegmentDescriptor::decode(self.entries[role.index() as usize])
    }

    pub fn tss_descriptor(&self) -> TssDescriptor {
        let index = TSS_INDEX as usize;
        TssDescriptor::decode([self.entries[index], self.entries[index + 1]])
    }

    fn pointer(&'static self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (GDT_ENTRIES * 8 - 1) as u16,
            base: VirtAddr::from_ptr(self.entries.as_ptr()),
        }
    }

    /// Loads the table, reloads every segment register from it and loads
    /// the task register.
    ///
    /// # Safety
    ///
    /// The TSS this table points at must stay valid for the rest of the
    /// kernel's life, and the caller must be running in ring 0.
    unsafe fn load(&'static self) {
        lgdt(&self.pointer());

        // CS can only change through a far return; x86_64 emits the
        // push/retfq sequence for us.
        CS::set_reg(SegmentRole::KernelCode.selector());

        let data = SegmentRole::KernelData.selector();
        DS::set_reg(data);
        ES::set_reg(data);
        FS::set_reg(data);
        GS::set_reg(data);
        SS::set_reg(data);

        load_tss(SegmentRole::Tss.selector());
    }
}

static GDT: Once<Gdt> = Once::new();

/// Builds the GDT around the process-wide TSS and makes it live.
pub(crate) fn build_gdt() {
    let gdt = GDT.call_once(|| Gdt::new(tss::base().as_u64()));

    unsafe { gdt.load() };

    log::debug!(
        "gdt: loaded, cs={:#x} ds={:#x} tr={:#x}",
        SegmentRole::KernelCode.selector().0,
        SegmentRole::KernelData.selector().0,
        SegmentRole::Tss.selector().0
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSS_BASE: u64 = 0xFFFF_8000_DEAD_BEE0;

    #[test]
    fn selectors_are_index_times_eight() {
        for role in SegmentRole::ALL {
            assert_eq!(role.selector().0, role.index() * 8, "{role:?}");
        }
        assert_eq!(SegmentRole::KernelCode.selector().0, 0x08);
        assert_eq!(SegmentRole::KernelData.selector().0, 0x10);
        assert_eq!(SegmentRole::UserCode.selector().0, 0x18);
        assert_eq!(SegmentRole::UserData.selector().0, 0x20);
        assert_eq!(SegmentRole::Tss.selector().0, 0x28);
    }

    #[test]
    fn kernel_code_segment_decodes() {
        let gdt = Gdt::new(TSS_BASE);
        let code = gdt.segment(SegmentRole::KernelCode);

        assert!(code.is_present());
        assert!(code.is_executable());
        assert!(code.is_read_write());
        assert!(code.is_long_mode());
        assert!(code.has_page_granularity());
        assert_eq!(code.privilege(), 0);
        assert_eq!(code.base, 0);
        assert_eq!(code.limit, FLAT_LIMIT);
        assert_eq!(gdt.raw(1), 0x00AF_9A00_0000_FFFF);
    }

    #[test]
    fn flat_segments_have_expected_roles() {
        let gdt = Gdt::new(TSS_BASE);

        assert_eq!(gdt.raw(0), 0);

        let data = gdt.segment(SegmentRole::KernelData);
        assert!(data.is_present() && !data.is_executable() && data.is_read_write());
        assert_eq!(data.privilege(), 0);
        assert_eq!(gdt.raw(2), 0x00CF_9200_0000_FFFF);

        let user_code = gdt.segment(SegmentRole::UserCode);
        assert!(user_code.is_executable() && user_code.is_long_mode());
        assert_eq!(user_code.privilege(), 3);

        let user_data = gdt.segment(SegmentRole::UserData);
        assert!(!user_data.is_executable());
        assert_eq!(user_data.privilege(), 3);
    }

    #[test]
    fn tss_descriptor_carries_full_base() {
        let gdt = Gdt::new(TSS_BASE);
        let descriptor = gdt.tss_descriptor();

        assert_eq!(descriptor.base, TSS_BASE);
        assert_eq!(descriptor.limit, tss::TSS_LIMIT);
        assert_eq!(gdt.raw(6), TSS_BASE >> 32);
        assert_eq!((gdt.raw(5) >> 40) as u8, ACCESS_TSS);
    }

    #[test]
    fn segment_encoding_splits_base_and_limit() {
        let descriptor = SegmentDescriptor {
            base: 0x1234_5678,
            limit: 0xA_BCDE,
            access: 0x92,
            flags: 0x4,
        };
        let raw = descriptor.encode();

        assert_eq!(raw & 0xFFFF, 0xBCDE);
        assert_eq!((raw >> 16) & 0xFF_FFFF, 0x34_5678);
        assert_eq!((raw >> 48) & 0xF, 0xA);
        assert_eq!((raw >> 56) & 0xFF, 0x12);
        assert_eq!(SegmentDescriptor::decode(raw), descriptor);
    }
}
