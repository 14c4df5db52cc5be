//! Exception reporting.
//!
//! Handlers copy the hardware frame into a [`FrameSnapshot`], decode the
//! error code and hand the resulting [`ExceptionReport`] to the policy of
//! the vector: NMI is reported and resumed, everything else is terminal.

use core::fmt;

use x86_64::registers::control::{Cr2, Cr3};
use x86_64::structures::idt::{InterruptStackFrame, PageFaultErrorCode};
use x86_64::VirtAddr;

use crate::constants::memory::{BOOT_IDENTITY_OFFSET, PAGE_SIZE};
use crate::interrupts::dispatch::{Exception, Policy};
use crate::interrupts::fatal::{fatal, FatalReason};
use crate::memory::paging::{walk_top_levels, TopLevelWalk};
use crate::memory::OffsetPhysMemory;
use crate::serial;

/// Plain copy of the processor-pushed interrupt frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub ip: u64,
    pub cs: u16,
    pub flags: u64,
    pub sp: u64,
    pub ss: u16,
}

impl From<&InterruptStackFrame> for FrameSnapshot {
    fn from(frame: &InterruptStackFrame) -> Self {
        Self {
            ip: frame.instruction_pointer.as_u64(),
            cs: frame.code_segment.0,
            flags: frame.cpu_flags.bits(),
            sp: frame.stack_pointer.as_u64(),
            ss: frame.stack_segment.0,
        }
    }
}

impl fmt::Display for FrameSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RIP: {:#x}", self.ip)?;
        writeln!(f, "CS:  {:#x}", self.cs)?;
        writeln!(f, "RFLAGS: {:#x}", self.flags)?;
        writeln!(f, "RSP: {:#x}", self.sp)?;
        write!(f, "SS:  {:#x}", self.ss)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorTable {
    Gdt,
    Idt,
    Ldt,
}

/// Error code of the selector-reporting exceptions (10-13).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorError {
    /// The fault happened while delivering an external event.
    pub external: bool,
    pub table: DescriptorTable,
    pub index: u16,
}

impl SelectorError {
    pub const fn decode(code: u64) -> Self {
        let table = if code & 0b10 != 0 {
            DescriptorTable::Idt
        } else if code & 0b100 != 0 {
            DescriptorTable::Ldt
        } else {
            DescriptorTable::Gdt
        };
        Self {
            external: code & 1 != 0,
            table,
            index: ((code >> 3) & 0x1FFF) as u16,
        }
    }
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[{}]", self.table, self.index)?;
        if self.external {
            f.write_str(" (external)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDetail {
    None,
    Raw(u64),
    Selector(SelectorError),
    PageFault(PageFaultErrorCode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCause {
    NotPresent,
    ProtectionViolation,
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultCause::NotPresent => f.write_str("Page not present"),
            FaultCause::ProtectionViolation => f.write_str("Protection violation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionReport {
    pub exception: Exception,
    pub frame: FrameSnapshot,
    pub error_code: Option<u64>,
    /// Faulting linear address (CR2), page faults only.
    pub fault_address: Option<u64>,
    pub walk: Option<TopLevelWalk>,
}

impl ExceptionReport {
    pub fn new(exception: Exception, frame: FrameSnapshot, error_code: Option<u64>) -> Self {
        Self {
            exception,
            frame,
            error_code,
            fault_address: None,
            walk: None,
        }
    }

    pub fn with_fault_address(mut self, addr: u64) -> Self {
        self.fault_address = Some(addr);
        self
    }

    pub fn with_walk(mut self, walk: TopLevelWalk) -> Self {
        self.walk = Some(walk);
        self
    }

    pub fn detail(&self) -> ErrorDetail {
        let Some(code) = self.error_code else {
            return ErrorDetail::None;
        };
        match self.exception {
            Exception::PageFault => {
                ErrorDetail::PageFault(PageFaultErrorCode::from_bits_truncate(code))
            }
            e if e.has_selector_error_code() => ErrorDetail::Selector(SelectorError::decode(code)),
            _ => ErrorDetail::Raw(code),
        }
    }

    /// Not-present versus protection violation, where the vector tells.
    pub fn cause(&self) -> Option<FaultCause> {
        match (self.exception, self.error_code) {
            (Exception::PageFault, Some(code)) => Some(if code & 1 == 0 {
                FaultCause::NotPresent
            } else {
                FaultCause::ProtectionViolation
            }),
            (Exception::SegmentNotPresent, _) => Some(FaultCause::NotPresent),
            _ => None,
        }
    }
}

impl fmt::Display for ExceptionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "EXCEPTION: {} (vector {})",
            self.exception,
            self.exception.vector()
        )?;
        write!(f, "{}", self.frame)?;

        if let Some(code) = self.error_code {
            write!(f, "\nError code: {code:#x}")?;
            match self.detail() {
                ErrorDetail::Selector(selector) => write!(f, " ({selector})")?,
                ErrorDetail::PageFault(flags) => write!(f, " ({flags:?})")?,
                ErrorDetail::Raw(_) | ErrorDetail::None => {}
            }
        }
        if let Some(cause) = self.cause() {
            write!(f, "\n- {cause}")?;
        }
        if let Some(addr) = self.fault_address {
            write!(f, "\nFault address: {addr:#x}")?;
            if let Some(walk) = &self.walk {
                write!(f, "\n{walk}")?;
            }
            write!(f, "\nPage aligned address: {:#x}", addr & !(PAGE_SIZE - 1))?;
            write!(f, "\nOffset in page: {:#x}", addr & (PAGE_SIZE - 1))?;
        }
        Ok(())
    }
}

/// Common tail of every exception stub.
pub(crate) fn handle(exception: Exception, frame: &InterruptStackFrame, error_code: Option<u64>) {
    conclude(ExceptionReport::new(exception, frame.into(), error_code));
}

/// Page faults read CR2 and, for a missing page, walk the two top paging
/// levels. The mapping is never repaired.
pub(crate) fn handle_page_fault(frame: &InterruptStackFrame, error_code: u64) {
    let addr = Cr2::read_raw();
    let mut report = ExceptionReport::new(Exception::PageFault, frame.into(), Some(error_code))
        .with_fault_address(addr);

    if report.cause() == Some(FaultCause::NotPresent) {
        let (pml4, _) = Cr3::read();
        // Boot page tables sit in identity-mapped low memory.
        let mem = unsafe { OffsetPhysMemory::new(BOOT_IDENTITY_OFFSET) };
        let walk = walk_top_levels(&mem, pml4.start_address(), VirtAddr::new_truncate(addr));
        report = report.with_walk(walk);
    }

    conclude(report);
}

fn conclude(report: ExceptionReport) {
    match report.exception.policy() {
        Policy::Halt => fatal(FatalReason::Exception(report)),
        Policy::Resume => {
            // An NMI can land while the console lock is held; drop the
            // notice rather than spin on it.
            let _ = serial::try_print(format_args!(
                "{} at RIP {:#x}\n",
                report.exception, report.frame.ip
            ));
        }
    }
}
