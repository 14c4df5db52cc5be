//! Fixed bindings from IDT vectors to semantic handlers.
//!
//! Vectors 0-31 are processor exceptions, 32-47 the sixteen remapped
//! legacy IRQ lines. Everything past 47 is unhandled.

use crate::constants::idt::{DISPATCH_VECTORS, IRQ_BASE_VECTOR, IRQ_LINES};
use crate::interrupts::irq::IrqLine;
use crate::interrupts::ist::IstSlot;

/// What happens once an exception has been reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Terminal: the processor is parked through `fatal`.
    Halt,
    /// Report and return to the interrupted code.
    Resume,
}

/// Processor exceptions with a populated handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    DivideError,
    Debug,
    NonMaskableInterrupt,
    Breakpoint,
    Overflow,
    BoundRangeExceeded,
    InvalidOpcode,
    DeviceNotAvailable,
    DoubleFault,
    InvalidTss,
    SegmentNotPresent,
    StackSegmentFault,
    GeneralProtectionFault,
    PageFault,
    X87FloatingPoint,
    AlignmentCheck,
    MachineCheck,
    SimdFloatingPoint,
    Virtualization,
    SecurityException,
}

impl Exception {
    pub const ALL: [Exception; 20] = [
        Exception::DivideError,
        Exception::Debug,
        Exception::NonMaskableInterrupt,
        Exception::Breakpoint,
        Exception::Overflow,
        Exception::BoundRangeExceeded,
        Exception::InvalidOpcode,
        Exception::DeviceNotAvailable,
        Exception::DoubleFault,
        Exception::InvalidTss,
        Exception::SegmentNotPresent,
        Exception::StackSegmentFault,
        Exception::GeneralProtectionFault,
        Exception::PageFault,
        Exception::X87FloatingPoint,
        Exception::AlignmentCheck,
        Exception::MachineCheck,
        Exception::SimdFloatingPoint,
        Exception::Virtualization,
        Exception::SecurityException,
    ];

    pub const fn vector(self) -> u8 {
        match self {
            Exception::DivideError => 0,
            Exception::Debug => 1,
            Exception::NonMaskableInterrupt => 2,
            Exception::Breakpoint => 3,
            Exception::Overflow => 4,
            Exception::BoundRangeExceeded => 5,
            Exception::InvalidOpcode => 6,
            Exception::DeviceNotAvailable => 7,
            Exception::DoubleFault => 8,
            Exception::InvalidTss => 10,
            Exception::SegmentNotPresent => 11,
            Exception::StackSegmentFault => 12,
            Exception::GeneralProtectionFault => 13,
            Exception::PageFault => 14,
            Exception::X87FloatingPoint => 16,
            Exception::AlignmentCheck => 17,
            Exception::MachineCheck => 18,
            Exception::SimdFloatingPoint => 19,
            Exception::Virtualization => 20,
            Exception::SecurityException => 30,
        }
    }

    pub const fn from_vector(vector: u8) -> Option<Exception> {
        let mut i = 0;
        while i < Self::ALL.len() {
            if Self::ALL[i].vector() == vector {
                return Some(Self::ALL[i]);
            }
            i += 1;
        }
        None
    }

    pub const fn name(self) -> &'static str {
        match self {
            Exception::DivideError => "Division By Zero",
            Exception::Debug => "Debug",
            Exception::NonMaskableInterrupt => "Non-maskable Interrupt",
            Exception::Breakpoint => "Breakpoint",
            Exception::Overflow => "Overflow",
            Exception::BoundRangeExceeded => "Bound Range Exceeded",
            Exception::InvalidOpcode => "Invalid Opcode",
            Exception::DeviceNotAvailable => "Device Not Available",
            Exception::DoubleFault => "Double Fault",
            Exception::InvalidTss => "Invalid TSS",
            Exception::SegmentNotPresent => "Segment Not Present",
            Exception::StackSegmentFault => "Stack-Segment Fault",
            Exception::GeneralProtectionFault => "General Protection Fault",
            Exception::PageFault => "Page Fault",
            Exception::X87FloatingPoint => "x87 Floating-Point Exception",
            Exception::AlignmentCheck => "Alignment Check",
            Exception::MachineCheck => "Machine Check",
            Exception::SimdFloatingPoint => "SIMD Floating-Point Exception",
            Exception::Virtualization => "Virtualization Exception",
            Exception::SecurityException => "Security Exception",
        }
    }

    /// Whether the processor pushes an error code beneath the frame.
    pub const fn has_error_code(self) -> bool {
        matches!(
            self,
            Exception::DoubleFault
                | Exception::InvalidTss
                | Exception::SegmentNotPresent
                | Exception::StackSegmentFault
                | Exception::GeneralProtectionFault
                | Exception::PageFault
                | Exception::AlignmentCheck
                | Exception::SecurityException
        )
    }

    /// Whether the error code is a segment selector index.
    pub const fn has_selector_error_code(self) -> bool {
        matches!(
            self,
            Exception::InvalidTss
                | Exception::SegmentNotPresent
                | Exception::StackSegmentFault
                | Exception::GeneralProtectionFault
        )
    }

    pub const fn ist(self) -> Option<IstSlot> {
        match self {
            Exception::NonMaskableInterrupt => Some(IstSlot::Nmi),
            Exception::DoubleFault => Some(IstSlot::DoubleFault),
            Exception::InvalidTss => Some(IstSlot::InvalidTss),
            Exception::StackSegmentFault => Some(IstSlot::StackFault),
            _ => None,
        }
    }

    pub const fn policy(self) -> Policy {
        match self {
            Exception::NonMaskableInterrupt => Policy::Resume,
            _ => Policy::Halt,
        }
    }
}

impl core::fmt::Display for Exception {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionBinding {
    pub exception: Exception,
    pub error_code: bool,
    pub ist: Option<IstSlot>,
    pub policy: Policy,
}

impl ExceptionBinding {
    pub const fn of(exception: Exception) -> Self {
        Self {
            exception,
            error_code: exception.has_error_code(),
            ist: exception.ist(),
            policy: exception.policy(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBinding {
    Exception(ExceptionBinding),
    Irq(IrqLine),
    Unhandled,
}

pub static DISPATCH_TABLE: [VectorBinding; DISPATCH_VECTORS] = build_table();

const fn build_table() -> [VectorBinding; DISPATCH_VECTORS] {
    let mut table = [VectorBinding::Unhandled; DISPATCH_VECTORS];

    let mut i = 0;
    while i < Exception::ALL.len() {
        let exception = Exception::ALL[i];
        table[exception.vector() as usize] =
            VectorBinding::Exception(ExceptionBinding::of(exception));
        i += 1;
    }

    let mut line = 0;
    while line < IRQ_LINES {
        if let Some(irq) = IrqLine::new(line) {
            table[(IRQ_BASE_VECTOR + line) as usize] = VectorBinding::Irq(irq);
        }
        line += 1;
    }

    table
}

/// Binding for any of the 256 vectors.
pub fn binding(vector: u8) -> VectorBinding {
    DISPATCH_TABLE
        .get(usize::from(vector))
        .copied()
        .unwrap_or(VectorBinding::Unhandled)
}
