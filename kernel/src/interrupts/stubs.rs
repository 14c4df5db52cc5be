//! Per-vector entry points.
//!
//! Every vector gets its own `x86-interrupt` function, monomorphized from a
//! const-generic stub, so a handler always knows which vector it serves and
//! no two gates share an address.

use x86_64::structures::idt::InterruptStackFrame;

use crate::constants::idt::{IDT_ENTRIES, IRQ_LINES, SPURIOUS_VECTOR};
use crate::interrupts::dispatch::Exception;
use crate::interrupts::exceptions;
use crate::interrupts::fatal::{fatal, FatalReason};
use crate::interrupts::irq::{self, IrqLine};

type Handler = extern "x86-interrupt" fn(InterruptStackFrame);
type HandlerWithCode = extern "x86-interrupt" fn(InterruptStackFrame, u64);

const EXCEPTION_VECTORS: usize = 32;

extern "x86-interrupt" fn exception_stub<const V: u8>(frame: InterruptStackFrame) {
    match Exception::from_vector(V) {
        Some(exception) => exceptions::handle(exception, &frame, None),
        None => unhandled(V, &frame),
    }
}

extern "x86-interrupt" fn exception_with_code_stub<const V: u8>(
    frame: InterruptStackFrame,
    error_code: u64,
) {
    match Exception::from_vector(V) {
        Some(exception) => exceptions::handle(exception, &frame, Some(error_code)),
        None => unhandled(V, &frame),
    }
}

extern "x86-interrupt" fn nmi_stub(frame: InterruptStackFrame) {
    exceptions::handle(Exception::NonMaskableInterrupt, &frame, None);
}

extern "x86-interrupt" fn page_fault_stub(frame: InterruptStackFrame, error_code: u64) {
    exceptions::handle_page_fault(&frame, error_code);
}

extern "x86-interrupt" fn irq_stub<const LINE: u8>(_frame: InterruptStackFrame) {
    if let Some(line) = IrqLine::new(LINE) {
        irq::dispatch(line);
    }
}

extern "x86-interrupt" fn unhandled_stub<const V: u8>(frame: InterruptStackFrame) {
    unhandled(V, &frame);
}

fn unhandled(vector: u8, frame: &InterruptStackFrame) {
    // A spurious APIC interrupt is not in service; it gets no EOI and
    // nothing to report.
    if vector == SPURIOUS_VECTOR {
        return;
    }
    fatal(FatalReason::UnhandledVector {
        vector,
        frame: frame.into(),
    });
}

macro_rules! stub_table {
    ($stub:ident as $ty:ty; $($v:literal)*) => {
        [$($stub::<$v> as $ty),*]
    };
}

static EXCEPTION_STUBS: [Handler; EXCEPTION_VECTORS] = stub_table!(exception_stub as Handler;
        0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
        16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31
);

static EXCEPTION_WITH_CODE_STUBS: [HandlerWithCode; EXCEPTION_VECTORS] =
    stub_table!(exception_with_code_stub as HandlerWithCode;
        0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
        16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31
    );

static IRQ_STUBS: [Handler; IRQ_LINES as usize] = stub_table!(irq_stub as Handler;
        0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
);

static UNHANDLED_STUBS: [Handler; IDT_ENTRIES] = stub_table!(unhandled_stub as Handler;
        0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
        16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31
        32 33 34 35 36 37 38 39 40 41 42 43 44 45 46 47
        48 49 50 51 52 53 54 55 56 57 58 59 60 61 62 63
        64 65 66 67 68 69 70 71 72 73 74 75 76 77 78 79
        80 81 82 83 84 85 86 87 88 89 90 91 92 93 94 95
        96 97 98 99 100 101 102 103 104 105 106 107 108 109 110 111
        112 113 114 115 116 117 118 119 120 121 122 123 124 125 126 127
        128 129 130 131 132 133 134 135 136 137 138 139 140 141 142 143
        144 145 146 147 148 149 150 151 152 153 154 155 156 157 158 159
        160 161 162 163 164 165 166 167 168 169 170 171 172 173 174 175
        176 177 178 179 180 181 182 183 184 185 186 187 188 189 190 191
        192 193 194 195 196 197 198 199 200 201 202 203 204 205 206 207
        208 209 210 211 212 213 214 215 216 217 218 219 220 221 222 223
        224 225 226 227 228 229 230 231 232 233 234 235 236 237 238 239
        240 241 242 243 244 245 246 247 248 249 250 251 252 253 254 255
);

/// Entry point for a populated exception vector.
pub fn exception_handler(exception: Exception) -> u64 {
    let vector = usize::from(exception.vector());
    match exception {
        Exception::NonMaskableInterrupt => nmi_stub as Handler as usize as u64,
        Exception::PageFault => page_fault_stub as HandlerWithCode as usize as u64,
        e if e.has_error_code() => EXCEPTION_WITH_CODE_STUBS[vector] as usize as u64,
        _ => EXCEPTION_STUBS[vector] as usize as u64,
    }
}

pub fn irq_handler(line: IrqLine) -> u64 {
    IRQ_STUBS[usize::from(line.index())] as usize as u64
}

/// Entry point reporting `vector` as unhandled.
pub fn unhandled_handler(vector: u8) -> u64 {
    UNHANDLED_STUBS[usize::from(vector)] as usize as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_entry_point_is_distinct() {
        let mut seen = HashSet::new();
        for vector in 0..=u8::MAX {
            assert!(seen.insert(unhandled_handler(vector)), "unhandled {vector}");
        }
        for exception in Exception::ALL {
            assert!(seen.insert(exception_handler(exception)), "{exception}");
        }
        for line in 0..IRQ_LINES {
            let line = IrqLine::new(line).unwrap();
            assert!(seen.insert(irq_handler(line)), "{line}");
        }
        assert_eq!(seen.len(), 256 + 20 + 16);
    }
}
