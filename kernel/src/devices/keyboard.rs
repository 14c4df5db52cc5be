//! PS/2 keyboard scancode translation (scancode set 1, US layout, no modifiers).

/// Scancodes with the high bit set report a key release.
pub const BREAK_BIT: u8 = 0x80;

/// Make-code to ASCII. Zero marks keys with no printable character
/// (escape, modifiers).
const SCANCODE_TO_ASCII: [u8; 0x3A] = [
    0, 0, b'1', b'2', b'3', b'4', b'5', b'6', // 0x00
    b'7', b'8', b'9', b'0', b'-', b'=', 0x08, b'\t', // 0x08
    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', // 0x10
    b'o', b'p', b'[', b']', b'\n', 0, b'a', b's', // 0x18
    b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', // 0x20
    b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v', // 0x28
    b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', // 0x30
    0, b' ', // 0x38
];

/// Returns whether `scancode` reports a key press.
#[inline]
pub const fn is_make_code(scancode: u8) -> bool {
    scancode & BREAK_BIT == 0
}

/// Translates a make-code to its character. Break codes and keys outside the
/// table yield `None`.
pub fn translate(scancode: u8) -> Option<char> {
    if !is_make_code(scancode) {
        return None;
    }
    match SCANCODE_TO_ASCII.get(scancode as usize) {
        Some(&0) | None => None,
        Some(&ascii) => Some(ascii as char),
    }
}
