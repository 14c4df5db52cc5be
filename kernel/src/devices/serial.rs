//! Serial port interface for UART 16550 communication.
//! Provides interrupt-safe access to write formatted text to a serial port.

use crate::constants::ports::SERIAL_PORT;
use lazy_static::lazy_static;
use spin::Mutex;
use uart_16550::SerialPort;
use x86_64::instructions::interrupts;

lazy_static! {
    /// Thread-safe wrapper around the first serial port (COM1).
    /// Initializes the port on first access.
    pub static ref SERIAL1: Mutex<SerialPort> = {
        let mut serial_port = unsafe { SerialPort::new(SERIAL_PORT) };
        serial_port.init();
        Mutex::new(serial_port)
    };
}

#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    use core::fmt::Write;
    // An IRQ that echoes a keystroke takes this lock too, so it must never
    // fire while the lock is held here.
    interrupts::without_interrupts(|| {
        // The console is best effort; a failed write has nowhere to be reported.
        let _ = SERIAL1.lock().write_fmt(args);
    });
}

/// Prints only if the port is free. For contexts that cannot be masked and
/// may have interrupted a writer holding the lock.
pub fn try_print(args: ::core::fmt::Arguments) -> bool {
    use core::fmt::Write;
    match SERIAL1.try_lock() {
        Some(mut port) => port.write_fmt(args).is_ok(),
        None => false,
    }
}

/// Last words before the processor is parked. Interrupts must already be
/// off; whoever held the lock on this single core will never run again.
pub fn emergency_print(args: ::core::fmt::Arguments) {
    use core::fmt::Write;
    if SERIAL1.is_locked() {
        unsafe { SERIAL1.force_unlock() };
    }
    let _ = SERIAL1.lock().write_fmt(args);
}

/// Prints formatted text to the serial port.
///
/// # Examples
/// ```ignore
/// serial_print!("Hello {}", "World");
/// ```
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*))
    };
}

/// Prints formatted text to the serial port, followed by a newline.
///
/// # Examples
/// ```ignore
/// serial_println!("Hello {}", "World");
/// ```
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}

/// Destination for characters produced inside interrupt handlers.
pub trait ConsoleSink {
    fn put_char(&mut self, c: char);
}

/// Echoes characters to COM1.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConsole;

impl ConsoleSink for SerialConsole {
    fn put_char(&mut self, c: char) {
        crate::serial_print!("{}", c);
    }
}
