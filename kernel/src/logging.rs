//! Kernel logging facility
//!
//! Routes the `log` facade to the COM1 serial console. Log levels are
//! configured based on build configuration (debug/release).

use core::sync::atomic::{AtomicBool, Ordering};

use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;
use x86_64::instructions::interrupts;

/// Global logger instance available throughout the kernel
pub static LOGGER: Logger = Logger::new();

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Serializes whole records so lines from an IRQ never interleave with a
/// record already being written. A record raised while another is in
/// flight (an exception inside the logger) is dropped.
pub struct Logger {
    inner: Mutex<()>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    pub const fn new() -> Logger {
        Logger {
            inner: Mutex::new(()),
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    /// Formats messages as "[LEVEL] message"
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            // IRQ handlers log too; taking the lock with interrupts on
            // could spin forever on a lock the interrupted code holds.
            interrupts::without_interrupts(|| {
                // Held only by a record an exception interrupted; that
                // record is lost either way, so drop this one too.
                let Some(_guard) = self.inner.try_lock() else {
                    return;
                };
                crate::serial_println!("[{}] {}", record.level(), record.args());
            });
        }
    }

    fn flush(&self) {}
}

/// Build-dependent verbosity: Debug in debug builds, Info in release.
pub const fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Installs the serial logger. Repeated calls are ignored; a logger
/// installed by someone else is reported on the console and left in place.
pub fn init() {
    if INSTALLED.swap(true, Ordering::AcqRel) {
        return;
    }
    if log::set_logger(&LOGGER).is_err() {
        crate::serial_println!("logging: another logger is already installed");
        return;
    }
    log::set_max_level(default_level());
}
