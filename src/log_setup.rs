// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! `log`-crate backend writing to the COM1 UART.
//!
//! Installed as the first step of bring-up so every later stage
//! (PMAP normalization, the ACPI walk, KMEM construction, IDT install) can
//! log its progress to the serial console. Log level is fixed at compile
//! time by the `log-trace`/`log-debug` Cargo features rather than parsed
//! from an environment that does not exist in a freestanding binary.

use core::fmt::Write;

use log::{LevelFilter, Log, Metadata, Record};
use uart_16550::SerialPort;

use crate::arch::amd64::ioport::com::COM1_BASE;
use crate::sync::SpinMutex;

struct SerialLogger {
    port: SpinMutex<Option<SerialPort>>,
}

static LOGGER: SerialLogger = SerialLogger {
    port: SpinMutex::new(None),
};

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= compiled_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut guard = self.port.lock();
        if let Some(port) = guard.as_mut() {
            let _ = writeln!(port, "[{:<5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

const fn compiled_level() -> LevelFilter {
    if cfg!(feature = "log-trace") {
        LevelFilter::Trace
    } else if cfg!(feature = "log-debug") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Initialize the COM1 UART and install it as the global `log` backend.
///
/// Must run before any other bring-up stage that calls into `log::info!`
/// and friends. Idempotent: calling twice just reinitializes the port.
pub fn init() {
    let mut port = unsafe { SerialPort::new(COM1_BASE) };
    port.init();
    *LOGGER.port.lock() = Some(port);
    // set_logger fails only if already set by someone else, which cannot
    // happen in this single-threaded, single-call bring-up path.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(compiled_level());
}
