//! # QEMU Debug Console Logging
//!
//! A `log::Log` backend for the hypervisor core that writes each record as
//! `"[LEVEL] target: message\n"` to QEMU's debug console (I/O port `0x402`).
//!
//! ```text
//! log::info!(..) ─► QemuLogger ─► ByteSink ─► out 0x402 ─► -debugcon
//! qemu_trace!(..) ─────────────────────────┘
//! ```
//!
//! Capture the output on the host with `qemu-system-x86_64 -debugcon stdio`.
//!
//! ```rust,no_run
//! use kernel_qemu::QemuLogger;
//! use log::LevelFilter;
//!
//! static LOGGER: QemuLogger = QemuLogger::new(LevelFilter::Debug);
//!
//! LOGGER.init().expect("logger already set");
//! log::info!("memory initialized");
//! ```
//!
//! With the `enabled` feature off (or on a non-x86 host) the port writes
//! compile to nothing; the formatting still happens, so tests can swap in
//! their own [`ByteSink`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;
mod sink;

pub use logger::QemuLogger;
pub use sink::{ByteSink, DebugconPort, SinkWriter};

#[doc(hidden)]
pub mod qemu_fmt {
    use crate::sink::{DebugconPort, SinkWriter};
    use core::fmt;

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best-effort output.
        let _ = fmt::write(&mut SinkWriter::new(&DebugconPort), args);
    }
}

/// `print!`-style output straight to the debug console, bypassing `log`.
///
/// ```rust,no_run
/// kernel_qemu::qemu_trace!("page fault at {:#x}\n", 0xdead_b000_u64);
/// ```
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
