use crate::sink::{ByteSink, DebugconPort, SinkWriter};
use core::fmt::Write;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log` backend writing `"[LEVEL] target: message\n"` lines to a
/// [`ByteSink`], by default the QEMU debug console.
pub struct QemuLogger<S = DebugconPort> {
    max_level: LevelFilter,
    sink: S,
}

impl QemuLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self::with_sink(max_level, DebugconPort)
    }
}

impl<S> QemuLogger<S> {
    #[must_use]
    pub const fn with_sink(max_level: LevelFilter, sink: S) -> Self {
        Self { max_level, sink }
    }

    #[must_use]
    pub const fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: ByteSink + Send + Sync> QemuLogger<S> {
    /// Install as the global logger. Call once during early init.
    ///
    /// # Errors
    /// Fails if a logger was already installed.
    pub fn init(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

impl<S: ByteSink + Send + Sync> Log for QemuLogger<S> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = writeln!(
            SinkWriter::new(&self.sink),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<u8>>);

    impl ByteSink for Capture {
        fn write_byte(&self, byte: u8) {
            self.0.lock().unwrap().push(byte);
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn emit(logger: &QemuLogger<Capture>, level: Level, msg: &str) {
        logger.log(
            &Record::builder()
                .level(level)
                .target("kernel_alloc::frame_alloc")
                .args(format_args!("{msg}"))
                .build(),
        );
    }

    #[test]
    fn formats_level_target_message() {
        let logger = QemuLogger::with_sink(LevelFilter::Info, Capture::default());
        emit(&logger, Level::Info, "4096 frames free");
        assert_eq!(logger.sink().text(), "[INFO] kernel_alloc::frame_alloc: 4096 frames free\n");
    }

    #[test]
    fn drops_records_above_max_level() {
        let logger = QemuLogger::with_sink(LevelFilter::Info, Capture::default());
        emit(&logger, Level::Debug, "hidden");
        emit(&logger, Level::Warn, "shown");
        assert_eq!(logger.sink().text(), "[WARN] kernel_alloc::frame_alloc: shown\n");
        assert!(!logger.enabled(&Metadata::builder().level(Level::Trace).build()));
    }
}
