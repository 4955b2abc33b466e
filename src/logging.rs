//! `log` backend.
//!
//! Records are formatted as `[LEVEL] target: message` and handed to a sink
//! chosen by the board. On hardware that is the PL011 console.

use crate::config::DEFAULT_LOG_LEVEL;
use crate::errors::KernelError;
use core::fmt;
use log::{LevelFilter, Log, Metadata, Record};
use spin::Once;

/// Where formatted log lines go.
pub type Sink = fn(fmt::Arguments<'_>);

static SINK: Once<Sink> = Once::new();
static LOGGER: KernelLogger = KernelLogger;

struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(sink) = SINK.get() {
            sink(format_args!(
                "[{:<5}] {}: {}\n",
                record.level(),
                record.target(),
                record.args()
            ));
        }
    }

    fn flush(&self) {}
}

/// Install the kernel logger.
///
/// Fails with [`KernelError::LoggerAlreadySet`] if any logger is already
/// installed.
pub fn init(level: LevelFilter, sink: Sink) -> Result<(), KernelError> {
    if SINK.is_completed() {
        return Err(KernelError::LoggerAlreadySet);
    }
    SINK.call_once(|| sink);
    log::set_logger(&LOGGER).map_err(|_| KernelError::LoggerAlreadySet)?;
    log::set_max_level(level);
    Ok(())
}

/// [`init`] at the configured default level, printing to the PL011 console.
#[cfg(all(target_arch = "arm", not(target_feature = "mclass")))]
pub fn init_default() -> Result<(), KernelError> {
    init(DEFAULT_LOG_LEVEL, crate::arch::uart_pl011::write_fmt)
}

/// [`init`] at the configured default level with the given sink.
#[cfg(not(all(target_arch = "arm", not(target_feature = "mclass"))))]
pub fn init_default(sink: Sink) -> Result<(), KernelError> {
    init(DEFAULT_LOG_LEVEL, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use core::fmt::Write;
    use spin::Mutex;

    static CAPTURED: Mutex<String> = Mutex::new(String::new());

    fn capture(args: fmt::Arguments<'_>) {
        let _ = CAPTURED.lock().write_fmt(args);
    }

    #[test]
    fn test_init_formats_and_rejects_second_logger() {
        init_default(capture).unwrap();
        assert_eq!(init(LevelFilter::Trace, capture), Err(KernelError::LoggerAlreadySet));

        log::info!(target: "switch", "hello {}", 7);
        log::trace!(target: "switch", "below the default level");

        let out = CAPTURED.lock().clone();
        assert!(out.contains("[INFO ] switch: hello 7\n"));
        assert!(!out.contains("below the default level"));
    }
}
