use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::time::SystemTime;

const RESET: &str = "\x1b[0m";
const BLUE: &str = "\x1b[34m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";

static LOGGER: Logger = Logger {};

/// Console backend for the `log` facade.
pub struct Logger {}

impl Logger {
    /// Installs the logger globally. Fails if another logger is already set.
    pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_logger(&LOGGER)?;
        log::set_max_level(level);

        Ok(())
    }

    fn get_timestamp() -> String {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();

        let secs = now.as_secs();
        let millis = now.subsec_millis();

        let hours = (secs / 3600) % 24;
        let minutes = (secs / 60) % 60;
        let seconds = secs % 60;

        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    }

    fn level_style(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Trace | Level::Debug => ("DEBUG", BLUE),
            Level::Info => ("INFO", GREEN),
            Level::Warn => ("WARN", YELLOW),
            Level::Error => ("ERROR", RED),
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let (level_str, color) = Self::level_style(record.level());
        let line = format!(
            "{} [{}{}{}] {}",
            Self::get_timestamp(),
            color,
            level_str,
            RESET,
            record.args()
        );

        // Stdout is reserved for program output such as `--info` JSON
        eprintln!("{}", line);
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_and_debug_share_a_label() {
        assert_eq!(Logger::level_style(Level::Trace).0, "DEBUG");
        assert_eq!(Logger::level_style(Level::Debug).0, "DEBUG");
        assert_eq!(Logger::level_style(Level::Warn), ("WARN", YELLOW));
    }

    #[test]
    fn second_init_fails_as_std_error() {
        let _ = Logger::init(LevelFilter::Warn);

        let second: Result<(), Box<dyn std::error::Error>> = Logger::init(LevelFilter::Warn).map_err(Into::into);

        assert!(second.is_err());
    }

    #[test]
    fn timestamp_has_fixed_width() {
        let stamp = Logger::get_timestamp();

        assert_eq!(stamp.len(), "00:00:00.000".len());
        assert_eq!(&stamp[2..3], ":");
        assert_eq!(&stamp[8..9], ".");
    }
}
