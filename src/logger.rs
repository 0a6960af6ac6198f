use std::io::{self, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::error::Error;

struct StderrLogger {
    level: AtomicUsize,
}

impl StderrLogger {
    const fn new() -> Self {
        Self {
            level: AtomicUsize::new(LevelFilter::Info as usize),
        }
    }

    fn current_level(&self) -> LevelFilter {
        match self.level.load(Ordering::Relaxed) {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn store_level(&self, level: LevelFilter) {
        self.level.store(level as usize, Ordering::Relaxed);
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.current_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = writeln!(io::stderr(), "{}", format_line(record));
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

fn format_line(record: &Record) -> String {
    format!("[{}] {}", record.level(), record.args())
}

static LOGGER: StderrLogger = StderrLogger::new();

pub fn init_logger(level: Level) -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(LevelFilter::Trace);
    set_log_level(level);
    Ok(())
}

pub fn set_log_level(level: Level) {
    LOGGER.store_level(level.to_level_filter());
}

/// Parse a level name from settings, case-insensitive.
pub fn parse_level(s: &str) -> Result<Level, Error> {
    Level::from_str(s.trim())
        .map_err(|_| Error::config(format!("unknown log level {:?}", s.trim())))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug").unwrap(), Level::Debug);
        assert_eq!(parse_level(" WARN ").unwrap(), Level::Warn);
        assert!(parse_level("loud").is_err());
    }

    #[test]
    fn test_format_line() {
        let line = format_line(
            &Record::builder()
                .level(Level::Warn)
                .args(format_args!("No address on {}", "eth0"))
                .build(),
        );
        assert_eq!(line, "[WARN] No address on eth0");
    }

    #[test]
    fn test_store_level_round_trips_filter() {
        let logger = StderrLogger::new();
        assert_eq!(logger.current_level(), LevelFilter::Info);
        for filter in [
            LevelFilter::Off,
            LevelFilter::Error,
            LevelFilter::Warn,
            LevelFilter::Debug,
            LevelFilter::Trace,
        ] {
            logger.store_level(filter);
            assert_eq!(logger.current_level(), filter);
        }
    }
}
