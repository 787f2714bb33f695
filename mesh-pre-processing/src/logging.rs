/// stderr logger for the command-line tool
use log::{LevelFilter, Log, Metadata, Record};
use std::io::Write;
use time::OffsetDateTime;
use time::macros::format_description;

static LOGGER: StderrLogger = StderrLogger;

/// `YYYY-MM-DD HH:MM:SS - LEVEL - message`, local time when known.
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(now(), record.level(), record.args());
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn format_line(at: OffsetDateTime, level: log::Level, message: &std::fmt::Arguments<'_>) -> String {
    let timestamp = at
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_default();
    format!("{timestamp} - {level} - {message}")
}

/// Install the logger. Fails if another logger is already set.
pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}
