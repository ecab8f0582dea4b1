// Tue Jan 13 2026 - Alex

use colored::*;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::sync::Mutex;

pub struct LoggingUtils;

impl LoggingUtils {
    pub fn init_logger(level: LevelFilter) {
        let logger = Box::new(ColoredLogger::new(level));
        log::set_boxed_logger(logger).ok();
        log::set_max_level(level);
    }

    pub fn init_env_logger(level: LevelFilter) {
        env_logger::Builder::new()
            .filter_level(level)
            .format_timestamp(None)
            .try_init()
            .ok();
    }

    pub fn level_from_str(s: &str) -> LevelFilter {
        match s.to_lowercase().as_str() {
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            "off" => LevelFilter::Off,
            _ => LevelFilter::Info,
        }
    }
}

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Stderr logger using the same `[*]` / `[!]` markers as the CLI output.
/// Records from other crates only get through at warning level.
struct ColoredLogger {
    level: LevelFilter,
}

impl ColoredLogger {
    fn new(level: LevelFilter) -> Self {
        Self { level }
    }

    fn marker(level: Level) -> ColoredString {
        match level {
            Level::Error => "[!]".red().bold(),
            Level::Warn => "[?]".yellow().bold(),
            Level::Info => "[*]".blue(),
            Level::Debug => "[.]".dimmed(),
            Level::Trace => "[ ]".dimmed(),
        }
    }
}

impl Log for ColoredLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
            && (metadata.target().starts_with(CRATE_TARGET) || metadata.level() <= Level::Warn)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let module = record
            .target()
            .strip_prefix(CRATE_TARGET)
            .map(|m| m.trim_start_matches("::"))
            .unwrap_or(record.target());

        if module.is_empty() || record.level() == Level::Info {
            eprintln!("{} {}", Self::marker(record.level()), record.args());
        } else {
            eprintln!("{} {} {}", Self::marker(record.level()), module.dimmed(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Line-oriented log kept alongside the `log` output, handed back to callers
/// as the human-readable result of a script run.
#[derive(Debug, Default)]
pub struct RunLog {
    lines: Mutex<Vec<String>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}", message);
        self.push(message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.push(message);
    }

    fn push(&self, message: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(message);
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}
