use std::fmt::Arguments;
use std::io::{self, Write};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Stderr logger tagging every line with the sidecar component name. The
/// level can be changed after installation.
struct HookLogger {
    level: AtomicUsize,
    component: OnceLock<String>,
}

impl HookLogger {
    const fn new() -> Self {
        Self {
            level: AtomicUsize::new(LevelFilter::Info as usize),
            component: OnceLock::new(),
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

    fn component(&self) -> &str {
        self.component.get().map(String::as_str).unwrap_or_default()
    }
}

impl Log for HookLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.current_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let line = format_line(self.component(), record.level(), record.args());
            let _ = io::stderr().write_all(line.as_bytes());
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

fn format_line(component: &str, level: Level, args: &Arguments) -> String {
    if component.is_empty() {
        format!("[{}] {}\n", level, args)
    } else {
        format!("[{}] {}: {}\n", level, component, args)
    }
}

static LOGGER: HookLogger = HookLogger::new();

pub fn init_logger(component: &str, level: Level) -> Result<(), log::SetLoggerError> {
    let _ = LOGGER.component.set(component.to_string());
    log::set_logger(&LOGGER)?;
    log::set_max_level(LevelFilter::Trace);
    set_log_level(level);
    Ok(())
}

pub fn set_log_level(level: Level) {
    LOGGER
        .level
        .store(level.to_level_filter() as usize, Ordering::Relaxed);
}
