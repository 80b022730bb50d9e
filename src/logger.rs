//! Minimal `log` backend: styled level tags on stderr, or a plain append-only
//! file when the daemon has detached from the terminal.

use crate::env;
use log::{Level, LevelFilter, Metadata, Record};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

enum Target {
    Stderr,
    File(Mutex<std::fs::File>),
}

struct Logger {
    level: LevelFilter,
    target: Target,
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let ts = chrono::Local::now().format("%d/%m/%Y %H:%M:%S");
        match &self.target {
            Target::Stderr => {
                let tag = style_level(record.level());
                eprintln!("{tag} {ts} {}", record.args());
            }
            Target::File(file) => {
                let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
                let _ = writeln!(file, "{}:{ts} {}", record.level(), record.args());
            }
        }
    }

    fn flush(&self) {
        if let Target::File(file) = &self.target {
            let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
            let _ = file.flush();
        }
    }
}

fn style_level(level: Level) -> String {
    let s = level.to_string();
    match level {
        Level::Error => console::style(s).red().to_string(),
        Level::Warn => console::style(s).yellow().to_string(),
        Level::Info => console::style(s).green().to_string(),
        Level::Debug | Level::Trace => console::style(s).dim().to_string(),
    }
}

/// Install the stderr logger. Level comes from `OVERSEER_LOG` unless a
/// higher verbosity is forced (e.g. `overseerctl --debug`).
pub fn init(force_level: Option<LevelFilter>) {
    let level = force_level.unwrap_or(*env::OVERSEER_LOG);
    install(Logger {
        level,
        target: Target::Stderr,
    });
}

/// Install a file logger for daemonized runs, where stderr points at
/// /dev/null. Falls back to stderr if the log file cannot be opened.
pub fn init_file(path: &PathBuf) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let target = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Target::File(Mutex::new(file)),
        Err(_) => Target::Stderr,
    };
    install(Logger {
        level: *env::OVERSEER_LOG,
        target,
    });
}

fn install(logger: Logger) {
    let level = logger.level;
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(level);
    }
}
