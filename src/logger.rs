//! Terminal and file logger behind the `log` facade.
//!
//! Every record becomes one line, `HH:MM:SS.mmm [LEVEL] target: message`,
//! written to stderr and, when configured, appended to a log file.

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

pub struct BenchLogger {
    level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl BenchLogger {
    /// Logger at `level`, appending to `log_file` if given.
    pub fn new(level: LevelFilter, log_file: Option<&Path>) -> std::io::Result<Self> {
        let file = match log_file {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Some(Mutex::new(file))
            }
            None => None,
        };

        Ok(BenchLogger { level, file })
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    fn format_line(record: &Record) -> String {
        format!(
            "{} [{}] {}: {}",
            Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for BenchLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = Self::format_line(record);
        eprintln!("{}", line);

        if let Some(ref file) = self.file {
            let mut file = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = writeln!(file, "{}", line);
        }
    }

    fn flush(&self) {
        if let Some(ref file) = self.file {
            let mut file = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = file.flush();
        }
    }
}

/// Install a `BenchLogger` as the global logger.
///
/// Fails if the log file cannot be opened or a logger is already installed.
pub fn init_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<(), String> {
    let logger = BenchLogger::new(level, log_file)
        .map_err(|e| format!("Failed to open log file: {}", e))?;

    log::set_boxed_logger(Box::new(logger))
        .map(|()| log::set_max_level(level))
        .map_err(|e| format!("Failed to install logger: {}", e))
}
