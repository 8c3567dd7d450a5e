use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Appends every record to a file. Warnings and errors are also echoed to
/// stderr until the TUI takes the screen.
pub struct FileLogger {
    file: Arc<Mutex<File>>,
    level: LevelFilter,
    echo: Arc<AtomicBool>,
}

/// Turns the stderr echo off once the terminal belongs to the TUI.
#[derive(Debug, Clone)]
pub struct StderrEcho(Arc<AtomicBool>);

impl StderrEcho {
    pub fn disable(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn enable(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl FileLogger {
    pub fn new(log_path: &Path, level: LevelFilter) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            level,
            echo: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn echo_switch(&self) -> StderrEcho {
        StderrEcho(Arc::clone(&self.echo))
    }

    pub fn init(
        log_path: &Path,
        level: LevelFilter,
    ) -> Result<StderrEcho, Box<dyn std::error::Error>> {
        let logger = Self::new(log_path, level)?;
        let echo = logger.echo_switch();
        log::set_boxed_logger(Box::new(logger))?;
        log::set_max_level(level.max(LevelFilter::Warn));
        Ok(echo)
    }

    fn format(record: &Record) -> String {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let level_str = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        format!(
            "[{}] {} [{}:{}] {}\n",
            timestamp,
            level_str,
            record.module_path().unwrap_or("<unknown>"),
            record.line().unwrap_or(0),
            record.args()
        )
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        // notify and friends are chatty at debug
        (metadata.level() <= self.level && metadata.target().starts_with("cmdorc_tui"))
            || metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::format(record);
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(line.as_bytes());
            let _ = file.flush();
        }
        if record.level() <= Level::Warn && self.echo.load(Ordering::Relaxed) {
            eprintln!("{}", record.args());
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}
