//! Where user-facing messages go. The controller never prints directly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

pub trait Notifier {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

/// Silent. The default when embedding without a log pane.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpNotifier;

impl Notifier for NoOpNotifier {
    fn info(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn info(&self, message: &str) {
        log::info!("{}", message);
    }

    fn warning(&self, message: &str) {
        log::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        log::error!("{}", message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub at: DateTime<Local>,
    pub severity: Severity,
    pub message: String,
}

/// Keeps the most recent messages for the log pane. Clones share the buffer.
#[derive(Debug, Clone)]
pub struct BufferNotifier {
    entries: Arc<Mutex<VecDeque<Notice>>>,
    limit: usize,
}

impl BufferNotifier {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(limit))),
            limit,
        }
    }

    fn push(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => log::info!("{}", message),
            Severity::Warning => log::warn!("{}", message),
            Severity::Error => log::error!("{}", message),
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.push_back(Notice {
                at: Local::now(),
                severity,
                message: message.to_string(),
            });
            while entries.len() > self.limit {
                entries.pop_front();
            }
        }
    }

    /// Newest last.
    pub fn snapshot(&self) -> Vec<Notice> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Notifier for BufferNotifier {
    fn info(&self, message: &str) {
        self.push(Severity::Info, message);
    }

    fn warning(&self, message: &str) {
        self.push(Severity::Warning, message);
    }

    fn error(&self, message: &str) {
        self.push(Severity::Error, message);
    }
}
