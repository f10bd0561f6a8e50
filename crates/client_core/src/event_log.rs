//! Append-only, timestamped record of notable actions shown to the user.
//! Only the most recent entries are kept.

use std::collections::VecDeque;

use chrono::{DateTime, Local, Utc};
use tokio::sync::Mutex;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    /// `[HH:MM:SS] message`, in local time.
    pub fn display_line(&self) -> String {
        let local: DateTime<Local> = self.at.into();
        format!("[{}] {}", local.format("%H:%M:%S"), self.message)
    }
}

pub const DEFAULT_CAPACITY: usize = 500;

pub struct EventLog {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `capacity` entries, evicting the oldest first.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn info(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Info, message.into()).await
    }

    pub async fn error(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Error, message.into()).await
    }

    async fn append(&self, level: LogLevel, message: String) -> LogEntry {
        match level {
            LogLevel::Info => info!(target: "event_log", "{message}"),
            LogLevel::Error => error!(target: "event_log", "{message}"),
        }
        let entry = LogEntry {
            at: Utc::now(),
            level,
            message,
        };
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        entry
    }

    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    pub async fn contains(&self, needle: &str) -> bool {
        self.entries
            .lock()
            .await
            .iter()
            .any(|entry| entry.message.contains(needle))
    }
}
