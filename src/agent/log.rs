//! Per-team diagnostic log
//!
//! Collects everything an agent prints plus every preparation and decision
//! failure. The log is kept for post-match inspection and is capped so a
//! chatty script cannot grow it without bound.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::types::Tick;

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Debug,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Error => "error",
        };
        f.write_str(label)
    }
}

/// Single log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Tick the line was written on; 0 during preparation
    pub tick: Tick,
    pub level: LogLevel,
    pub message: String,
}

/// Accumulated agent diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLog {
    entries: Vec<LogEntry>,
    max_chars: usize,
    used_chars: usize,
    /// Lines dropped after the cap was reached
    dropped: usize,
}

impl AgentLog {
    pub fn new(max_chars: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_chars,
            used_chars: 0,
            dropped: 0,
        }
    }

    /// Append a line. Once the cap is hit further lines are counted, not kept.
    pub fn push(&mut self, tick: Tick, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        let len = message.chars().count();
        if self.used_chars + len > self.max_chars {
            self.dropped += 1;
            return;
        }
        self.used_chars += len;
        self.entries.push(LogEntry {
            tick,
            level,
            message,
        });
    }

    pub fn info(&mut self, tick: Tick, message: impl Into<String>) {
        self.push(tick, LogLevel::Info, message);
    }

    pub fn error(&mut self, tick: Tick, message: impl Into<String>) {
        self.push(tick, LogLevel::Error, message);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of retained error lines
    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.level == LogLevel::Error)
            .count()
    }

    /// Render as plain text, one line per entry
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(self.used_chars + self.entries.len() * 16);
        for entry in &self.entries {
            out.push_str(&format!(
                "[{:>5}] {}: {}\n",
                entry.tick, entry.level, entry.message
            ));
        }
        if self.dropped > 0 {
            out.push_str(&format!("... {} lines dropped\n", self.dropped));
        }
        out
    }
}
