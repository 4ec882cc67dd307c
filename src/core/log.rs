//! The log buffer — a bounded, multi-writer, multi-reader ring of log
//! records (spec §3, §4.9, §8 invariant 8).
//!
//! Every thread appends through [`LogBuffer::push`], which takes the mutex
//! only for the critical section (spec §5). The main thread is the only
//! reader, via [`LogBuffer::snapshot`], which the log pane renders.
//!
//! [`TracingBridge`] is a `tracing_subscriber::Layer` that mirrors every
//! `tracing` event into the same ring the log pane reads, so the log pane,
//! stderr and (if enabled) the network broadcaster all see the same
//! records (spec §4.9's three handlers).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use tracing::field::{Field, Visit};
use tracing::Level;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRIT",
        }
    }

    fn from_tracing(level: &Level) -> Self {
        match *level {
            Level::TRACE | Level::DEBUG => LogLevel::Debug,
            Level::INFO => LogLevel::Info,
            Level::WARN => LogLevel::Warning,
            Level::ERROR => LogLevel::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    Main,
    FileOp,
    Diff,
    Archive,
    Search,
    Sftp,
    S3,
}

impl LogSource {
    pub fn label(self) -> &'static str {
        match self {
            LogSource::Main => "MAIN",
            LogSource::FileOp => "FILE",
            LogSource::Diff => "DIFF",
            LogSource::Archive => "ARCHIVE",
            LogSource::Search => "SEARCH",
            LogSource::Sftp => "SFTP",
            LogSource::S3 => "S3",
        }
    }

    /// Heuristic mapping from a `tracing` target (module path) to a source
    /// tag, so ordinary `tracing::info!` calls in each module land in the
    /// right bucket without every call site tagging itself explicitly.
    fn from_target(target: &str) -> Self {
        if target.contains("sftp") {
            LogSource::Sftp
        } else if target.contains("s3") {
            LogSource::S3
        } else if target.contains("archive") {
            LogSource::Archive
        } else if target.contains("diff") {
            LogSource::Diff
        } else if target.contains("search") {
            LogSource::Search
        } else if target.contains("task") || target.contains("storage") {
            LogSource::FileOp
        } else {
            LogSource::Main
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: SystemTime,
    pub source: LogSource,
    pub level: LogLevel,
    pub message: String,
}

/// A bounded ring of log records, shared across every thread in the
/// process (spec §3).
pub struct LogBuffer {
    capacity: usize,
    records: Mutex<VecDeque<LogRecord>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        })
    }

    pub fn push(&self, source: LogSource, level: LogLevel, message: impl Into<String>) {
        let mut guard = self.records.lock();
        if guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(LogRecord {
            timestamp: SystemTime::now(),
            source,
            level,
            message: message.into(),
        });
    }

    /// A read-only copy of everything currently retained, oldest first —
    /// the only way the main thread reads the buffer (spec §5).
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Extracts the `message` field from a tracing event; every other field is
/// ignored, matching the log pane's plain "one line per record" rendering.
#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

/// A `tracing_subscriber::Layer` that mirrors every event into a
/// [`LogBuffer`], in addition to whatever stderr formatter is installed
/// alongside it.
pub struct TracingBridge {
    buffer: Arc<LogBuffer>,
}

impl TracingBridge {
    pub fn new(buffer: Arc<LogBuffer>) -> Self {
        Self { buffer }
    }
}

impl<S: tracing::Subscriber> Layer<S> for TracingBridge {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let level = LogLevel::from_tracing(event.metadata().level());
        let source = LogSource::from_target(event.metadata().target());
        self.buffer.push(source, level, visitor.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_retains_min_of_len_and_capacity() {
        let buf = LogBuffer::new(3);
        for i in 0..5 {
            buf.push(LogSource::Main, LogLevel::Info, format!("msg {i}"));
        }
        let snap = buf.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].message, "msg 2");
        assert_eq!(snap[2].message, "msg 4");
    }

    #[test]
    fn target_heuristic_buckets_known_modules() {
        assert_eq!(LogSource::from_target("tfm::storage::sftp"), LogSource::Sftp);
        assert_eq!(LogSource::from_target("tfm::core::diff"), LogSource::Diff);
        assert_eq!(LogSource::from_target("tfm::app::main_screen"), LogSource::Main);
    }
}
