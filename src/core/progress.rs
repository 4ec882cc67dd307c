//! The progress manager — a process-wide, single-writer (the task worker),
//! multi-reader (render) structure holding the progress record (spec §3,
//! §4.9).
//!
//! Updates from the worker are throttled internally to at most one visible
//! update every 50 ms (spec §8 invariant 7); the spinner frame advances on
//! its own 100 ms cadence so the animation stays smooth even while a single
//! large item is in flight.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Copy,
    Move,
    Delete,
    ArchiveCreate,
    ArchiveExtract,
    Search,
    Diff,
}

impl TaskKind {
    pub fn label(self) -> &'static str {
        match self {
            TaskKind::Copy => "Copying",
            TaskKind::Move => "Moving",
            TaskKind::Delete => "Deleting",
            TaskKind::ArchiveCreate => "Archiving",
            TaskKind::ArchiveExtract => "Extracting",
            TaskKind::Search => "Searching",
            TaskKind::Diff => "Comparing",
        }
    }
}

/// A snapshot of a task's progress (spec §3's progress record).
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub kind: TaskKind,
    pub total_items: usize,
    pub processed_items: usize,
    pub current_item_label: String,
    pub per_item_bytes_done: Option<u64>,
    pub per_item_bytes_total: Option<u64>,
    pub error_count: usize,
    pub spinner_frame: u32,
    pub start_time: Instant,
}

impl ProgressRecord {
    pub fn new(kind: TaskKind, total_items: usize) -> Self {
        Self {
            kind,
            total_items,
            processed_items: 0,
            current_item_label: String::new(),
            per_item_bytes_done: None,
            per_item_bytes_total: None,
            error_count: 0,
            spinner_frame: 0,
            start_time: Instant::now(),
        }
    }

    pub fn fraction(&self) -> f64 {
        if self.total_items == 0 {
            0.0
        } else {
            (self.processed_items as f64 / self.total_items as f64).clamp(0.0, 1.0)
        }
    }
}

const UPDATE_THROTTLE: Duration = Duration::from_millis(50);
const SPINNER_TICK: Duration = Duration::from_millis(100);

struct Inner {
    record: Option<ProgressRecord>,
    last_visible_update: Instant,
    last_spinner_tick: Instant,
}

/// Shared across the main thread (reader) and at most one worker thread
/// (writer) per spec §5's ordering guarantees.
pub struct ProgressManager {
    inner: Mutex<Inner>,
}

impl ProgressManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                record: None,
                last_visible_update: Instant::now(),
                last_spinner_tick: Instant::now(),
            }),
        }
    }

    pub fn start(&self, kind: TaskKind, total_items: usize) {
        let mut inner = self.inner.lock();
        inner.record = Some(ProgressRecord::new(kind, total_items));
        inner.last_visible_update = Instant::now();
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.record = None;
    }

    /// Worker call: report progress on the current item. Collapses to at
    /// most one visible update every 50 ms, except the caller can force a
    /// flush (used at COMPLETED so the final tally is never dropped).
    pub fn update(
        &self,
        processed_items: usize,
        current_item_label: impl Into<String>,
        per_item_bytes: Option<(u64, u64)>,
        error_count: usize,
        force: bool,
    ) {
        let mut inner = self.inner.lock();
        let due = force || inner.last_visible_update.elapsed() >= UPDATE_THROTTLE;
        if !due {
            return;
        }
        inner.last_visible_update = Instant::now();
        if let Some(record) = inner.record.as_mut() {
            record.processed_items = processed_items;
            record.current_item_label = current_item_label.into();
            record.per_item_bytes_done = per_item_bytes.map(|(d, _)| d);
            record.per_item_bytes_total = per_item_bytes.map(|(_, t)| t);
            record.error_count = error_count;
        }
    }

    /// Advance the spinner if at least 100 ms elapsed since the last tick.
    /// Called from the main thread's render loop, independent of `update`.
    pub fn tick_spinner(&self) {
        let mut inner = self.inner.lock();
        if inner.last_spinner_tick.elapsed() >= SPINNER_TICK {
            inner.last_spinner_tick = Instant::now();
            if let Some(record) = inner.record.as_mut() {
                record.spinner_frame = record.spinner_frame.wrapping_add(1);
            }
        }
    }

    pub fn snapshot(&self) -> Option<ProgressRecord> {
        self.inner.lock().record.clone()
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttled_updates_are_dropped_until_interval_elapses() {
        let mgr = ProgressManager::new();
        mgr.start(TaskKind::Copy, 10);
        mgr.update(1, "a", None, 0, false);
        // Immediately after start, the previous update's timestamp is "now",
        // so a non-forced update arriving within the window is dropped.
        mgr.update(2, "b", None, 0, false);
        let snap = mgr.snapshot().unwrap();
        assert_eq!(snap.processed_items, 1);
    }

    #[test]
    fn forced_update_always_applies() {
        let mgr = ProgressManager::new();
        mgr.start(TaskKind::Copy, 10);
        mgr.update(1, "a", None, 0, false);
        mgr.update(10, "done", None, 0, true);
        assert_eq!(mgr.snapshot().unwrap().processed_items, 10);
    }
}
