//! Background filename search (spec §4.4, §9): a producer/consumer task
//! that walks a subtree on a worker thread and appends matches to a
//! shared vector the search dialog renders from directly.
//!
//! Unlike copy/move/delete, search never shows a confirm or conflict
//! dialog — it still goes through [`crate::core::task::TaskManager`] so
//! the single-active-task invariant holds, but its `poll` only ever
//! reports `None` until the walk finishes.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::core::entry::Entry;
use crate::core::progress::TaskKind;
use crate::core::task::{ManagedTask, TaskContext, TaskEnv, TaskPoll, TaskState};
use crate::storage::{Location, Router};

/// Shared, thread-safe result sink the dialog polls from the render loop
/// (spec §9's "thread-safe appendable vector plus a content-changed flag").
pub struct SearchResults {
    matches: Mutex<Vec<Entry>>,
    changed: std::sync::atomic::AtomicBool,
}

impl SearchResults {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            matches: Mutex::new(Vec::new()),
            changed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    fn push(&self, entry: Entry) {
        self.matches.lock().unwrap().push(entry);
        self.changed.store(true, Ordering::Relaxed);
    }

    /// Returns a snapshot and clears the changed flag, so a render loop can
    /// skip redrawing when nothing new arrived since the last poll.
    pub fn take_if_changed(&self) -> Option<Vec<Entry>> {
        if self.changed.swap(false, Ordering::Relaxed) {
            Some(self.matches.lock().unwrap().clone())
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> Vec<Entry> {
        self.matches.lock().unwrap().clone()
    }
}

pub struct SearchTask {
    ctx: TaskContext,
    state: TaskState,
    root: Location,
    pattern: String,
    pub results: Arc<SearchResults>,
    worker: Option<JoinHandle<()>>,
}

impl SearchTask {
    pub fn new(root: Location, pattern: String) -> Self {
        Self {
            ctx: TaskContext::new(TaskKind::Search, Vec::new(), None),
            state: TaskState::Idle,
            root,
            pattern,
            results: SearchResults::new(),
            worker: None,
        }
    }
}

fn matches_pattern(name: &str, pattern: &str) -> bool {
    name.to_lowercase().contains(&pattern.to_lowercase())
}

fn walk(router: &Router, dir: &Location, pattern: &str, results: &SearchResults, cancelled: &std::sync::atomic::AtomicBool) {
    if cancelled.load(Ordering::Relaxed) {
        return;
    }
    let Ok(entries) = router.list(dir) else {
        return;
    };
    for entry in entries {
        if cancelled.load(Ordering::Relaxed) {
            return;
        }
        if matches_pattern(&entry.display_name, pattern) {
            results.push(entry.clone());
        }
        if entry.is_dir() {
            walk(router, &entry.location, pattern, results, cancelled);
        }
    }
}

impl ManagedTask for SearchTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Search
    }

    fn state(&self) -> TaskState {
        self.state
    }

    fn start(&mut self, env: &TaskEnv) {
        self.state = TaskState::Executing;
        env.progress.start(TaskKind::Search, 0);

        let router = env.router.clone();
        let progress = env.progress.clone();
        let root = self.root.clone();
        let pattern = self.pattern.clone();
        let results = self.results.clone();
        let cancelled = self.ctx.cancelled.clone();

        self.worker = Some(std::thread::spawn(move || {
            walk(&router, &root, &pattern, &results, &cancelled);
            progress.clear();
        }));
    }

    fn cancel(&mut self) {
        self.ctx.request_cancel();
    }

    fn poll(&mut self, _env: &TaskEnv) -> TaskPoll {
        if self.state != TaskState::Executing {
            return TaskPoll::None;
        }
        let finished = self.worker.as_ref().map(|h| h.is_finished()).unwrap_or(true);
        if finished {
            if let Some(handle) = self.worker.take() {
                let _ = handle.join();
            }
            self.state = TaskState::Completed;
            return TaskPoll::Done {
                summary: self.ctx.results.clone(),
                touched: Vec::new(),
            };
        }
        TaskPoll::None
    }

    fn resolve_choice(&mut self, _value: &str, _apply_to_all: bool, _env: &TaskEnv) {}
    fn resolve_input(&mut self, _text: String, _env: &TaskEnv) {}
    fn resolve_dialog_cancel(&mut self, env: &TaskEnv) {
        self.cancel();
        // Allow poll() to observe completion and clear the slot next tick
        // instead of finishing synchronously here (spec §9's callback
        // recursion rule applies to cancellation too).
        let _ = env;
    }
}
