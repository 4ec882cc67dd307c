//! The task framework's base contract (spec §4.4): a state machine
//! abstraction for long-running user-initiated operations, with a single
//! active task, a dedicated worker thread, cancellation, progress
//! reporting and input blocking.
//!
//! Concrete tasks (`core::tasks::*`) implement [`ManagedTask`]; the main
//! screen owns a single [`TaskManager`] slot and polls the active task
//! once per event-loop tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::error::CoreError;
use crate::core::log::LogBuffer;
use crate::core::progress::{ProgressManager, TaskKind};
use crate::storage::{Location, Router};

/// The copy/move/delete/archive state machine's states (spec §4.4):
/// `IDLE → CONFIRMING → CHECKING_CONFLICTS → RESOLVING_CONFLICT* →
/// EXECUTING → COMPLETED → IDLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Confirming,
    CheckingConflicts,
    ResolvingConflict,
    Executing,
    Completed,
}

impl TaskState {
    pub fn label(self) -> &'static str {
        match self {
            TaskState::Idle => "Idle",
            TaskState::Confirming => "Confirming",
            TaskState::CheckingConflicts => "Checking conflicts",
            TaskState::ResolvingConflict => "Resolving conflict",
            TaskState::Executing => "Executing",
            TaskState::Completed => "Completed",
        }
    }
}

/// Final per-file tallies (spec §3, §8 invariant 5:
/// `success + skip + error == total_planned`).
#[derive(Debug, Clone, Default)]
pub struct TaskResults {
    pub success: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total_planned: usize,
}

/// User choices that apply across remaining conflicts once selected
/// (spec §4.4's "applied to all remaining").
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub overwrite_all: bool,
    pub skip_all: bool,
    pub rename_all_pattern: Option<String>,
}

/// The per-operation context owned by the active task (spec §3).
pub struct TaskContext {
    pub kind: TaskKind,
    pub files: Vec<Location>,
    pub destination: Option<Location>,
    pub conflicts: Vec<(Location, Location)>,
    pub current_conflict_index: usize,
    pub results: TaskResults,
    pub options: TaskOptions,
    pub cancelled: Arc<AtomicBool>,
}

impl TaskContext {
    pub fn new(kind: TaskKind, files: Vec<Location>, destination: Option<Location>) -> Self {
        Self {
            kind,
            files,
            destination,
            conflicts: Vec::new(),
            current_conflict_index: 0,
            results: TaskResults::default(),
            options: TaskOptions::default(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn request_cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Shared dependencies every task needs: the storage router, the process-
/// wide progress manager and log buffer (spec §4.9, §9: "pass them
/// explicitly through the main-screen context; do not access via
/// free-standing globals").
#[derive(Clone)]
pub struct TaskEnv {
    pub router: Arc<Router>,
    pub progress: Arc<ProgressManager>,
    pub log: Arc<LogBuffer>,
}

/// What the active task wants the main screen to show next. Implements
/// spec §9's "callback-based recursion" for the rename-into-conflict case:
/// the main screen pushes a fresh dialog layer on the *next* iteration
/// rather than the task recursing on the call stack.
#[derive(Debug, Clone)]
pub enum TaskPoll {
    /// Nothing to show; the task is progressing or idle.
    None,
    ShowConfirm {
        message: String,
    },
    ShowConflict {
        source: Location,
        destination: Location,
    },
    ShowRenameInput {
        default_name: String,
    },
    /// The task reached COMPLETED and has cleared itself; the main screen
    /// should refresh affected panes and show the summary in the status
    /// bar / log.
    Done {
        summary: TaskResults,
        touched: Vec<Location>,
    },
}

/// The base task contract (spec §4.4). All long-running user operations
/// implement this; `TaskManager` holds at most one at a time.
pub trait ManagedTask: Send {
    fn kind(&self) -> TaskKind;
    fn state(&self) -> TaskState;
    fn start(&mut self, env: &TaskEnv);
    fn cancel(&mut self);
    fn is_active(&self) -> bool {
        self.state() != TaskState::Idle
    }

    /// Called once per event-loop tick; drains the worker channel and
    /// advances the state machine. Returns the UI action (if any) the
    /// main screen should perform as a result.
    fn poll(&mut self, env: &TaskEnv) -> TaskPoll;

    /// Feed a choice-dialog result (by value, e.g. "overwrite"/"skip"/
    /// "rename"/"cancel") into the state machine.
    fn resolve_choice(&mut self, value: &str, apply_to_all: bool, env: &TaskEnv);

    /// Feed an input-dialog result (the rename text) into the state machine.
    fn resolve_input(&mut self, text: String, env: &TaskEnv);

    /// The user dismissed a dialog the task is waiting on (Cancel/Escape).
    fn resolve_dialog_cancel(&mut self, env: &TaskEnv);
}

/// The single slot a main screen holds for the currently active task
/// (spec §3's task manager, §8 invariant 3: at most one task active).
#[derive(Default)]
pub struct TaskManager {
    active: Option<Box<dyn ManagedTask>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self { active: None }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Register a new task and start it. Fails with `AlreadyActive`
    /// (spec §4.4) if one is already running.
    pub fn start_task(
        &mut self,
        mut task: Box<dyn ManagedTask>,
        env: &TaskEnv,
    ) -> Result<(), CoreError> {
        if self.active.is_some() {
            return Err(CoreError::PreconditionFailed("a task is already active".into()));
        }
        task.start(env);
        self.active = Some(task);
        Ok(())
    }

    pub fn cancel_current(&mut self) {
        if let Some(task) = self.active.as_mut() {
            task.cancel();
        }
    }

    pub fn poll(&mut self, env: &TaskEnv) -> TaskPoll {
        let Some(task) = self.active.as_mut() else {
            return TaskPoll::None;
        };
        let result = task.poll(env);
        if let TaskPoll::Done { .. } = &result {
            self.active = None;
        }
        result
    }

    pub fn resolve_choice(&mut self, value: &str, apply_to_all: bool, env: &TaskEnv) {
        if let Some(task) = self.active.as_mut() {
            task.resolve_choice(value, apply_to_all, env);
        }
    }

    pub fn resolve_input(&mut self, text: String, env: &TaskEnv) {
        if let Some(task) = self.active.as_mut() {
            task.resolve_input(text, env);
        }
    }

    pub fn resolve_dialog_cancel(&mut self, env: &TaskEnv) {
        if let Some(task) = self.active.as_mut() {
            task.resolve_dialog_cancel(env);
        }
    }

    pub fn active_kind(&self) -> Option<TaskKind> {
        self.active.as_ref().map(|t| t.kind())
    }
}
