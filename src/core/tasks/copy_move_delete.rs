//! The canonical task state machine: copy, move and delete (spec §4.4).
//!
//! Conflict detection (stat'ing destination targets) runs inline on the
//! call that drives CHECKING_CONFLICTS — it only issues one `stat` per
//! planned item, which is cheap even over a network backend. The actual
//! file movement runs on a dedicated worker thread so large trees never
//! block the event loop.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::core::entry::Entry;
use crate::core::progress::TaskKind;
use crate::core::task::{ManagedTask, TaskContext, TaskEnv, TaskPoll, TaskResults, TaskState};
use crate::storage::{Location, Router};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    Copy,
    Move,
    Delete,
}

impl OpMode {
    fn task_kind(self) -> TaskKind {
        match self {
            OpMode::Copy => TaskKind::Copy,
            OpMode::Move => TaskKind::Move,
            OpMode::Delete => TaskKind::Delete,
        }
    }

    fn confirm_message(self, count: usize) -> String {
        match self {
            OpMode::Copy => format!("Copy {count} item(s)?"),
            OpMode::Move => format!("Move {count} item(s)?"),
            OpMode::Delete => format!("Delete {count} item(s)? This cannot be undone."),
        }
    }
}

#[derive(Debug, Clone)]
enum ConflictResolution {
    Overwrite,
    Skip,
    RenameTo(String),
}

/// What the state machine is waiting on the next dialog result for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AwaitKind {
    Confirm,
    ConflictChoice,
    ConflictRename,
}

enum WorkerMsg {
    Progress {
        processed: usize,
        label: String,
        bytes: Option<(u64, u64)>,
        errors: usize,
    },
    ItemError {
        label: String,
        message: String,
    },
    Finished {
        results: TaskResults,
        touched: Vec<Location>,
    },
}

pub struct CopyMoveDeleteTask {
    mode: OpMode,
    ctx: TaskContext,
    state: TaskState,
    awaiting: Option<AwaitKind>,
    resolutions: HashMap<Location, ConflictResolution>,
    rename_default: String,
    rx: Option<Receiver<WorkerMsg>>,
    worker: Option<JoinHandle<()>>,
}

impl CopyMoveDeleteTask {
    pub fn new(mode: OpMode, files: Vec<Entry>, destination: Option<Location>) -> Self {
        let locations = files.iter().map(|e| e.location.clone()).collect();
        Self {
            mode,
            ctx: TaskContext::new(mode.task_kind(), locations, destination),
            state: TaskState::Idle,
            awaiting: None,
            resolutions: HashMap::new(),
            rename_default: String::new(),
            rx: None,
            worker: None,
        }
    }

    /// Stat every planned destination target and record the ones that
    /// already exist as conflicts (spec §4.4's CHECKING_CONFLICTS state).
    /// Delete has no destination, so it never produces conflicts.
    fn check_conflicts(&mut self, router: &Router) {
        self.ctx.conflicts.clear();
        self.ctx.current_conflict_index = 0;
        let Some(destination) = self.ctx.destination.clone() else {
            return;
        };
        if self.mode == OpMode::Delete {
            return;
        }
        for source in self.ctx.files.clone() {
            let target = destination.join(&source.name());
            if router.exists(&target) {
                self.ctx.conflicts.push((source, target));
            }
        }
    }

    fn next_unresolved_conflict(&self) -> Option<(Location, Location)> {
        self.ctx
            .conflicts
            .get(self.ctx.current_conflict_index)
            .cloned()
    }

    fn spawn_worker(&mut self, env: &TaskEnv) {
        let (tx, rx): (Sender<WorkerMsg>, Receiver<WorkerMsg>) = std::sync::mpsc::channel();
        self.rx = Some(rx);

        let router = env.router.clone();
        let progress = env.progress.clone();
        let files = self.ctx.files.clone();
        let destination = self.ctx.destination.clone();
        let mode = self.mode;
        let resolutions = self.resolutions.clone();
        let cancelled = self.ctx.cancelled.clone();

        progress.start(mode.task_kind(), files.len());

        let handle = std::thread::spawn(move || {
            run_worker(&router, &progress, mode, &files, destination.as_ref(), &resolutions, &cancelled, &tx);
        });
        self.worker = Some(handle);
        self.state = TaskState::Executing;
    }
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    router: &Router,
    progress: &crate::core::progress::ProgressManager,
    mode: OpMode,
    files: &[Location],
    destination: Option<&Location>,
    resolutions: &HashMap<Location, ConflictResolution>,
    cancelled: &std::sync::atomic::AtomicBool,
    tx: &Sender<WorkerMsg>,
) {
    let mut results = TaskResults {
        total_planned: files.len(),
        ..Default::default()
    };
    let mut touched = Vec::new();

    for (i, source) in files.iter().enumerate() {
        if cancelled.load(Ordering::Relaxed) {
            break;
        }
        let label = source.display();

        if let Some(ConflictResolution::Skip) = resolutions.get(source) {
            results.skipped += 1;
            let _ = tx.send(WorkerMsg::Progress {
                processed: i + 1,
                label: label.clone(),
                bytes: None,
                errors: results.errors,
            });
            continue;
        }

        let outcome = match mode {
            OpMode::Delete => router.remove(source),
            OpMode::Copy | OpMode::Move => {
                let Some(destination) = destination else {
                    Err(crate::core::error::CoreError::Bug("missing destination".into()))
                } else {
                    let name = match resolutions.get(source) {
                        Some(ConflictResolution::RenameTo(new_name)) => new_name.clone(),
                        _ => source.name(),
                    };
                    let dest_loc = destination.join(&name);
                    let result = copy_tree(router, source, &dest_loc, cancelled, &mut |done, total| {
                        let _ = tx.send(WorkerMsg::Progress {
                            processed: i,
                            label: label.clone(),
                            bytes: Some((done, total)),
                            errors: results.errors,
                        });
                    });
                    if result.is_ok() && mode == OpMode::Move {
                        router.remove(source)
                    } else {
                        result
                    }
                }
            }
        };

        match outcome {
            Ok(()) => {
                results.success += 1;
                touched.push(source.clone());
                if let Some(destination) = destination {
                    touched.push(destination.clone());
                }
                info!(target: "tfm::core::tasks", "{} {}", mode_verb(mode), label);
            }
            Err(crate::core::error::CoreError::Cancelled) => break,
            Err(e) => {
                results.errors += 1;
                warn!(target: "tfm::core::tasks", "{} failed: {}: {}", mode_verb(mode), label, e);
                let _ = tx.send(WorkerMsg::ItemError {
                    label,
                    message: e.to_string(),
                });
            }
        }

        let _ = tx.send(WorkerMsg::Progress {
            processed: i + 1,
            label: source.display(),
            bytes: None,
            errors: results.errors,
        });
    }

    progress.update(results.success + results.skipped + results.errors, "", None, results.errors, true);
    let _ = tx.send(WorkerMsg::Finished { results, touched });
}

fn mode_verb(mode: OpMode) -> &'static str {
    match mode {
        OpMode::Copy => "copied",
        OpMode::Move => "moved",
        OpMode::Delete => "deleted",
    }
}

/// Recursively copy a file or directory tree from `source` to `dest`,
/// creating destination directories as needed (spec §4.8: the router's
/// `copy` only moves a single file; directory trees are walked here).
fn copy_tree(
    router: &Router,
    source: &Location,
    dest: &Location,
    cancel: &std::sync::atomic::AtomicBool,
    on_bytes: &mut dyn FnMut(u64, u64),
) -> crate::core::error::CoreResult<()> {
    let stat = router.stat(source)?;
    if !stat.is_dir() {
        let total = stat.size;
        let mut done = 0u64;
        return router.copy(source, dest, cancel, |n| {
            done += n;
            on_bytes(done, total);
        });
    }

    router.make_dir(dest)?;
    for child in router.list(source)? {
        if cancel.load(Ordering::Relaxed) {
            return Err(crate::core::error::CoreError::Cancelled);
        }
        let child_dest = dest.join(&child.display_name);
        copy_tree(router, &child.location, &child_dest, cancel, on_bytes)?;
    }
    Ok(())
}

impl ManagedTask for CopyMoveDeleteTask {
    fn kind(&self) -> TaskKind {
        self.mode.task_kind()
    }

    fn state(&self) -> TaskState {
        self.state
    }

    fn start(&mut self, _env: &TaskEnv) {
        self.state = TaskState::Confirming;
        self.awaiting = Some(AwaitKind::Confirm);
    }

    fn cancel(&mut self) {
        self.ctx.request_cancel();
        if self.state != TaskState::Executing {
            self.state = TaskState::Completed;
        }
    }

    fn poll(&mut self, env: &TaskEnv) -> TaskPoll {
        match self.state {
            TaskState::Confirming => {
                if self.awaiting == Some(AwaitKind::Confirm) {
                    TaskPoll::ShowConfirm {
                        message: self.mode.confirm_message(self.ctx.files.len()),
                    }
                } else {
                    TaskPoll::None
                }
            }
            TaskState::CheckingConflicts => {
                self.check_conflicts(&env.router);
                if let Some((source, destination)) = self.next_unresolved_conflict() {
                    self.state = TaskState::ResolvingConflict;
                    self.awaiting = Some(AwaitKind::ConflictChoice);
                    TaskPoll::ShowConflict { source, destination }
                } else {
                    self.spawn_worker(env);
                    TaskPoll::None
                }
            }
            TaskState::ResolvingConflict => match self.awaiting {
                Some(AwaitKind::ConflictChoice) => {
                    if let Some((source, destination)) = self.next_unresolved_conflict() {
                        TaskPoll::ShowConflict { source, destination }
                    } else {
                        self.spawn_worker(env);
                        TaskPoll::None
                    }
                }
                Some(AwaitKind::ConflictRename) => TaskPoll::ShowRenameInput {
                    default_name: self.rename_default.clone(),
                },
                _ => TaskPoll::None,
            },
            TaskState::Executing => {
                let Some(rx) = self.rx.as_ref() else {
                    return TaskPoll::None;
                };
                let mut last = TaskPoll::None;
                while let Ok(msg) = rx.try_recv() {
                    match msg {
                        WorkerMsg::Progress {
                            processed,
                            label,
                            bytes,
                            errors,
                        } => {
                            env.progress.update(processed, label, bytes, errors, false);
                        }
                        WorkerMsg::ItemError { label, message } => {
                            env.log.push(
                                crate::core::log::LogSource::FileOp,
                                crate::core::log::LogLevel::Error,
                                format!("{label}: {message}"),
                            );
                        }
                        WorkerMsg::Finished { results, touched } => {
                            if let Some(handle) = self.worker.take() {
                                let _ = handle.join();
                            }
                            env.progress.clear();
                            self.ctx.results = results.clone();
                            self.state = TaskState::Completed;
                            last = TaskPoll::Done {
                                summary: results,
                                touched,
                            };
                        }
                    }
                }
                last
            }
            TaskState::Completed | TaskState::Idle => TaskPoll::Done {
                summary: self.ctx.results.clone(),
                touched: Vec::new(),
            },
        }
    }

    fn resolve_choice(&mut self, value: &str, apply_to_all: bool, _env: &TaskEnv) {
        match self.state {
            TaskState::Confirming => {
                self.awaiting = None;
                if value == "yes" {
                    self.state = TaskState::CheckingConflicts;
                } else {
                    self.state = TaskState::Completed;
                }
            }
            TaskState::ResolvingConflict => {
                let Some((source, _)) = self.next_unresolved_conflict() else {
                    return;
                };
                match value {
                    "rename" => {
                        self.rename_default = source.name();
                        self.awaiting = Some(AwaitKind::ConflictRename);
                        return;
                    }
                    "overwrite" => {
                        if apply_to_all {
                            self.ctx.options.overwrite_all = true;
                            for (s, _) in self.ctx.conflicts[self.ctx.current_conflict_index..].to_vec() {
                                self.resolutions.insert(s, ConflictResolution::Overwrite);
                            }
                            self.ctx.current_conflict_index = self.ctx.conflicts.len();
                        } else {
                            self.resolutions.insert(source, ConflictResolution::Overwrite);
                            self.ctx.current_conflict_index += 1;
                        }
                    }
                    "skip" => {
                        if apply_to_all {
                            self.ctx.options.skip_all = true;
                            for (s, _) in self.ctx.conflicts[self.ctx.current_conflict_index..].to_vec() {
                                self.resolutions.insert(s, ConflictResolution::Skip);
                            }
                            self.ctx.current_conflict_index = self.ctx.conflicts.len();
                        } else {
                            self.resolutions.insert(source, ConflictResolution::Skip);
                            self.ctx.current_conflict_index += 1;
                        }
                    }
                    _ => {
                        // "cancel" or anything unrecognized aborts the whole task.
                        self.ctx.request_cancel();
                        self.state = TaskState::Completed;
                    }
                }
                self.awaiting = Some(AwaitKind::ConflictChoice);
            }
            _ => {}
        }
    }

    fn resolve_input(&mut self, text: String, _env: &TaskEnv) {
        if self.state == TaskState::ResolvingConflict && self.awaiting == Some(AwaitKind::ConflictRename) {
            if let Some((source, _)) = self.next_unresolved_conflict() {
                self.resolutions.insert(source, ConflictResolution::RenameTo(text));
                self.ctx.current_conflict_index += 1;
            }
            self.awaiting = Some(AwaitKind::ConflictChoice);
        }
    }

    fn resolve_dialog_cancel(&mut self, _env: &TaskEnv) {
        self.ctx.request_cancel();
        self.state = TaskState::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entry::EntryKind;
    use crate::core::log::LogBuffer;
    use crate::core::progress::ProgressManager;
    use std::path::PathBuf;

    fn env() -> TaskEnv {
        TaskEnv {
            router: Arc::new(Router::new()),
            progress: Arc::new(ProgressManager::new()),
            log: LogBuffer::new(16),
        }
    }

    fn local_entry(path: &str) -> Entry {
        Entry {
            location: Location::Local(PathBuf::from(path)),
            display_name: PathBuf::from(path).file_name().unwrap().to_string_lossy().into_owned(),
            size: 5,
            mtime: None,
            kind: EntryKind::File,
            symlink_target: None,
            is_hidden: false,
        }
    }

    #[test]
    fn confirm_declined_completes_without_touching_anything() {
        let mut task = CopyMoveDeleteTask::new(
            OpMode::Delete,
            vec![local_entry("/tmp/a.txt")],
            None,
        );
        let env = env();
        task.start(&env);
        assert!(matches!(task.poll(&env), TaskPoll::ShowConfirm { .. }));
        task.resolve_choice("no", false, &env);
        assert!(matches!(task.poll(&env), TaskPoll::Done { .. }));
        assert_eq!(task.ctx.results.success, 0);
    }

    #[test]
    fn copy_with_no_conflicts_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"hello").unwrap();
        let dest_dir = dir.path().join("dest");
        std::fs::create_dir(&dest_dir).unwrap();

        let mut task = CopyMoveDeleteTask::new(
            OpMode::Copy,
            vec![local_entry(src.to_str().unwrap())],
            Some(Location::Local(dest_dir.clone())),
        );
        let env = env();
        task.start(&env);
        task.poll(&env);
        task.resolve_choice("yes", false, &env);
        task.poll(&env); // CheckingConflicts -> spawn worker

        let mut done = None;
        for _ in 0..200 {
            let poll = task.poll(&env);
            if let TaskPoll::Done { summary, .. } = poll {
                done = Some(summary);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let summary = done.expect("task did not complete");
        assert_eq!(summary.success, 1);
        assert!(dest_dir.join("a.txt").exists());
    }
}
