//! Archive create/extract tasks (spec §4.4, §4.8).
//!
//! The [`crate::storage::archive::ArchiveBackend`] is read-only, so
//! creation writes a zip directly with the `zip` crate here rather than
//! through the storage router; extraction reuses the router's generic
//! cross-storage streaming copy since reading from an archive location is
//! fully supported.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::core::entry::Entry;
use crate::core::error::CoreError;
use crate::core::log::{LogLevel, LogSource};
use crate::core::progress::TaskKind;
use crate::core::task::{ManagedTask, TaskContext, TaskEnv, TaskPoll, TaskResults, TaskState};
use crate::storage::{Location, Router};

enum WorkerMsg {
    Progress { processed: usize, label: String },
    ItemError { label: String, message: String },
    Finished { results: TaskResults, touched: Vec<Location> },
}

/// Packs the given source entries into a new zip archive at `archive_path`.
pub struct ArchiveCreateTask {
    ctx: TaskContext,
    state: TaskState,
    archive_path: PathBuf,
    overwrite_confirmed: bool,
    rx: Option<Receiver<WorkerMsg>>,
    worker: Option<JoinHandle<()>>,
}

impl ArchiveCreateTask {
    pub fn new(files: Vec<Entry>, archive_path: PathBuf) -> Self {
        let locations = files.iter().map(|e| e.location.clone()).collect();
        Self {
            ctx: TaskContext::new(TaskKind::ArchiveCreate, locations, None),
            state: TaskState::Idle,
            archive_path,
            overwrite_confirmed: false,
            rx: None,
            worker: None,
        }
    }

    fn spawn(&mut self, env: &TaskEnv) {
        let (tx, rx) = std::sync::mpsc::channel();
        self.rx = Some(rx);
        let router = env.router.clone();
        let progress = env.progress.clone();
        let files = self.ctx.files.clone();
        let archive_path = self.archive_path.clone();
        let cancelled = self.ctx.cancelled.clone();

        progress.start(TaskKind::ArchiveCreate, files.len());
        self.worker = Some(std::thread::spawn(move || {
            run_create(&router, &progress, &files, &archive_path, &cancelled, &tx);
        }));
        self.state = TaskState::Executing;
    }
}

fn run_create(
    router: &Router,
    progress: &crate::core::progress::ProgressManager,
    files: &[Location],
    archive_path: &PathBuf,
    cancelled: &std::sync::atomic::AtomicBool,
    tx: &Sender<WorkerMsg>,
) {
    let mut results = TaskResults {
        total_planned: files.len(),
        ..Default::default()
    };

    let outcome = (|| -> Result<(), CoreError> {
        let file = File::create(archive_path).map_err(CoreError::Io)?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (i, source) in files.iter().enumerate() {
            if cancelled.load(Ordering::Relaxed) {
                return Err(CoreError::Cancelled);
            }
            let label = source.display();
            match add_to_zip(router, source, "", &mut writer, options, cancelled) {
                Ok(()) => results.success += 1,
                Err(e) => {
                    results.errors += 1;
                    let _ = tx.send(WorkerMsg::ItemError {
                        label: label.clone(),
                        message: e.to_string(),
                    });
                }
            }
            let _ = tx.send(WorkerMsg::Progress {
                processed: i + 1,
                label,
            });
        }
        writer.finish().map_err(|e| CoreError::Io(e.into()))?;
        Ok(())
    })();

    if let Err(e) = outcome {
        warn!(target: "tfm::core::tasks::archive", "archive creation failed: {}", e);
        results.errors += 1;
    }

    progress.update(results.success + results.errors, "", None, results.errors, true);
    let _ = tx.send(WorkerMsg::Finished {
        results,
        touched: vec![Location::Local(archive_path.clone())],
    });
}

fn add_to_zip(
    router: &Router,
    source: &Location,
    prefix: &str,
    writer: &mut ZipWriter<File>,
    options: SimpleFileOptions,
    cancelled: &std::sync::atomic::AtomicBool,
) -> Result<(), CoreError> {
    let stat = router.stat(source)?;
    let name = if prefix.is_empty() {
        stat.display_name.clone()
    } else {
        format!("{prefix}/{}", stat.display_name)
    };

    if stat.is_dir() {
        writer
            .add_directory(format!("{name}/"), options)
            .map_err(|e| CoreError::Io(e.into()))?;
        for child in router.list(source)? {
            if cancelled.load(Ordering::Relaxed) {
                return Err(CoreError::Cancelled);
            }
            add_to_zip(router, &child.location, &name, writer, options, cancelled)?;
        }
    } else {
        writer.start_file(name, options).map_err(|e| CoreError::Io(e.into()))?;
        let mut reader = router.open_read(source)?;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf).map_err(CoreError::Io)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).map_err(CoreError::Io)?;
        }
    }
    Ok(())
}

impl ManagedTask for ArchiveCreateTask {
    fn kind(&self) -> TaskKind {
        TaskKind::ArchiveCreate
    }

    fn state(&self) -> TaskState {
        self.state
    }

    fn start(&mut self, env: &TaskEnv) {
        if self.archive_path.exists() {
            self.state = TaskState::Confirming;
        } else {
            self.spawn(env);
        }
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
                if !self.overwrite_confirmed {
                    return TaskPoll::ShowConfirm {
                        message: format!("{} already exists. Overwrite?", self.archive_path.display()),
                    };
                }
                self.spawn(env);
                TaskPoll::None
            }
            TaskState::Executing => {
                let Some(rx) = self.rx.as_ref() else {
                    return TaskPoll::None;
                };
                let mut last = TaskPoll::None;
                while let Ok(msg) = rx.try_recv() {
                    match msg {
                        WorkerMsg::Progress { processed, label } => {
                            env.progress.update(processed, label, None, self.ctx.results.errors, false);
                        }
                        WorkerMsg::ItemError { label, message } => {
                            env.log.push(LogSource::Archive, LogLevel::Error, format!("{label}: {message}"));
                        }
                        WorkerMsg::Finished { results, touched } => {
                            if let Some(handle) = self.worker.take() {
                                let _ = handle.join();
                            }
                            env.progress.clear();
                            self.ctx.results = results.clone();
                            self.state = TaskState::Completed;
                            last = TaskPoll::Done { summary: results, touched };
                        }
                    }
                }
                last
            }
            _ => TaskPoll::Done {
                summary: self.ctx.results.clone(),
                touched: Vec::new(),
            },
        }
    }

    fn resolve_choice(&mut self, value: &str, _apply_to_all: bool, env: &TaskEnv) {
        if self.state == TaskState::Confirming {
            if value == "yes" {
                self.overwrite_confirmed = true;
                self.spawn(env);
            } else {
                self.state = TaskState::Completed;
            }
        }
    }

    fn resolve_input(&mut self, _text: String, _env: &TaskEnv) {}

    fn resolve_dialog_cancel(&mut self, _env: &TaskEnv) {
        self.state = TaskState::Completed;
    }
}

/// What the state machine is waiting on the next dialog result for
/// (mirrors `copy_move_delete::AwaitKind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AwaitKind {
    Confirm,
    ConflictChoice,
    ConflictRename,
}

#[derive(Debug, Clone)]
enum ConflictResolution {
    Overwrite,
    Skip,
    RenameTo(String),
}

/// Extracts every entry of `archive_root` (a `Location::Archive` whose
/// `inner` names the extraction root within the zip, often `""`) into
/// `destination`, following the same `Confirming → CheckingConflicts →
/// ResolvingConflict* → Executing → Completed` state machine as
/// [`crate::core::tasks::copy_move_delete::CopyMoveDeleteTask`] (spec
/// §4.4: "identical state machine... individual file collisions inside
/// an extract are resolved with the same per-file dialog").
pub struct ArchiveExtractTask {
    ctx: TaskContext,
    state: TaskState,
    awaiting: Option<AwaitKind>,
    archive_root: Location,
    destination: Location,
    resolutions: HashMap<Location, ConflictResolution>,
    rename_default: String,
    rx: Option<Receiver<WorkerMsg>>,
    worker: Option<JoinHandle<()>>,
}

impl ArchiveExtractTask {
    pub fn new(archive_root: Location, destination: Location) -> Self {
        Self {
            ctx: TaskContext::new(TaskKind::ArchiveExtract, vec![archive_root.clone()], Some(destination.clone())),
            state: TaskState::Idle,
            awaiting: None,
            archive_root,
            destination,
            resolutions: HashMap::new(),
            rename_default: String::new(),
            rx: None,
            worker: None,
        }
    }

    /// Recursively walk the archive and record a conflict for every file
    /// (not directory — directories merge silently via `make_dir`'s
    /// `create_dir_all`) whose destination already exists (spec §4.4:
    /// "conflict checking applies only to the destination root" for the
    /// archive-as-a-whole is the create side; extraction's per-entry
    /// conflicts are these).
    fn check_conflicts(&mut self, router: &Router) {
        self.ctx.conflicts.clear();
        self.ctx.current_conflict_index = 0;
        collect_conflicts(router, &self.archive_root, &self.destination, &mut self.ctx.conflicts);
    }

    fn next_unresolved_conflict(&self) -> Option<(Location, Location)> {
        self.ctx.conflicts.get(self.ctx.current_conflict_index).cloned()
    }

    fn spawn(&mut self, env: &TaskEnv) {
        let (tx, rx) = std::sync::mpsc::channel();
        self.rx = Some(rx);
        let router = env.router.clone();
        let progress = env.progress.clone();
        let root = self.archive_root.clone();
        let destination = self.destination.clone();
        let resolutions = self.resolutions.clone();
        let cancelled = self.ctx.cancelled.clone();

        progress.start(TaskKind::ArchiveExtract, 0);
        self.worker = Some(std::thread::spawn(move || {
            run_extract(&router, &progress, &root, &destination, &resolutions, &cancelled, &tx);
        }));
        self.state = TaskState::Executing;
    }
}

/// Does the destination root itself already hold an entry with this name?
/// Used only to decide whether a file (never a directory) collides; the
/// directory case always merges via `make_dir`.
fn collect_conflicts(
    router: &Router,
    source_root: &Location,
    dest_root: &Location,
    out: &mut Vec<(Location, Location)>,
) {
    let Ok(entries) = router.list(source_root) else {
        return;
    };
    for entry in entries {
        let dest = dest_root.join(&entry.display_name);
        if entry.is_dir() {
            collect_conflicts(router, &entry.location, &dest, out);
        } else if router.exists(&dest) {
            out.push((entry.location.clone(), dest));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_extract(
    router: &Router,
    progress: &crate::core::progress::ProgressManager,
    root: &Location,
    destination: &Location,
    resolutions: &HashMap<Location, ConflictResolution>,
    cancelled: &std::sync::atomic::AtomicBool,
    tx: &Sender<WorkerMsg>,
) {
    let entries = router.list(root).unwrap_or_default();
    let mut results = TaskResults {
        total_planned: entries.len(),
        ..Default::default()
    };

    for (i, entry) in entries.iter().enumerate() {
        if cancelled.load(Ordering::Relaxed) {
            break;
        }
        let dest = destination.join(&entry.display_name);
        let label = entry.display();
        let outcome = extract_one(router, &entry.location, &dest, resolutions, &mut results, cancelled);
        match outcome {
            Ok(()) => results.success += 1,
            Err(CoreError::Cancelled) => break,
            Err(e) => {
                results.errors += 1;
                let _ = tx.send(WorkerMsg::ItemError { label: label.clone(), message: e.to_string() });
            }
        }
        let _ = tx.send(WorkerMsg::Progress { processed: i + 1, label });
    }

    progress.update(results.success + results.skipped + results.errors, "", None, results.errors, true);
    let _ = tx.send(WorkerMsg::Finished { results, touched: vec![destination.clone()] });
}

/// Extracts a single archive entry (recursing into directories), honoring
/// any conflict resolution recorded for it. A file with no resolution
/// entry had no conflict and is written straight through.
fn extract_one(
    router: &Router,
    source: &Location,
    dest: &Location,
    resolutions: &HashMap<Location, ConflictResolution>,
    results: &mut TaskResults,
    cancelled: &std::sync::atomic::AtomicBool,
) -> Result<(), CoreError> {
    let stat = router.stat(source)?;
    if stat.is_dir() {
        router.make_dir(dest)?;
        for child in router.list(source)? {
            if cancelled.load(Ordering::Relaxed) {
                return Err(CoreError::Cancelled);
            }
            extract_one(router, &child.location, &dest.join(&child.display_name), resolutions, results, cancelled)?;
        }
        return Ok(());
    }

    match resolutions.get(source) {
        Some(ConflictResolution::Skip) => {
            results.skipped += 1;
            Ok(())
        }
        Some(ConflictResolution::RenameTo(name)) => {
            let renamed = dest.parent().map(|p| p.join(name)).unwrap_or_else(|| dest.clone());
            router.copy(source, &renamed, cancelled, |_| {})
        }
        Some(ConflictResolution::Overwrite) | None => router.copy(source, dest, cancelled, |_| {}),
    }
}

impl ManagedTask for ArchiveExtractTask {
    fn kind(&self) -> TaskKind {
        TaskKind::ArchiveExtract
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
                        message: format!("Extract {} into {}?", self.archive_root.display(), self.destination.display()),
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
                    self.spawn(env);
                    TaskPoll::None
                }
            }
            TaskState::ResolvingConflict => match self.awaiting {
                Some(AwaitKind::ConflictChoice) => {
                    if let Some((source, destination)) = self.next_unresolved_conflict() {
                        TaskPoll::ShowConflict { source, destination }
                    } else {
                        self.spawn(env);
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
                        WorkerMsg::Progress { processed, label } => {
                            env.progress.update(processed, label, None, self.ctx.results.errors, false);
                        }
                        WorkerMsg::ItemError { label, message } => {
                            env.log.push(LogSource::Archive, LogLevel::Error, format!("{label}: {message}"));
                        }
                        WorkerMsg::Finished { results, touched } => {
                            if let Some(handle) = self.worker.take() {
                                let _ = handle.join();
                            }
                            env.progress.clear();
                            self.ctx.results = results.clone();
                            self.state = TaskState::Completed;
                            last = TaskPoll::Done { summary: results, touched };
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
