//! The dual-pane main screen (spec §4.5): the permanent bottom [`UiLayer`].
//!
//! Owns both [`PaneState`]s, the active task slot and every shortcut that
//! isn't delegated to a pushed dialog. Dialogs close on their own layer;
//! their result lands back here on the next tick via [`Pending`], the same
//! callback-based-recursion shape [`crate::core::task::TaskPoll`] uses for
//! the task state machine (spec §9).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph};

use crate::app::event::{KeyCode, KeyPayload, MouseKind, MousePayload, SystemKind};
use crate::app::state::AppState;
use crate::config::Action;
use crate::core::entry::Entry;
use crate::core::error::{CoreError, CoreResult};
use crate::core::grouping::{self, GroupedEntry, GroupingConfig, human_size};
use crate::core::inspector;
use crate::core::pane::PaneState;
use crate::core::sort::SortMode;
use crate::core::task::{TaskEnv, TaskPoll};
use crate::core::tasks::archive::{ArchiveCreateTask, ArchiveExtractTask};
use crate::core::tasks::copy_move_delete::{CopyMoveDeleteTask, OpMode};
use crate::core::tasks::search::SearchTask;
use crate::storage::Location;
use crate::ui::batch_rename::BatchRenameDialog;
use crate::ui::dialog::{ConfirmDialog, ConflictDialog, ConflictOutcome, InfoDialog, InputDialog, ListDialog, ListItemData};
use crate::ui::diff_viewer::DirectoryDiffViewer;
use crate::ui::layer::UiLayer;
use crate::ui::layout::AppLayout;
use crate::ui::text::{pad_to_width, truncate_to_width};
use crate::ui::text_viewer::TextViewer;
use crate::ui::theme::Theme;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaneSide {
    Left,
    Right,
}

impl PaneSide {
    fn other(self) -> Self {
        match self {
            PaneSide::Left => PaneSide::Right,
            PaneSide::Right => PaneSide::Left,
        }
    }
}

/// A dialog result the main screen is waiting on, polled every tick
/// regardless of which layer is currently on top.
enum Pending {
    TaskConfirm(Arc<Mutex<Option<bool>>>),
    TaskConflict(Arc<Mutex<Option<ConflictOutcome>>>),
    TaskRename(Arc<Mutex<Option<Option<String>>>>),
    MakeDir(Arc<Mutex<Option<Option<String>>>>),
    RenameEntry(Arc<Mutex<Option<Option<String>>>>, Location),
    Filter(Arc<Mutex<Option<Option<String>>>>),
    Jump(Arc<Mutex<Option<Option<String>>>>),
    Drives(Arc<Mutex<Option<Option<String>>>>),
    Search(Arc<Mutex<Option<Option<String>>>>),
    ArchiveName(Arc<Mutex<Option<Option<String>>>>, Vec<Entry>),
    BatchRename(Arc<Mutex<Option<Option<Vec<(Location, String)>>>>>),
    Quit(Arc<Mutex<Option<bool>>>),
}

pub struct MainScreen {
    state: AppState,
    left: PaneState,
    right: PaneState,
    active: PaneSide,
    pending_layer: Option<Box<dyn UiLayer>>,
    pending: Vec<Pending>,
    status_message: Option<String>,
    dirty: bool,
    visible_rows: usize,
    left_area: Rect,
    right_area: Rect,
    header_left: Rect,
    header_right: Rect,
}

impl MainScreen {
    /// Read once at startup by the event reader (spec §4.2's double-click
    /// detection threshold comes from user configuration).
    pub fn double_click_ms(&self) -> u64 {
        self.state.config.double_click_ms
    }

    pub fn new(state: AppState, left_root: Location, right_root: Location) -> CoreResult<Self> {
        let mut left = PaneState::new(left_root);
        let mut right = PaneState::new(right_root);
        let sort_mode = SortMode {
            key: state.config.default_sort_key,
            descending: state.config.default_sort_descending,
        };
        for pane in [&mut left, &mut right] {
            pane.show_hidden = state.config.show_hidden;
            pane.dirs_first = state.config.dirs_first;
            pane.sort_mode = sort_mode;
        }
        left.refresh(&state.router)?;
        right.refresh(&state.router)?;

        let mut screen = Self {
            state,
            left,
            right,
            active: PaneSide::Left,
            pending_layer: None,
            pending: Vec::new(),
            status_message: None,
            dirty: true,
            visible_rows: 0,
            left_area: Rect::default(),
            right_area: Rect::default(),
            header_left: Rect::default(),
            header_right: Rect::default(),
        };
        screen.sync_quit_target();
        Ok(screen)
    }

    fn active_pane(&self) -> &PaneState {
        match self.active {
            PaneSide::Left => &self.left,
            PaneSide::Right => &self.right,
        }
    }

    fn active_pane_mut(&mut self) -> &mut PaneState {
        match self.active {
            PaneSide::Left => &mut self.left,
            PaneSide::Right => &mut self.right,
        }
    }

    fn inactive_pane(&self) -> &PaneState {
        match self.active {
            PaneSide::Left => &self.right,
            PaneSide::Right => &self.left,
        }
    }

    /// Whatever the active pane is currently rooted at becomes the shell's
    /// cd-on-quit target (spec §6). Updated on every navigation rather than
    /// only on an explicit jump — see DESIGN.md.
    fn sync_quit_target(&mut self) {
        if let Some(path) = self.active_pane().root.as_local() {
            self.state.quit_to_dir = Some(path.display().to_string());
        }
    }

    fn report_error(&mut self, err: &CoreError) {
        self.state.log.push(crate::core::log::LogSource::Main, crate::core::log::LogLevel::Error, err.to_string());
        self.status_message = Some(err.to_string());
    }

    fn dispatch(&mut self, action: Action) {
        match action {
            Action::MoveUp => self.move_cursor(-1),
            Action::MoveDown => self.move_cursor(1),
            Action::PageUp => self.move_cursor(-(self.visible_rows.max(1) as i64)),
            Action::PageDown => self.move_cursor(self.visible_rows.max(1) as i64),
            Action::Home => {
                let p = self.active_pane_mut();
                p.cursor_index = 0;
                p.clamp_cursor();
            }
            Action::End => {
                let p = self.active_pane_mut();
                p.cursor_index = p.entries.len().saturating_sub(1);
                p.clamp_cursor();
            }
            Action::EnterDir => self.enter_or_open(),
            Action::ParentDir => self.navigate_parent(),
            Action::SwitchPane => self.active = self.active.other(),
            Action::ToggleHidden => {
                let p = self.active_pane_mut();
                p.show_hidden = !p.show_hidden;
                p.recompute_view();
            }
            Action::ToggleSelect => self.active_pane_mut().toggle_selection_at_cursor(),
            Action::SelectAll => self.active_pane_mut().select_all(),
            Action::DeselectAll => self.active_pane_mut().deselect_all(),
            Action::InvertSelection => self.active_pane_mut().invert_selection(),
            Action::CycleSortKey => {
                let p = self.active_pane_mut();
                p.sort_mode = p.sort_mode.cycle_key();
                p.recompute_view();
            }
            Action::ToggleSortDirection => {
                let p = self.active_pane_mut();
                p.sort_mode = p.sort_mode.toggle_direction();
                p.recompute_view();
            }
            Action::ToggleDirsFirst => {
                let p = self.active_pane_mut();
                p.dirs_first = !p.dirs_first;
                p.recompute_view();
            }
            Action::Filter => self.open_filter_dialog(),
            Action::Copy => self.start_copy_move(OpMode::Copy),
            Action::Move => self.start_copy_move(OpMode::Move),
            Action::Delete => self.start_delete(),
            Action::MakeDir => self.open_make_dir_dialog(),
            Action::Rename => self.open_rename_dialog(),
            Action::ArchiveCreate => self.open_archive_create_dialog(),
            Action::ArchiveExtract => self.start_archive_extract(),
            Action::DiffView => self.open_diff_viewer(),
            Action::Search => self.open_search_dialog(),
            Action::Jump => self.open_jump_dialog(),
            Action::Drives => self.open_drives_dialog(),
            Action::BatchRename => self.open_batch_rename_dialog(),
            Action::ViewFile => self.open_text_viewer(),
            Action::InfoDialog => self.open_info_dialog(),
            Action::ToggleLogPane => self.state.config.log_pane_visible = !self.state.config.log_pane_visible,
            Action::ToggleGrouping => self.state.config.grouping_enabled = !self.state.config.grouping_enabled,
            Action::Quit => self.open_quit_confirm(),
        }
    }

    /// Quit confirmation (spec §4.2's global-shortcut list; spec §4.3's
    /// "CLOSE ... if not consumed and the top is the main screen, it
    /// triggers the quit-confirmation path" reuses the same dialog).
    fn open_quit_confirm(&mut self) {
        let (dialog, result) = ConfirmDialog::new("Quit?".into());
        self.pending_layer = Some(Box::new(dialog));
        self.pending.push(Pending::Quit(result));
    }

    fn move_cursor(&mut self, delta: i64) {
        let p = self.active_pane_mut();
        if p.entries.is_empty() {
            return;
        }
        let next = (p.cursor_index as i64 + delta).clamp(0, p.entries.len() as i64 - 1);
        p.cursor_index = next as usize;
    }

    fn enter_or_open(&mut self) {
        let Some(entry) = self.active_pane().current_entry().cloned() else { return };
        if entry.is_dir() {
            let name = entry.display_name.clone();
            let router = Arc::clone(&self.state.router);
            let result = self.active_pane_mut().navigate_child(&name, &router);
            if let Err(e) = result {
                self.report_error(&e);
            }
            return;
        }
        if let Some(cmd) = entry.extension().and_then(|ext| self.state.config.file_type_handlers.get(&ext).cloned()) {
            let command = cmd.replace("{}", &entry.display());
            if let Err(e) = std::process::Command::new("sh").arg("-c").arg(&command).status() {
                self.status_message = Some(format!("handler failed: {e}"));
            }
            return;
        }
        match TextViewer::load(&self.state.router, &entry.location) {
            Ok(viewer) => self.pending_layer = Some(Box::new(viewer)),
            Err(e) => self.report_error(&e),
        }
    }

    fn navigate_parent(&mut self) {
        let router = Arc::clone(&self.state.router);
        let result = self.active_pane_mut().navigate_parent(&router);
        if let Err(e) = result {
            self.report_error(&e);
        }
    }

    fn start_copy_move(&mut self, mode: OpMode) {
        let targets = self.active_pane().active_targets();
        if targets.is_empty() {
            return;
        }
        let destination = self.inactive_pane().root.clone();
        let env = self.state.task_env();
        let task = Box::new(CopyMoveDeleteTask::new(mode, targets, Some(destination)));
        if let Err(e) = self.state.tasks.start_task(task, &env) {
            self.status_message = Some(e.to_string());
        }
    }

    fn start_delete(&mut self) {
        let targets = self.active_pane().active_targets();
        if targets.is_empty() {
            return;
        }
        let env = self.state.task_env();
        let task = Box::new(CopyMoveDeleteTask::new(OpMode::Delete, targets, None));
        if let Err(e) = self.state.tasks.start_task(task, &env) {
            self.status_message = Some(e.to_string());
        }
    }

    fn start_archive_extract(&mut self) {
        let Some(entry) = self.active_pane().current_entry().cloned() else { return };
        let Some(path) = entry.location.as_local() else {
            self.status_message = Some("archive extract requires a local archive file".into());
            return;
        };
        let archive_root = Location::Archive { archive: path.to_path_buf(), inner: String::new() };
        let destination = self.inactive_pane().root.clone();
        let env = self.state.task_env();
        let task = Box::new(ArchiveExtractTask::new(archive_root, destination));
        if let Err(e) = self.state.tasks.start_task(task, &env) {
            self.status_message = Some(e.to_string());
        }
    }

    fn start_archive_create(&mut self, targets: Vec<Entry>, name: String) {
        let archive_path = self
            .active_pane()
            .root
            .as_local()
            .map(|p| p.join(&name))
            .unwrap_or_else(|| PathBuf::from(name));
        let env = self.state.task_env();
        let task = Box::new(ArchiveCreateTask::new(targets, archive_path));
        if let Err(e) = self.state.tasks.start_task(task, &env) {
            self.status_message = Some(e.to_string());
        }
    }

    fn open_diff_viewer(&mut self) {
        let viewer = DirectoryDiffViewer::new(Arc::clone(&self.state.router), self.left.root.clone(), self.right.root.clone());
        self.pending_layer = Some(Box::new(viewer));
    }

    fn open_text_viewer(&mut self) {
        let Some(entry) = self.active_pane().current_entry().cloned() else { return };
        if entry.is_dir() {
            return;
        }
        match TextViewer::load(&self.state.router, &entry.location) {
            Ok(viewer) => self.pending_layer = Some(Box::new(viewer)),
            Err(e) => self.report_error(&e),
        }
    }

    fn open_info_dialog(&mut self) {
        let Some(entry) = self.active_pane().current_entry().cloned() else { return };
        let info = inspector::inspect_entry(&self.state.router, &entry);
        self.pending_layer = Some(Box::new(InfoDialog::new(info)));
    }

    fn open_filter_dialog(&mut self) {
        let initial = self.active_pane().filter_pattern.clone().unwrap_or_default();
        let (dialog, result) = InputDialog::new("Filter".into(), initial);
        self.pending_layer = Some(Box::new(dialog));
        self.pending.push(Pending::Filter(result));
    }

    fn open_make_dir_dialog(&mut self) {
        let (dialog, result) = InputDialog::new("New directory".into(), String::new());
        self.pending_layer = Some(Box::new(dialog));
        self.pending.push(Pending::MakeDir(result));
    }

    fn open_rename_dialog(&mut self) {
        let Some(entry) = self.active_pane().current_entry().cloned() else { return };
        let (dialog, result) = InputDialog::new(format!("Rename {}", entry.display_name), entry.display_name.clone());
        self.pending_layer = Some(Box::new(dialog));
        self.pending.push(Pending::RenameEntry(result, entry.location));
    }

    fn open_archive_create_dialog(&mut self) {
        let targets = self.active_pane().active_targets();
        if targets.is_empty() {
            return;
        }
        let default_name = format!("{}.zip", targets[0].display_name);
        let (dialog, result) = InputDialog::new("Archive name".into(), default_name);
        self.pending_layer = Some(Box::new(dialog));
        self.pending.push(Pending::ArchiveName(result, targets));
    }

    fn open_batch_rename_dialog(&mut self) {
        let targets = self.active_pane().active_targets();
        if targets.is_empty() {
            return;
        }
        let (dialog, result) = BatchRenameDialog::new(targets);
        self.pending_layer = Some(Box::new(dialog));
        self.pending.push(Pending::BatchRename(result));
    }

    fn open_jump_dialog(&mut self) {
        let root = self.active_pane().root.clone();
        let show_hidden = self.active_pane().show_hidden;
        let limit = self.state.config.jump_scan_limit;
        let mut items = Vec::new();
        collect_jump_dirs(&self.state.router, &root, show_hidden, limit, &mut items);
        let (dialog, result) = ListDialog::new("Jump".into(), items);
        self.pending_layer = Some(Box::new(dialog));
        self.pending.push(Pending::Jump(result));
    }

    fn open_drives_dialog(&mut self) {
        let mut items = Vec::new();
        if let Some(home) = dirs::home_dir() {
            items.push(ListItemData { label: format!("Home ({})", home.display()), value: home.display().to_string() });
        }
        items.push(ListItemData { label: "Root (/)".into(), value: "/".into() });
        items.push(ListItemData {
            label: format!("Current ({})", self.active_pane().root.display()),
            value: self.active_pane().root.display(),
        });
        for fav in &self.state.config.favorites {
            items.push(ListItemData { label: format!("Favorite: {}", fav.display()), value: fav.display().to_string() });
        }
        let (dialog, result) = ListDialog::new("Drives".into(), items);
        self.pending_layer = Some(Box::new(dialog));
        self.pending.push(Pending::Drives(result));
    }

    fn open_search_dialog(&mut self) {
        let root = self.active_pane().root.clone();
        let env = self.state.task_env();
        let task = SearchTask::new(root, String::new());
        let results = Arc::clone(&task.results);
        if let Err(e) = self.state.tasks.start_task(Box::new(task), &env) {
            self.status_message = Some(e.to_string());
            return;
        }
        let (dialog, result) = ListDialog::new("Search".into(), Vec::new());
        let dialog = dialog.with_live_source(move || {
            results.take_if_changed().map(|entries| {
                entries
                    .iter()
                    .map(|e| ListItemData { label: e.display_name.clone(), value: e.location.display() })
                    .collect()
            })
        });
        self.pending_layer = Some(Box::new(dialog));
        self.pending.push(Pending::Search(result));
    }

    fn jump_to(&mut self, path: String) {
        let router = Arc::clone(&self.state.router);
        let result = {
            let pane = self.active_pane_mut();
            pane.root = Location::Local(PathBuf::from(path));
            pane.selection.clear();
            pane.refresh(&router)
        };
        if let Err(e) = result {
            self.report_error(&e);
        }
    }

    fn jump_to_file(&mut self, full_path: String) {
        let path = PathBuf::from(&full_path);
        let parent = path.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| path.clone());
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        let router = Arc::clone(&self.state.router);
        let result = {
            let pane = self.active_pane_mut();
            pane.root = Location::Local(parent);
            pane.selection.clear();
            pane.refresh(&router)
        };
        if let Err(e) = result {
            self.report_error(&e);
            return;
        }
        if let Some(name) = name {
            let pane = self.active_pane_mut();
            if let Some(idx) = pane.entries.iter().position(|e| e.display_name == name) {
                pane.cursor_index = idx;
            }
        }
    }

    fn make_dir(&mut self, name: &str) {
        let target = self.active_pane().root.join(name);
        let router = Arc::clone(&self.state.router);
        if let Err(e) = router.make_dir(&target) {
            self.report_error(&e);
            return;
        }
        let result = self.active_pane_mut().refresh(&router);
        if let Err(e) = result {
            self.report_error(&e);
        }
    }

    fn rename_entry(&mut self, loc: &Location, new_name: &str) {
        let target = loc.parent().unwrap_or_else(|| loc.clone()).join(new_name);
        let router = Arc::clone(&self.state.router);
        if let Err(e) = router.rename(loc, &target) {
            self.report_error(&e);
            return;
        }
        let result = self.active_pane_mut().refresh(&router);
        if let Err(e) = result {
            self.report_error(&e);
        }
    }

    fn apply_filter(&mut self, pattern: Option<String>) {
        let pane = self.active_pane_mut();
        pane.filter_pattern = pattern.filter(|p| !p.is_empty());
        pane.recompute_view();
    }

    fn apply_batch_rename(&mut self, plan: Vec<(Location, String)>) {
        let router = Arc::clone(&self.state.router);
        for (loc, new_name) in plan {
            let target = loc.parent().unwrap_or_else(|| loc.clone()).join(&new_name);
            if loc != target {
                if let Err(e) = router.rename(&loc, &target) {
                    self.report_error(&e);
                }
            }
        }
        let result = self.active_pane_mut().refresh(&router);
        if let Err(e) = result {
            self.report_error(&e);
        }
    }

    fn refresh_touched(&mut self, _touched: &[Location]) {
        let router = Arc::clone(&self.state.router);
        if let Err(e) = self.left.refresh(&router) {
            self.report_error(&e);
        }
        if let Err(e) = self.right.refresh(&router) {
            self.report_error(&e);
        }
    }

    fn drain_pending_results(&mut self, env: &TaskEnv) {
        let mut remaining = Vec::new();
        for pending in self.pending.drain(..) {
            match pending {
                Pending::TaskConfirm(slot) => match slot.lock().unwrap().take() {
                    Some(value) => self.state.tasks.resolve_choice(if value { "yes" } else { "no" }, false, env),
                    None => remaining.push(Pending::TaskConfirm(slot)),
                },
                Pending::TaskConflict(slot) => match slot.lock().unwrap().take() {
                    Some(outcome) => self.state.tasks.resolve_choice(&outcome.value, outcome.apply_to_all, env),
                    None => remaining.push(Pending::TaskConflict(slot)),
                },
                Pending::TaskRename(slot) => match slot.lock().unwrap().take() {
                    Some(Some(text)) => self.state.tasks.resolve_input(text, env),
                    Some(None) => self.state.tasks.resolve_dialog_cancel(env),
                    None => remaining.push(Pending::TaskRename(slot)),
                },
                Pending::MakeDir(slot) => match slot.lock().unwrap().take() {
                    Some(Some(name)) if !name.is_empty() => self.make_dir(&name),
                    Some(_) => {}
                    None => remaining.push(Pending::MakeDir(slot)),
                },
                Pending::RenameEntry(slot, loc) => match slot.lock().unwrap().take() {
                    Some(Some(name)) if !name.is_empty() => self.rename_entry(&loc, &name),
                    Some(_) => {}
                    None => remaining.push(Pending::RenameEntry(slot, loc)),
                },
                Pending::Filter(slot) => match slot.lock().unwrap().take() {
                    Some(pattern) => self.apply_filter(pattern),
                    None => remaining.push(Pending::Filter(slot)),
                },
                Pending::Jump(slot) => match slot.lock().unwrap().take() {
                    Some(Some(path)) => self.jump_to(path),
                    Some(None) => {}
                    None => remaining.push(Pending::Jump(slot)),
                },
                Pending::Drives(slot) => match slot.lock().unwrap().take() {
                    Some(Some(path)) => self.jump_to(path),
                    Some(None) => {}
                    None => remaining.push(Pending::Drives(slot)),
                },
                Pending::Search(slot) => match slot.lock().unwrap().take() {
                    Some(Some(path)) => self.jump_to_file(path),
                    Some(None) => {}
                    None => remaining.push(Pending::Search(slot)),
                },
                Pending::ArchiveName(slot, targets) => match slot.lock().unwrap().take() {
                    Some(Some(name)) if !name.is_empty() => self.start_archive_create(targets, name),
                    Some(_) => {}
                    None => remaining.push(Pending::ArchiveName(slot, targets)),
                },
                Pending::BatchRename(slot) => match slot.lock().unwrap().take() {
                    Some(Some(plan)) => self.apply_batch_rename(plan),
                    Some(None) => {}
                    None => remaining.push(Pending::BatchRename(slot)),
                },
                Pending::Quit(slot) => match slot.lock().unwrap().take() {
                    Some(true) => self.state.should_quit = true,
                    Some(false) => {}
                    None => remaining.push(Pending::Quit(slot)),
                },
            }
        }
        self.pending = remaining;
    }

    fn select_row_at(&mut self, side: PaneSide, row: u16) {
        let area = match side {
            PaneSide::Left => self.left_area,
            PaneSide::Right => self.right_area,
        };
        if row <= area.y {
            return;
        }
        let row_idx = (row - area.y - 1) as usize;
        let pane = self.active_pane_mut();
        let idx = pane.scroll_offset + row_idx;
        if idx < pane.entries.len() {
            pane.cursor_index = idx;
        }
    }

    fn draw_header(&mut self, frame: &mut Frame, area: Rect) {
        let half = area.width / 2;
        let left_area = Rect { width: half, ..area };
        let right_area = Rect { x: area.x + half, width: area.width - half, ..area };
        self.header_left = left_area;
        self.header_right = right_area;
        let left_style = if self.active == PaneSide::Left { Theme::selected_style() } else { Theme::title_style() };
        let right_style = if self.active == PaneSide::Right { Theme::selected_style() } else { Theme::title_style() };
        frame.render_widget(Paragraph::new(Span::styled(format!(" {}", self.left.root.display()), left_style)), left_area);
        frame.render_widget(Paragraph::new(Span::styled(format!(" {}", self.right.root.display()), right_style)), right_area);
    }

    fn draw_pane(&self, frame: &mut Frame, area: Rect, side: PaneSide) {
        let is_active = self.active == side;
        let border_style = if is_active { Theme::selected_style() } else { Theme::border_style() };
        let block = Block::default().borders(Borders::ALL).border_type(BorderType::Plain).border_style(border_style);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let date_width: u16 = if self.state.config.full_date_format { 19 } else { 14 };
        let show_date = inner.width >= 34 + date_width;
        let height = inner.height as usize;
        let full_date = self.state.config.full_date_format;

        let pane = match side {
            PaneSide::Left => &self.left,
            PaneSide::Right => &self.right,
        };

        let lines: Vec<Line> = if self.state.config.grouping_enabled {
            let config = GroupingConfig { min_group_size: self.state.config.min_group_size };
            grouping::group_entries(&pane.entries, &config)
                .iter()
                .skip(pane.scroll_offset)
                .take(height)
                .map(|g| grouped_line(g, inner.width, show_date, date_width, full_date))
                .collect()
        } else {
            pane.entries
                .iter()
                .enumerate()
                .skip(pane.scroll_offset)
                .take(height)
                .map(|(i, e)| {
                    let selected = pane.selection.contains(&e.location);
                    let highlighted = is_active && i == pane.cursor_index;
                    entry_line(e, selected, highlighted, inner.width, show_date, date_width, full_date)
                })
                .collect()
        };

        frame.render_widget(Paragraph::new(lines), inner);
    }

    fn draw_log(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" Log ")
            .title_style(Theme::title_style())
            .borders(Borders::ALL)
            .border_type(BorderType::Plain)
            .border_style(Theme::border_style());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let records = self.state.log.snapshot();
        let height = inner.height as usize;
        let start = records.len().saturating_sub(height);
        let lines: Vec<Line> = records[start..]
            .iter()
            .map(|r| {
                let style = match r.level {
                    crate::core::log::LogLevel::Error | crate::core::log::LogLevel::Critical => Style::default().fg(Color::Red),
                    crate::core::log::LogLevel::Warning => Style::default().fg(Color::Yellow),
                    _ => Style::default(),
                };
                Line::from(Span::styled(format!("[{}] {}: {}", r.level.label(), r.source.label(), r.message), style))
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), inner);
    }

    fn draw_status_bar(&self, frame: &mut Frame, area: Rect) {
        let text = if let Some(progress) = self.state.progress.snapshot() {
            format!(
                " {} {}/{} {} ({} errors)",
                progress.kind.label(),
                progress.processed_items,
                progress.total_items,
                progress.current_item_label,
                progress.error_count,
            )
        } else if let Some(msg) = &self.status_message {
            format!(" {msg}")
        } else {
            format!(" {}", self.state.config.status_bar_hint())
        };
        frame.render_widget(Paragraph::new(text).style(Theme::status_bar_style()), area);
    }
}

impl UiLayer for MainScreen {
    /// Spec §4.2: while a task is active, every key/menu event is blocked
    /// except the cancel key (ESC) — global shortcuts are intercepted
    /// separately, before this method ever runs, by
    /// [`MainScreen::try_global_shortcut`].
    fn handle_key_event(&mut self, event: KeyPayload) -> bool {
        if self.state.tasks.is_active() {
            if event.code == KeyCode::Esc {
                self.state.tasks.cancel_current();
                return true;
            }
            return false;
        }

        let Some(action) = self.state.config.match_key(&event) else { return false };
        self.dispatch(action);
        self.sync_quit_target();
        self.dirty = true;
        true
    }

    /// Spec §4.2's global shortcuts: only quit-confirmation applies here,
    /// since this build ships no desktop backend (font-size change is
    /// desktop-only, spec §4.2/§9). Honored regardless of whether a task
    /// is active (spec §9's Open Question: "global shortcuts are always
    /// honored regardless of task state, since they do not mutate file
    /// state") and regardless of which layer is currently on top.
    fn try_global_shortcut(&mut self, event: &KeyPayload) -> bool {
        if self.state.config.match_key(event) == Some(Action::Quit) {
            self.open_quit_confirm();
            self.dirty = true;
            return true;
        }
        false
    }

    fn handle_mouse_event(&mut self, event: MousePayload) -> bool {
        if self.state.tasks.is_active() {
            return false;
        }

        let header_hit = if rect_contains(self.header_left, event.col, event.row) {
            Some(PaneSide::Left)
        } else if rect_contains(self.header_right, event.col, event.row) {
            Some(PaneSide::Right)
        } else {
            None
        };
        let body_hit = if rect_contains(self.left_area, event.col, event.row) {
            Some(PaneSide::Left)
        } else if rect_contains(self.right_area, event.col, event.row) {
            Some(PaneSide::Right)
        } else {
            None
        };

        match event.kind {
            MouseKind::DoubleClick => {
                if let Some(side) = header_hit {
                    self.active = side;
                    self.navigate_parent();
                } else if let Some(side) = body_hit {
                    self.active = side;
                    self.select_row_at(side, event.row);
                    self.enter_or_open();
                } else {
                    return false;
                }
                self.sync_quit_target();
                self.dirty = true;
                true
            }
            MouseKind::Down => {
                if let Some(side) = body_hit {
                    self.active = side;
                    self.select_row_at(side, event.row);
                    self.dirty = true;
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    fn handle_system_event(&mut self, event: SystemKind) -> bool {
        match event {
            // The backend already recomputed grid dimensions; the layer
            // stack forces a full redraw next tick (spec §4.2).
            SystemKind::Resize(_, _) => false,
            SystemKind::Close => {
                self.open_quit_confirm();
                self.dirty = true;
                true
            }
        }
    }

    fn draw(&mut self, frame: &mut Frame, region: Rect) {
        let layout = AppLayout::from_area(region, self.state.config.log_pane_visible, self.state.config.log_fraction, self.state.config.pane_split);

        self.draw_header(frame, layout.header);
        self.left_area = layout.left_pane;
        self.right_area = layout.right_pane;
        self.visible_rows = layout.left_pane.height.saturating_sub(2) as usize;
        self.left.ensure_cursor_visible(self.visible_rows);
        self.right.ensure_cursor_visible(self.visible_rows);
        self.draw_pane(frame, layout.left_pane, PaneSide::Left);
        self.draw_pane(frame, layout.right_pane, PaneSide::Right);
        if let Some(log_area) = layout.log_pane {
            self.draw_log(frame, log_area);
        }
        self.draw_status_bar(frame, layout.status_bar);
    }

    fn needs_redraw(&self) -> bool {
        self.dirty || self.state.tasks.is_active()
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn on_tick(&mut self) {
        self.state.progress.tick_spinner();

        let env = self.state.task_env();
        if self.state.tasks.is_active() {
            match self.state.tasks.poll(&env) {
                TaskPoll::None => {}
                TaskPoll::ShowConfirm { message } => {
                    let (dialog, result) = ConfirmDialog::new(message);
                    self.pending_layer = Some(Box::new(dialog));
                    self.pending.push(Pending::TaskConfirm(result));
                }
                TaskPoll::ShowConflict { source, destination } => {
                    let (dialog, result) = ConflictDialog::new(source.display(), destination.display());
                    self.pending_layer = Some(Box::new(dialog));
                    self.pending.push(Pending::TaskConflict(result));
                }
                TaskPoll::ShowRenameInput { default_name } => {
                    let (dialog, result) = InputDialog::new("Rename to".into(), default_name);
                    self.pending_layer = Some(Box::new(dialog));
                    self.pending.push(Pending::TaskRename(result));
                }
                TaskPoll::Done { summary, touched } => {
                    self.status_message = Some(format!("{} ok, {} skipped, {} errors", summary.success, summary.skipped, summary.errors));
                    self.refresh_touched(&touched);
                    self.dirty = true;
                }
            }
        }

        self.drain_pending_results(&env);
    }

    fn take_pending_layer(&mut self) -> Option<Box<dyn UiLayer>> {
        self.pending_layer.take()
    }

    fn wants_quit(&self) -> bool {
        self.state.should_quit
    }

    fn quit_payload(&self) -> Option<String> {
        self.state.quit_to_dir.clone()
    }
}

fn rect_contains(area: Rect, col: u16, row: u16) -> bool {
    area.width > 0 && area.height > 0 && col >= area.x && col < area.x + area.width && row >= area.y && row < area.y + area.height
}

fn collect_jump_dirs(router: &crate::storage::Router, dir: &Location, show_hidden: bool, limit: usize, out: &mut Vec<ListItemData>) {
    if out.len() >= limit {
        return;
    }
    let Ok(entries) = router.list(dir) else { return };
    for entry in entries {
        if out.len() >= limit {
            return;
        }
        if !entry.is_dir() || (entry.is_hidden && !show_hidden) {
            continue;
        }
        out.push(ListItemData { label: entry.display(), value: entry.location.display() });
        collect_jump_dirs(router, &entry.location, show_hidden, limit, out);
    }
}

/// Truncates and NFC-normalizes `s` to fit `width` display columns (spec
/// §3/§8 invariant 10: width accounting happens after normalization, not
/// before, so a combining-sequence name and its precomposed form render
/// identically wide).
fn truncate(s: &str, width: usize) -> String {
    truncate_to_width(s, width)
}

fn format_mtime(t: std::time::SystemTime, full: bool) -> String {
    use chrono::{DateTime, Local};
    let datetime: DateTime<Local> = t.into();
    if full {
        datetime.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        datetime.format("%y-%m-%d %H:%M").to_string()
    }
}

fn entry_line(entry: &Entry, selected: bool, highlighted: bool, width: u16, show_date: bool, date_width: u16, full_date: bool) -> Line<'static> {
    let mut style = if entry.is_dir() { Theme::dir_style() } else { Theme::file_style() };
    if selected {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    if highlighted {
        style = style.patch(Theme::selected_style());
    }

    let name_width = if show_date {
        width.saturating_sub(10 + date_width + 2)
    } else {
        width.saturating_sub(11)
    } as usize;
    let name = pad_to_width(&truncate(&entry.display_name, name_width.max(1)), name_width.max(1));
    let size = if entry.is_dir() { "<DIR>".to_string() } else { human_size(entry.size) };

    let text = if show_date {
        let date = entry.mtime.map(|t| format_mtime(t, full_date)).unwrap_or_default();
        format!("{name} {size:>9} {date:>date_width$}", date_width = date_width as usize)
    } else {
        format!("{name} {size:>9}")
    };
    Line::from(Span::styled(text, style))
}

fn grouped_line(g: &GroupedEntry<'_>, width: u16, show_date: bool, date_width: u16, full_date: bool) -> Line<'static> {
    match g {
        GroupedEntry::Single(entry) => entry_line(entry, false, false, width, show_date, date_width, full_date),
        GroupedEntry::Group { label, count, total_size, .. } => {
            Line::from(Span::styled(format!("{label} ({count} files, {})", human_size(*total_size)), Theme::group_style()))
        }
    }
}
