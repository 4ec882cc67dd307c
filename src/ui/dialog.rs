//! Modal dialogs and viewers (spec §4.6): small, focused [`UiLayer`]
//! implementations pushed above the main screen. Each one reports its
//! result back through a shared `Arc<Mutex<Option<T>>>` slot the pusher
//! polls after the dialog closes — the same bridge pattern
//! [`crate::core::tasks::search::SearchResults`] uses for a worker thread,
//! generalized to a human instead of a background job.

use std::sync::{Arc, Mutex};

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use crate::app::event::{KeyCode, KeyPayload};
use crate::ui::layer::UiLayer;
use crate::ui::text::{display_width, grapheme_byte_offset, grapheme_count};
use crate::ui::theme::Theme;

/// Centers a fixed-size rectangle within `area`, clamped so it never
/// exceeds the available space (spec §4.6's "centered, configurable
/// maximum width/height ratio").
pub fn centered_fixed(width: u16, height: u16, area: Rect) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(w)) / 2;
    let y = area.y + (area.height.saturating_sub(h)) / 2;
    Rect::new(x, y, w, h)
}

fn dialog_block(title: &str) -> Block<'static> {
    Block::default()
        .title(format!(" {title} "))
        .title_style(Theme::title_style())
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Theme::border_style())
}

// ───────────────────────────────────────── confirm ───────────

/// Yes/no confirmation (spec §4.6's common base: Enter confirms, Esc
/// cancels).
pub struct ConfirmDialog {
    message: String,
    result: Arc<Mutex<Option<bool>>>,
    closed: bool,
    dirty: bool,
}

impl ConfirmDialog {
    pub fn new(message: String) -> (Self, Arc<Mutex<Option<bool>>>) {
        let result = Arc::new(Mutex::new(None));
        (
            Self {
                message,
                result: Arc::clone(&result),
                closed: false,
                dirty: true,
            },
            result,
        )
    }
}

impl UiLayer for ConfirmDialog {
    fn handle_key_event(&mut self, event: KeyPayload) -> bool {
        match event.code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                *self.result.lock().unwrap() = Some(true);
                self.closed = true;
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                *self.result.lock().unwrap() = Some(false);
                self.closed = true;
            }
            _ => return false,
        }
        self.dirty = true;
        true
    }

    fn draw(&mut self, frame: &mut Frame, region: Rect) {
        let area = centered_fixed((self.message.len() as u16 + 6).clamp(24, 60), 5, region);
        let block = dialog_block("Confirm");
        let inner = block.inner(area);
        frame.render_widget(Clear, area);
        frame.render_widget(block, area);
        let text = Paragraph::new(vec![
            Line::from(self.message.clone()),
            Line::from(""),
            Line::from("[Y]es   [N]o"),
        ])
        .wrap(Wrap { trim: true });
        frame.render_widget(text, inner);
    }

    fn needs_redraw(&self) -> bool {
        self.dirty
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn should_close(&self) -> bool {
        self.closed
    }
}

// ───────────────────────────────────────── conflict choice ───

/// One conflict's outcome, matching
/// [`crate::core::tasks::copy_move_delete`]'s resolve-by-string protocol.
#[derive(Debug, Clone)]
pub struct ConflictOutcome {
    pub value: String,
    pub apply_to_all: bool,
}

/// Overwrite / skip / rename / cancel, with an "apply to all remaining"
/// toggle (spec §4.4's conflict resolution).
pub struct ConflictDialog {
    source: String,
    destination: String,
    apply_to_all: bool,
    result: Arc<Mutex<Option<ConflictOutcome>>>,
    closed: bool,
    dirty: bool,
}

impl ConflictDialog {
    pub fn new(source: String, destination: String) -> (Self, Arc<Mutex<Option<ConflictOutcome>>>) {
        let result = Arc::new(Mutex::new(None));
        (
            Self {
                source,
                destination,
                apply_to_all: false,
                result: Arc::clone(&result),
                closed: false,
                dirty: true,
            },
            result,
        )
    }

    fn finish(&mut self, value: &str) {
        *self.result.lock().unwrap() = Some(ConflictOutcome {
            value: value.to_string(),
            apply_to_all: self.apply_to_all,
        });
        self.closed = true;
        self.dirty = true;
    }
}

impl UiLayer for ConflictDialog {
    fn handle_key_event(&mut self, event: KeyPayload) -> bool {
        match event.code {
            KeyCode::Char('o') | KeyCode::Char('O') => self.finish("overwrite"),
            KeyCode::Char('s') | KeyCode::Char('S') => self.finish("skip"),
            KeyCode::Char('r') | KeyCode::Char('R') => self.finish("rename"),
            KeyCode::Esc | KeyCode::Char('c') | KeyCode::Char('C') => self.finish("cancel"),
            KeyCode::Char('a') | KeyCode::Char('A') => {
                self.apply_to_all = !self.apply_to_all;
                self.dirty = true;
            }
            _ => return false,
        }
        true
    }

    fn draw(&mut self, frame: &mut Frame, region: Rect) {
        let area = centered_fixed(60, 8, region);
        let block = dialog_block("Name Conflict");
        let inner = block.inner(area);
        frame.render_widget(Clear, area);
        frame.render_widget(block, area);
        let checkbox = if self.apply_to_all { "[x]" } else { "[ ]" };
        let text = Paragraph::new(vec![
            Line::from(format!("Source: {}", self.source)),
            Line::from(format!("Exists: {}", self.destination)),
            Line::from(""),
            Line::from(format!("{checkbox} apply to all remaining (A)")),
            Line::from("[O]verwrite  [S]kip  [R]ename  [C]ancel"),
        ])
        .wrap(Wrap { trim: true });
        frame.render_widget(text, inner);
    }

    fn needs_redraw(&self) -> bool {
        self.dirty
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn should_close(&self) -> bool {
        self.closed
    }
}

// ───────────────────────────────────────── text input ────────

/// Single-line text entry — rename, new directory name, filter pattern,
/// jump path, search pattern (spec §4.6's Input dialog).
pub struct InputDialog {
    title: String,
    text: String,
    cursor: usize,
    result: Arc<Mutex<Option<Option<String>>>>,
    closed: bool,
    dirty: bool,
}

impl InputDialog {
    /// `result` resolves to `Some(Some(text))` on confirm, `Some(None)` on
    /// cancel — the outer option is the "has the dialog decided yet" flag
    /// the pusher polls for.
    pub fn new(title: String, initial: String) -> (Self, Arc<Mutex<Option<Option<String>>>>) {
        let result = Arc::new(Mutex::new(None));
        let cursor = grapheme_count(&initial);
        (
            Self {
                title,
                text: initial,
                cursor,
                result: Arc::clone(&result),
                closed: false,
                dirty: true,
            },
            result,
        )
    }
}

impl UiLayer for InputDialog {
    fn handle_key_event(&mut self, event: KeyPayload) -> bool {
        match event.code {
            KeyCode::Enter => {
                *self.result.lock().unwrap() = Some(Some(self.text.clone()));
                self.closed = true;
            }
            KeyCode::Esc => {
                *self.result.lock().unwrap() = Some(None);
                self.closed = true;
            }
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    let start = grapheme_byte_offset(&self.text, self.cursor - 1);
                    let end = grapheme_byte_offset(&self.text, self.cursor);
                    self.text.replace_range(start..end, "");
                    self.cursor -= 1;
                }
            }
            KeyCode::Delete => {
                let count = grapheme_count(&self.text);
                if self.cursor < count {
                    let start = grapheme_byte_offset(&self.text, self.cursor);
                    let end = grapheme_byte_offset(&self.text, self.cursor + 1);
                    self.text.replace_range(start..end, "");
                }
            }
            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => self.cursor = (self.cursor + 1).min(grapheme_count(&self.text)),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = grapheme_count(&self.text),
            KeyCode::Char(c) if event.modifiers.is_empty() || event.modifiers == crate::app::event::KeyModifiers::SHIFT => {
                let byte_idx = grapheme_byte_offset(&self.text, self.cursor);
                self.text.insert(byte_idx, c);
                self.cursor += 1;
            }
            _ => return false,
        }
        self.dirty = true;
        true
    }

    fn handle_char_event(&mut self, ch: char) -> bool {
        let byte_idx = grapheme_byte_offset(&self.text, self.cursor);
        self.text.insert(byte_idx, ch);
        self.cursor += 1;
        self.dirty = true;
        true
    }

    fn draw(&mut self, frame: &mut Frame, region: Rect) {
        let area = centered_fixed(60, 4, region);
        let block = dialog_block(&self.title);
        let inner = block.inner(area);
        frame.render_widget(Clear, area);
        frame.render_widget(block, area);
        let line = Paragraph::new(self.text.as_str()).style(Theme::command_input_style());
        frame.render_widget(line, inner);
        let cursor_col = display_width(&self.text[..grapheme_byte_offset(&self.text, self.cursor)]) as u16;
        frame.set_cursor_position((inner.x + cursor_col, inner.y));
    }

    fn needs_redraw(&self) -> bool {
        self.dirty
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn should_close(&self) -> bool {
        self.closed
    }
}

// ───────────────────────────────────────── list / jump / drives / search ──

/// One selectable row in a [`ListDialog`].
#[derive(Debug, Clone)]
pub struct ListItemData {
    pub label: String,
    pub value: String,
}

/// Generic live-filtered picker, reused for the Jump, Drives and Search
/// dialogs (spec §4.6) by handing it differently-populated item sources —
/// a static favorites/drives list, or a search task's
/// [`crate::core::tasks::search::SearchResults`] polled every tick.
pub struct ListDialog {
    title: String,
    all_items: Vec<ListItemData>,
    filtered: Vec<usize>,
    filter: String,
    list_state: ListState,
    /// Identity (the item's `value`, not its position) of the currently
    /// selected row, tracked across filter/source updates so selection
    /// survives a narrowing or widening filter (spec §4.6: "maintains
    /// selection across filter updates: if the previously selected entry
    /// is still present, it stays selected; otherwise selection clamps").
    selected_value: Option<String>,
    result: Arc<Mutex<Option<Option<String>>>>,
    closed: bool,
    dirty: bool,
    /// Polled on every tick to refresh `all_items` — `None` for a static
    /// (non-live) list.
    source: Option<Box<dyn FnMut() -> Option<Vec<ListItemData>> + 'static>>,
}

impl ListDialog {
    pub fn new(title: String, items: Vec<ListItemData>) -> (Self, Arc<Mutex<Option<Option<String>>>>) {
        let result = Arc::new(Mutex::new(None));
        let mut dialog = Self {
            title,
            all_items: items,
            filtered: Vec::new(),
            filter: String::new(),
            list_state: ListState::default(),
            selected_value: None,
            result: Arc::clone(&result),
            closed: false,
            dirty: true,
            source: None,
        };
        dialog.recompute_filter();
        (dialog, result)
    }

    /// Attach a live producer (e.g. a search task's result snapshot),
    /// polled once per tick via [`UiLayer::on_tick`].
    pub fn with_live_source(mut self, source: impl FnMut() -> Option<Vec<ListItemData>> + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Selects `filtered[idx]` and records its identity so it survives the
    /// next filter/source recompute.
    fn select_filtered_index(&mut self, idx: usize) {
        self.list_state.select(Some(idx));
        self.selected_value = self.filtered.get(idx).map(|&i| self.all_items[i].value.clone());
    }

    fn recompute_filter(&mut self) {
        let needle = self.filter.to_lowercase();
        self.filtered = self
            .all_items
            .iter()
            .enumerate()
            .filter(|(_, item)| needle.is_empty() || item.label.to_lowercase().contains(&needle))
            .map(|(i, _)| i)
            .collect();

        if self.filtered.is_empty() {
            self.list_state.select(None);
            self.selected_value = None;
            return;
        }

        // Re-find the previously selected item by identity; only clamp by
        // position when it is no longer present (or nothing was selected
        // yet, e.g. on first populate).
        let position = self
            .selected_value
            .as_ref()
            .and_then(|value| self.filtered.iter().position(|&i| &self.all_items[i].value == value));
        let idx = position.unwrap_or_else(|| self.list_state.selected().unwrap_or(0).min(self.filtered.len() - 1));
        self.select_filtered_index(idx);
    }

    fn finish(&mut self, value: Option<String>) {
        *self.result.lock().unwrap() = Some(value);
        self.closed = true;
        self.dirty = true;
    }
}

impl UiLayer for ListDialog {
    fn handle_key_event(&mut self, event: KeyPayload) -> bool {
        match event.code {
            KeyCode::Esc => self.finish(None),
            KeyCode::Enter => {
                let selected = self.list_state.selected().and_then(|i| self.filtered.get(i));
                let value = selected.map(|&i| self.all_items[i].value.clone());
                self.finish(value);
            }
            KeyCode::Down => {
                if !self.filtered.is_empty() {
                    let next = self.list_state.selected().map(|i| (i + 1).min(self.filtered.len() - 1)).unwrap_or(0);
                    self.select_filtered_index(next);
                    self.dirty = true;
                }
            }
            KeyCode::Up => {
                if !self.filtered.is_empty() {
                    let prev = self.list_state.selected().map(|i| i.saturating_sub(1)).unwrap_or(0);
                    self.select_filtered_index(prev);
                    self.dirty = true;
                }
            }
            KeyCode::Backspace => {
                self.filter.pop();
                self.recompute_filter();
                self.dirty = true;
            }
            KeyCode::Char(c) => {
                self.filter.push(c);
                self.recompute_filter();
                self.dirty = true;
            }
            _ => return false,
        }
        true
    }

    fn on_tick(&mut self) {
        if let Some(source) = self.source.as_mut() {
            if let Some(items) = source() {
                self.all_items = items;
                self.recompute_filter();
                self.dirty = true;
            }
        }
    }

    fn draw(&mut self, frame: &mut Frame, region: Rect) {
        let area = centered_fixed(70, (region.height.saturating_sub(4)).min(24).max(8), region);
        let block = dialog_block(&format!("{} — {}", self.title, self.filter));
        let inner = block.inner(area);
        frame.render_widget(Clear, area);
        frame.render_widget(block, area);

        let items: Vec<ListItem> = self
            .filtered
            .iter()
            .map(|&i| ListItem::new(self.all_items[i].label.clone()))
            .collect();
        let list = List::new(items)
            .highlight_style(Theme::selected_style())
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, inner, &mut self.list_state);
    }

    fn needs_redraw(&self) -> bool {
        self.dirty
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn should_close(&self) -> bool {
        self.closed
    }
}

// ───────────────────────────────────────── info ──────────────

/// Read-only file info panel, backed by [`crate::core::inspector::InspectorInfo`]
/// (spec §4.6's Info dialog).
pub struct InfoDialog {
    info: crate::core::inspector::InspectorInfo,
    closed: bool,
    dirty: bool,
}

impl InfoDialog {
    pub fn new(info: crate::core::inspector::InspectorInfo) -> Self {
        Self {
            info,
            closed: false,
            dirty: true,
        }
    }
}

impl UiLayer for InfoDialog {
    fn handle_key_event(&mut self, event: KeyPayload) -> bool {
        match event.code {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => {
                self.closed = true;
                self.dirty = true;
                true
            }
            _ => false,
        }
    }

    fn draw(&mut self, frame: &mut Frame, region: Rect) {
        let area = centered_fixed(64, 16, region);
        let block = dialog_block(&format!("Info — {}", self.info.name));
        let inner = block.inner(area);
        frame.render_widget(Clear, area);
        frame.render_widget(block, area);

        let mut lines = vec![
            Line::from(format!("Path: {}", self.info.path.display())),
            Line::from(format!("Kind: {}", self.info.kind)),
        ];
        if let Some(size) = self.info.size_bytes {
            lines.push(Line::from(format!("Size: {size} bytes")));
        }
        if let Some(detected) = &self.info.detected_type {
            lines.push(Line::from(format!("Type: {detected}")));
        }
        if let (Some(sym), Some(octal)) = (&self.info.perms_symbolic, &self.info.perms_octal) {
            lines.push(Line::from(format!("Permissions: {sym} ({octal})")));
        }
        if self.info.readonly {
            lines.push(Line::from(Span::styled("Read-only", Style::default().fg(Color::Yellow))));
        }
        if let Some(target) = &self.info.symlink_target {
            lines.push(Line::from(format!("Symlink → {target}")));
        }
        if self.info.kind == "Directory" {
            lines.push(Line::from(format!(
                "{} dirs, {} files, {} other",
                self.info.subdirs.unwrap_or(0),
                self.info.subfiles.unwrap_or(0),
                self.info.others.unwrap_or(0)
            )));
        }
        if let Some(err) = &self.info.error {
            lines.push(Line::from(Span::styled(err.clone(), Style::default().fg(Color::Red))));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Esc/Enter to close", Style::default().add_modifier(Modifier::DIM))));

        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
    }

    fn needs_redraw(&self) -> bool {
        self.dirty
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn should_close(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyPayload {
        KeyPayload { code, modifiers: KeyModifiers::NONE, char: None }
    }

    #[test]
    fn backspace_removes_whole_grapheme_cluster() {
        let (mut dialog, result) = InputDialog::new("Rename".into(), "a\u{0301}b".into());
        // cursor starts after "b" (2 grapheme clusters: "a-acute", "b")
        dialog.handle_key_event(key(KeyCode::Backspace));
        dialog.handle_key_event(key(KeyCode::Enter));
        assert_eq!(result.lock().unwrap().clone().unwrap().unwrap(), "a\u{0301}");
    }

    #[test]
    fn left_then_backspace_deletes_the_combining_sequence_not_just_the_mark() {
        let (mut dialog, result) = InputDialog::new("Rename".into(), "e\u{0301}".into());
        dialog.handle_key_event(key(KeyCode::Home));
        dialog.handle_key_event(key(KeyCode::Right));
        dialog.handle_key_event(key(KeyCode::Backspace));
        dialog.handle_key_event(key(KeyCode::Enter));
        assert_eq!(result.lock().unwrap().clone().unwrap().unwrap(), "");
    }

    #[test]
    fn conflict_apply_to_all_toggle_is_carried_in_outcome() {
        let (mut dialog, result) = ConflictDialog::new("a.txt".into(), "dest/a.txt".into());
        dialog.handle_key_event(key(KeyCode::Char('a')));
        dialog.handle_key_event(key(KeyCode::Char('o')));
        let outcome = result.lock().unwrap().clone().unwrap();
        assert_eq!(outcome.value, "overwrite");
        assert!(outcome.apply_to_all);
    }

    #[test]
    fn confirm_escape_resolves_false() {
        let (mut dialog, result) = ConfirmDialog::new("Quit?".into());
        dialog.handle_key_event(key(KeyCode::Esc));
        assert_eq!(result.lock().unwrap().clone(), Some(false));
    }

    fn list_item(name: &str) -> ListItemData {
        ListItemData { label: name.into(), value: name.into() }
    }

    /// Spec §4.6: selecting "cherry" then narrowing the filter to a subset
    /// that still contains "cherry" (but at a different position) must
    /// keep "cherry" selected, not whatever item now sits at the old
    /// numeric index.
    #[test]
    fn list_dialog_keeps_selection_by_identity_across_filter_narrowing() {
        let items = vec![list_item("apple"), list_item("banana"), list_item("cherry"), list_item("date")];
        let (mut dialog, result) = ListDialog::new("Pick".into(), items);

        dialog.handle_key_event(key(KeyCode::Down));
        dialog.handle_key_event(key(KeyCode::Down));
        assert_eq!(dialog.selected_value.as_deref(), Some("cherry"));

        // "apple", "cherry" and "date" all contain 'e'; "banana" doesn't —
        // filtered becomes ["apple", "cherry", "date"], with "cherry" now
        // at position 1 instead of 2.
        dialog.handle_key_event(key(KeyCode::Char('e')));
        assert_eq!(dialog.filtered.len(), 3);
        assert_eq!(dialog.selected_value.as_deref(), Some("cherry"));

        dialog.handle_key_event(key(KeyCode::Enter));
        assert_eq!(result.lock().unwrap().clone().unwrap().unwrap(), "cherry");
    }

    /// Once the selected item is filtered out entirely, selection clamps
    /// to a remaining row instead of leaving a stale reference.
    #[test]
    fn list_dialog_clamps_selection_once_selected_item_is_filtered_out() {
        let items = vec![list_item("apple"), list_item("banana"), list_item("cherry")];
        let (mut dialog, _result) = ListDialog::new("Pick".into(), items);

        dialog.handle_key_event(key(KeyCode::Down));
        dialog.handle_key_event(key(KeyCode::Down));
        assert_eq!(dialog.selected_value.as_deref(), Some("cherry"));

        // Only "banana" contains a 'b'; "cherry" drops out of the filter.
        dialog.handle_key_event(key(KeyCode::Char('b')));
        assert_eq!(dialog.filtered.len(), 1);
        assert_eq!(dialog.selected_value.as_deref(), Some("banana"));
    }
}
