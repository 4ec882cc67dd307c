//! File-list engine — directory listing, sort/filter, selection, cursor
//! history and the scroll model shared by both panes (spec §3, §4.5).

use std::collections::{HashMap, HashSet};

use crate::core::entry::Entry;
use crate::core::error::CoreResult;
use crate::core::sort::{sort_entries, SortMode};
use crate::storage::{Location, Router};

/// What the cursor/scroll/selection looked like the last time this
/// directory was the active one — restored on navigate-back (spec §4.5).
#[derive(Debug, Clone)]
pub struct CursorMemo {
    pub cursor_index: usize,
    pub scroll_offset: usize,
    pub selected_name: Option<String>,
}

/// One pane's worth of state, exclusively owned by the main screen (spec §3).
pub struct PaneState {
    pub root: Location,
    /// The last listing as returned by the storage backend, before filter
    /// or sort is applied.
    raw_entries: Vec<Entry>,
    /// The filtered + sorted view the UI actually renders.
    pub entries: Vec<Entry>,
    pub cursor_index: usize,
    pub scroll_offset: usize,
    pub selection: HashSet<Location>,
    pub sort_mode: SortMode,
    pub filter_pattern: Option<String>,
    pub show_hidden: bool,
    pub dirs_first: bool,
    pub cursor_history: HashMap<Location, CursorMemo>,
}

impl PaneState {
    pub fn new(root: Location) -> Self {
        Self {
            root,
            raw_entries: Vec::new(),
            entries: Vec::new(),
            cursor_index: 0,
            scroll_offset: 0,
            selection: HashSet::new(),
            sort_mode: SortMode::default(),
            filter_pattern: None,
            show_hidden: false,
            dirs_first: true,
            cursor_history: HashMap::new(),
        }
    }

    /// Re-list `root` through the storage router, then apply filter/sort
    /// and restore the cursor (spec §4.5's refresh algorithm).
    ///
    /// Cursor restoration order: exact history match for this path, else
    /// retain the index of the entry with the same name if present, else
    /// clamp to 0.
    pub fn refresh(&mut self, router: &Router) -> CoreResult<()> {
        let previously_focused_name = self.entries.get(self.cursor_index).map(|e| e.display_name.clone());

        self.raw_entries = router.list(&self.root)?;
        self.recompute_view();

        if let Some(memo) = self.cursor_history.get(&self.root) {
            if let Some(idx) = self.entries.iter().position(|e| Some(&e.display_name) == memo.selected_name.as_ref()) {
                self.cursor_index = idx;
                self.scroll_offset = memo.scroll_offset;
            } else {
                self.cursor_index = memo.cursor_index.min(self.entries.len().saturating_sub(1));
                self.scroll_offset = memo.scroll_offset;
            }
        } else if let Some(name) = previously_focused_name {
            self.cursor_index = self.entries.iter().position(|e| e.display_name == name).unwrap_or(0);
        } else {
            self.cursor_index = 0;
        }
        self.clamp_cursor();
        Ok(())
    }

    /// Recompute `entries` from `raw_entries` without re-listing — used by
    /// sort/filter/show-hidden toggles (spec §4.5).
    pub fn recompute_view(&mut self) {
        let pattern = self.filter_pattern.as_deref().map(|p| p.to_lowercase());
        self.entries = self
            .raw_entries
            .iter()
            .filter(|e| self.show_hidden || !e.is_hidden)
            .filter(|e| match &pattern {
                None => true,
                Some(p) => glob_match(p, &e.display_name.to_lowercase()),
            })
            .cloned()
            .collect();
        sort_entries(&mut self.entries, self.sort_mode, self.dirs_first);
        self.clamp_cursor();
    }

    pub fn clamp_cursor(&mut self) {
        if self.entries.is_empty() {
            self.cursor_index = 0;
            self.scroll_offset = 0;
        } else if self.cursor_index >= self.entries.len() {
            self.cursor_index = self.entries.len() - 1;
        }
    }

    /// Ensure the cursor row is within the visible window (spec §3 invariant).
    pub fn ensure_cursor_visible(&mut self, visible_rows: usize) {
        if visible_rows == 0 {
            return;
        }
        if self.cursor_index < self.scroll_offset {
            self.scroll_offset = self.cursor_index;
        } else if self.cursor_index >= self.scroll_offset + visible_rows {
            self.scroll_offset = self.cursor_index + 1 - visible_rows;
        }
    }

    pub fn current_entry(&self) -> Option<&Entry> {
        self.entries.get(self.cursor_index)
    }

    fn save_history(&mut self) {
        let memo = CursorMemo {
            cursor_index: self.cursor_index,
            scroll_offset: self.scroll_offset,
            selected_name: self.current_entry().map(|e| e.display_name.clone()),
        };
        self.cursor_history.insert(self.root.clone(), memo);
    }

    /// Navigate into a child directory, saving the current position into
    /// history keyed by the current path (spec §4.5).
    pub fn navigate_child(&mut self, name: &str, router: &Router) -> CoreResult<()> {
        self.save_history();
        self.root = self.root.join(name);
        self.selection.clear();
        self.refresh(router)
    }

    /// Navigate to the parent directory; the cursor lands on the entry
    /// named after the directory just left, falling back to history, then
    /// index 0 (spec §4.5).
    pub fn navigate_parent(&mut self, router: &Router) -> CoreResult<()> {
        let Some(parent) = self.root.parent() else {
            return Ok(());
        };
        let child_name = self.root.name();
        self.save_history();
        self.root = parent;
        self.selection.clear();
        self.raw_entries = router.list(&self.root)?;
        self.recompute_view();

        if let Some(idx) = self.entries.iter().position(|e| e.display_name == child_name) {
            self.cursor_index = idx;
        } else if let Some(memo) = self.cursor_history.get(&self.root) {
            self.cursor_index = memo.cursor_index.min(self.entries.len().saturating_sub(1));
            self.scroll_offset = memo.scroll_offset;
        } else {
            self.cursor_index = 0;
        }
        self.clamp_cursor();
        Ok(())
    }

    pub fn toggle_selection_at_cursor(&mut self) {
        if let Some(entry) = self.current_entry() {
            let loc = entry.location.clone();
            if !self.selection.remove(&loc) {
                self.selection.insert(loc);
            }
        }
    }

    pub fn select_all(&mut self) {
        self.selection = self.entries.iter().map(|e| e.location.clone()).collect();
    }

    pub fn deselect_all(&mut self) {
        self.selection.clear();
    }

    pub fn invert_selection(&mut self) {
        let all: HashSet<Location> = self.entries.iter().map(|e| e.location.clone()).collect();
        self.selection = all.difference(&self.selection).cloned().collect();
    }

    /// The set of entries an operation should act on: the explicit
    /// selection if non-empty, else just the entry under the cursor.
    pub fn active_targets(&self) -> Vec<Entry> {
        if self.selection.is_empty() {
            self.current_entry().cloned().into_iter().collect()
        } else {
            self.entries
                .iter()
                .filter(|e| self.selection.contains(&e.location))
                .cloned()
                .collect()
        }
    }
}

/// Minimal glob-ish matcher: `*` and `?` wildcards over a case-folded
/// haystack (spec §4.5's "glob pattern, case-insensitive").
fn glob_match(pattern: &str, haystack: &str) -> bool {
    if !pattern.contains(['*', '?']) {
        return haystack.contains(pattern);
    }
    glob_match_chars(pattern.as_bytes(), haystack.as_bytes())
}

fn glob_match_chars(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            glob_match_chars(&pattern[1..], text) || (!text.is_empty() && glob_match_chars(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match_chars(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if p == t => glob_match_chars(&pattern[1..], &text[1..]),
        (Some(_), None) => pattern.iter().all(|&b| b == b'*'),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entry::EntryKind;
    use std::path::PathBuf;

    fn make_entry(name: &str) -> Entry {
        Entry {
            location: Location::Local(PathBuf::from("/root").join(name)),
            display_name: name.to_string(),
            size: 0,
            mtime: None,
            kind: EntryKind::File,
            symlink_target: None,
            is_hidden: name.starts_with('.'),
        }
    }

    #[test]
    fn hidden_entries_excluded_by_default() {
        let mut pane = PaneState::new(Location::Local(PathBuf::from("/root")));
        pane.raw_entries = vec![make_entry(".hidden"), make_entry("visible")];
        pane.recompute_view();
        assert_eq!(pane.entries.len(), 1);
        assert_eq!(pane.entries[0].display_name, "visible");
    }

    #[test]
    fn empty_directory_has_zero_cursor() {
        let mut pane = PaneState::new(Location::Local(PathBuf::from("/root")));
        pane.raw_entries = vec![];
        pane.recompute_view();
        assert_eq!(pane.cursor_index, 0);
        assert_eq!(pane.scroll_offset, 0);
    }

    #[test]
    fn glob_filter_is_case_insensitive_substring() {
        let mut pane = PaneState::new(Location::Local(PathBuf::from("/root")));
        pane.raw_entries = vec![make_entry("Report.TXT"), make_entry("image.png")];
        pane.filter_pattern = Some("report".to_string());
        pane.recompute_view();
        assert_eq!(pane.entries.len(), 1);
        assert_eq!(pane.entries[0].display_name, "Report.TXT");
    }

    #[test]
    fn star_glob_matches_extension() {
        assert!(glob_match("*.txt", "report.txt"));
        assert!(!glob_match("*.txt", "report.png"));
    }
}
