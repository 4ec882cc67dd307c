//! Batch rename dialog (spec §4.6): a pattern editor with a live preview
//! over a fixed set of entries, reusing the same result-bridge pattern as
//! the other dialogs in [`crate::ui::dialog`].

use std::sync::{Arc, Mutex};

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, Paragraph};

use crate::app::event::{KeyCode, KeyPayload};
use crate::core::entry::Entry;
use crate::storage::Location;
use crate::ui::dialog::centered_fixed;
use crate::ui::layer::UiLayer;
use crate::ui::text::{display_width, grapheme_byte_offset, grapheme_count};
use crate::ui::theme::Theme;

fn split_stem_ext(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (name, ""),
    }
}

fn apply_pattern(pattern: &str, name: &str, n: usize) -> String {
    let (stem, ext) = split_stem_ext(name);
    let dotted_ext = if ext.is_empty() { String::new() } else { format!(".{ext}") };
    pattern
        .replace("{name}", stem)
        .replace("{ext}", &dotted_ext)
        .replace("{n}", &n.to_string())
}

pub struct BatchRenameDialog {
    entries: Vec<Entry>,
    pattern: String,
    cursor: usize,
    result: Arc<Mutex<Option<Option<Vec<(Location, String)>>>>>,
    closed: bool,
    dirty: bool,
}

impl BatchRenameDialog {
    pub fn new(entries: Vec<Entry>) -> (Self, Arc<Mutex<Option<Option<Vec<(Location, String)>>>>>) {
        let result = Arc::new(Mutex::new(None));
        let pattern = "{name}{ext}".to_string();
        let cursor = grapheme_count(&pattern);
        (
            Self {
                entries,
                pattern,
                cursor,
                result: Arc::clone(&result),
                closed: false,
                dirty: true,
            },
            result,
        )
    }

    fn preview(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.display_name.clone(), apply_pattern(&self.pattern, &e.display_name, i + 1)))
            .collect()
    }

    fn confirm(&mut self) {
        let plan = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.location.clone(), apply_pattern(&self.pattern, &e.display_name, i + 1)))
            .collect();
        *self.result.lock().unwrap() = Some(Some(plan));
        self.closed = true;
        self.dirty = true;
    }

    fn cancel(&mut self) {
        *self.result.lock().unwrap() = Some(None);
        self.closed = true;
        self.dirty = true;
    }
}

impl UiLayer for BatchRenameDialog {
    fn handle_key_event(&mut self, event: KeyPayload) -> bool {
        match event.code {
            KeyCode::Enter => self.confirm(),
            KeyCode::Esc => self.cancel(),
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    let start = grapheme_byte_offset(&self.pattern, self.cursor - 1);
                    let end = grapheme_byte_offset(&self.pattern, self.cursor);
                    self.pattern.replace_range(start..end, "");
                    self.cursor -= 1;
                }
            }
            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => self.cursor = (self.cursor + 1).min(grapheme_count(&self.pattern)),
            KeyCode::Char(c) => {
                let byte_idx = grapheme_byte_offset(&self.pattern, self.cursor);
                self.pattern.insert(byte_idx, c);
                self.cursor += 1;
            }
            _ => return false,
        }
        self.dirty = true;
        true
    }

    fn draw(&mut self, frame: &mut Frame, region: Rect) {
        let area = centered_fixed(70, (region.height.saturating_sub(4)).min(24).max(10), region);
        let block = Block::default()
            .title(" Batch Rename — {name} {ext} {n} ")
            .title_style(Theme::title_style())
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Theme::border_style());
        let inner = block.inner(area);
        frame.render_widget(Clear, area);
        frame.render_widget(block, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(1)])
            .split(inner);

        let pattern_line = Paragraph::new(self.pattern.as_str()).style(Theme::command_input_style());
        frame.render_widget(pattern_line, chunks[0]);
        let cursor_col = display_width(&self.pattern[..grapheme_byte_offset(&self.pattern, self.cursor)]) as u16;
        frame.set_cursor_position((chunks[0].x + cursor_col, chunks[0].y));

        let items: Vec<ListItem> = self
            .preview()
            .into_iter()
            .map(|(old, new)| {
                let style = if old == new { Style::default() } else { Style::default().fg(Color::Yellow) };
                ListItem::new(Line::from(Span::styled(format!("{old} -> {new}"), style)))
            })
            .collect();
        frame.render_widget(List::new(items), chunks[1]);
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

    #[test]
    fn pattern_substitutes_name_ext_and_index() {
        assert_eq!(apply_pattern("{name}_{n}{ext}", "photo.jpg", 3), "photo_3.jpg");
    }

    #[test]
    fn names_without_extension_keep_empty_ext_token() {
        assert_eq!(apply_pattern("{name}{ext}", "README", 1), "README");
    }
}
