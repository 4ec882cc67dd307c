//! Plain-text file viewer (spec §4.6): tabs expanded to a fixed column
//! width, vertical scroll, and display-column-indexed horizontal scroll.

use std::io::Read;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph};
use unicode_width::UnicodeWidthChar;

use crate::app::event::{KeyCode, KeyPayload};
use crate::core::error::{CoreError, CoreResult};
use crate::storage::{Location, Router};
use crate::ui::layer::UiLayer;
use crate::ui::text::normalize_nfc;
use crate::ui::theme::Theme;

const TAB_WIDTH: usize = 4;

/// Expands tabs to the next `TAB_WIDTH` column boundary. UTF-8 decoding
/// falls back to a lossy conversion (spec §4.6's "best-effort text"
/// contract — this viewer never claims to understand binary formats).
fn expand_tabs(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| {
            let line = normalize_nfc(line);
            let mut out = String::with_capacity(line.len());
            let mut col = 0usize;
            for ch in line.chars() {
                if ch == '\t' {
                    let pad = TAB_WIDTH - (col % TAB_WIDTH);
                    out.extend(std::iter::repeat(' ').take(pad));
                    col += pad;
                } else {
                    out.push(ch);
                    col += ch.width().unwrap_or(1);
                }
            }
            out
        })
        .collect()
}

/// Returns the suffix of `line` starting at display column `left_col`
/// (spec §4.6/§8 invariant 9: horizontal scroll is measured in display
/// columns). Walks forward accumulating width and stops at the character
/// whose column *position* reaches `left_col` — tracking the character's
/// index in the line, never searching for which character occupies that
/// column by value, so a scroll offset landing inside a run of repeated
/// characters still lands on the correct one (spec §8 scenario 5).
fn visible_from_column(line: &str, left_col: usize) -> &str {
    let mut col = 0usize;
    for (byte_idx, ch) in line.char_indices() {
        if col >= left_col {
            return &line[byte_idx..];
        }
        col += ch.width().unwrap_or(1);
    }
    ""
}

pub struct TextViewer {
    title: String,
    lines: Vec<String>,
    top: usize,
    left: usize,
    last_height: usize,
    closed: bool,
    dirty: bool,
}

impl TextViewer {
    pub fn load(router: &Router, location: &Location) -> CoreResult<Self> {
        let mut reader = router.open_read(location)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).map_err(CoreError::Io)?;
        let text = String::from_utf8(buf.clone()).unwrap_or_else(|_| String::from_utf8_lossy(&buf).into_owned());
        Ok(Self {
            title: location.name(),
            lines: expand_tabs(&text),
            top: 0,
            left: 0,
            last_height: 0,
            closed: false,
            dirty: true,
        })
    }

    fn max_top(&self) -> usize {
        self.lines.len().saturating_sub(self.last_height.max(1))
    }
}

impl UiLayer for TextViewer {
    fn handle_key_event(&mut self, event: KeyPayload) -> bool {
        let page = self.last_height.max(1);
        match event.code {
            KeyCode::Esc | KeyCode::Char('q') => self.closed = true,
            KeyCode::Up => self.top = self.top.saturating_sub(1),
            KeyCode::Down => self.top = (self.top + 1).min(self.max_top()),
            KeyCode::PageUp => self.top = self.top.saturating_sub(page),
            KeyCode::PageDown => self.top = (self.top + page).min(self.max_top()),
            KeyCode::Home => self.top = 0,
            KeyCode::End => self.top = self.max_top(),
            KeyCode::Left => self.left = self.left.saturating_sub(4),
            KeyCode::Right => self.left += 4,
            _ => return false,
        }
        self.dirty = true;
        true
    }

    fn draw(&mut self, frame: &mut Frame, region: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(1)])
            .split(region);

        let header = Paragraph::new(Line::from(Span::styled(
            format!(" {} — line {}/{}", self.title, self.top + 1, self.lines.len().max(1)),
            Theme::title_style(),
        )));
        frame.render_widget(header, chunks[0]);

        let block = Block::default().borders(Borders::ALL).border_type(BorderType::Plain).border_style(Theme::border_style());
        let inner = block.inner(chunks[1]);
        frame.render_widget(block, chunks[1]);
        self.last_height = inner.height as usize;

        let body: Vec<Line> = self
            .lines
            .iter()
            .skip(self.top)
            .take(inner.height as usize)
            .map(|line| Line::from(visible_from_column(line, self.left).to_string()))
            .collect();
        frame.render_widget(Paragraph::new(body), inner);
    }

    fn is_full_screen(&self) -> bool {
        true
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
    fn tabs_expand_to_next_boundary() {
        let lines = expand_tabs("a\tb");
        assert_eq!(lines[0], "a   b");
    }

    #[test]
    fn multiple_lines_split_on_newline() {
        let lines = expand_tabs("one\ntwo");
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }

    /// Spec §8 scenario 5: scrolling 37 columns into 8 repeats of
    /// `0123456789` must land on the character at index 37 (`7`), not on
    /// the first occurrence of `7` at index 7.
    #[test]
    fn horizontal_scroll_lands_on_column_index_not_first_occurrence() {
        let line: String = "0123456789".repeat(8);
        let visible = visible_from_column(&line, 37);
        assert_eq!(visible.chars().next(), Some('7'));
        assert_eq!(visible, &line[37..]);
    }

    #[test]
    fn wide_characters_consume_two_columns_when_scrolling() {
        let line = "中123";
        assert_eq!(visible_from_column(line, 0), "中123");
        assert_eq!(visible_from_column(line, 2), "123");
        assert_eq!(visible_from_column(line, 1), "123");
    }
}
