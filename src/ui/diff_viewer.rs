//! Directory diff viewer (spec §4.7): the UI half of [`crate::core::diff`].
//! Owns the [`DiffTree`] and the running [`DiffSession`], drains its
//! channel once per tick, and renders the visible rows as an indented,
//! colour-coded tree.

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph};

use crate::app::event::{KeyCode, KeyPayload};
use crate::core::diff::{Comparison, DiffSession, DiffTree, DiffUpdate, NodeId, ScanPriority};
use crate::storage::{Location, Router};
use crate::ui::layer::UiLayer;
use crate::ui::theme::Theme;

fn comparison_style(c: Comparison) -> Style {
    match c {
        Comparison::Identical => Style::default().fg(Color::DarkGray),
        Comparison::Different => Style::default().fg(Color::Yellow),
        Comparison::LeftOnly => Style::default().fg(Color::Red),
        Comparison::RightOnly => Style::default().fg(Color::Green),
        Comparison::Pending => Style::default().fg(Color::Gray),
        Comparison::Error => Style::default().fg(Color::Magenta),
    }
}

fn comparison_glyph(c: Comparison) -> &'static str {
    match c {
        Comparison::Identical => "=",
        Comparison::Different => "<>",
        Comparison::LeftOnly => "<",
        Comparison::RightOnly => ">",
        Comparison::Pending => "?",
        Comparison::Error => "!",
    }
}

pub struct DirectoryDiffViewer {
    router: Arc<Router>,
    tree: DiffTree,
    session: DiffSession,
    rx: Receiver<(u64, DiffUpdate)>,
    generation: u64,
    cursor: usize,
    visible: Vec<NodeId>,
    hide_identical: bool,
    closed: bool,
    dirty: bool,
}

impl DirectoryDiffViewer {
    pub fn new(router: Arc<Router>, left_root: Location, right_root: Location) -> Self {
        let mut tree = DiffTree::new(left_root.clone(), right_root.clone());
        let (tx, rx) = std::sync::mpsc::channel();
        let generation = 0;
        let session = DiffSession::start(generation, Arc::clone(&router), tree.root, left_root, right_root, tx);
        let visible = tree.visible_nodes();
        Self {
            router,
            tree,
            session,
            rx,
            generation,
            cursor: 0,
            visible,
            hide_identical: false,
            closed: false,
            dirty: true,
        }
    }

    fn refresh_visible(&mut self) {
        self.visible = self.tree.visible_nodes();
        if self.hide_identical {
            self.visible.retain(|&id| id == self.tree.root || self.tree.get(id).comparison != Comparison::Identical);
        }
        self.cursor = self.cursor.min(self.visible.len().saturating_sub(1));
    }

    fn drain_updates(&mut self) {
        let mut touched_any = false;
        while let Ok((gen, update)) = self.rx.try_recv() {
            if gen != self.generation {
                continue;
            }
            touched_any = true;
            match update {
                DiffUpdate::Scanned { node, children } => {
                    for (name, left, right, is_dir) in children {
                        let child_id = self.tree.add_child(node, name, left.clone(), right.clone(), is_dir);
                        if is_dir {
                            self.session.enqueue_scan(child_id, left, right, ScanPriority::Medium);
                        } else if let (Some(l), Some(r)) = (left, right) {
                            self.session.enqueue_compare(child_id, l, r, ScanPriority::Medium);
                        }
                    }
                    self.tree.get_mut(node).scanned = true;
                    self.tree.rollup_from(node);
                }
                DiffUpdate::Compared { node, comparison } => {
                    self.tree.get_mut(node).comparison = comparison;
                    self.tree.rollup_from(node);
                }
                DiffUpdate::WorkerDone => {}
            }
        }
        if touched_any {
            self.refresh_visible();
            self.dirty = true;
        }
    }

    /// DFS order next/previous node whose comparison isn't IDENTICAL or
    /// PENDING (spec §4.7's "jump to next difference").
    fn jump_to_difference(&mut self, forward: bool) {
        if self.visible.is_empty() {
            return;
        }
        let n = self.visible.len();
        let is_diff = |c: Comparison| matches!(c, Comparison::Different | Comparison::LeftOnly | Comparison::RightOnly | Comparison::Error);
        for step in 1..=n {
            let idx = if forward {
                (self.cursor + step) % n
            } else {
                (self.cursor + n - step) % n
            };
            if is_diff(self.tree.get(self.visible[idx]).comparison) {
                self.cursor = idx;
                self.dirty = true;
                return;
            }
        }
    }
}

impl UiLayer for DirectoryDiffViewer {
    fn handle_key_event(&mut self, event: KeyPayload) -> bool {
        match event.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.session.cancel();
                self.closed = true;
            }
            KeyCode::Up => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Down => self.cursor = (self.cursor + 1).min(self.visible.len().saturating_sub(1)),
            KeyCode::Enter | KeyCode::Right | KeyCode::Left => {
                if let Some(&id) = self.visible.get(self.cursor) {
                    let was_expanded = self.tree.get(id).expanded;
                    self.tree.toggle_expand(id);
                    if !was_expanded {
                        if !self.tree.get(id).scanned {
                            let node = self.tree.get(id);
                            self.session.prioritize(id, node.left.clone(), node.right.clone());
                        }
                        // Spec §4.7: expanding reprioritizes the whole subtree, not
                        // just this node — descendant scan/compare jobs the
                        // background sweep already queued jump ahead too.
                        let subtree = self.tree.subtree_ids(id);
                        self.session.prioritize_subtree(&subtree);
                    }
                    self.refresh_visible();
                }
            }
            KeyCode::Char('n') => self.jump_to_difference(true),
            KeyCode::Char('p') => self.jump_to_difference(false),
            KeyCode::Char('a') => {
                self.hide_identical = !self.hide_identical;
                self.refresh_visible();
            }
            _ => return false,
        }
        self.dirty = true;
        true
    }

    fn on_tick(&mut self) {
        self.drain_updates();
    }

    fn draw(&mut self, frame: &mut Frame, region: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(1)])
            .split(region);

        let header = Paragraph::new(Line::from(Span::styled(
            format!(
                " Diff: {}  vs  {}   [{}] next [{}] prev [A] hide-identical",
                self.tree.get(self.tree.root).left.as_ref().map(|l| l.display()).unwrap_or_default(),
                self.tree.get(self.tree.root).right.as_ref().map(|r| r.display()).unwrap_or_default(),
                "n",
                "p",
            ),
            Theme::title_style(),
        )));
        frame.render_widget(header, chunks[0]);

        let block = Block::default().borders(Borders::ALL).border_type(BorderType::Plain).border_style(Theme::border_style());
        let inner = block.inner(chunks[1]);
        frame.render_widget(block, chunks[1]);

        let height = inner.height as usize;
        let start = self.cursor.saturating_sub(height.saturating_sub(1));
        let lines: Vec<Line> = self
            .visible
            .iter()
            .enumerate()
            .skip(start)
            .take(height)
            .map(|(i, &id)| {
                let node = self.tree.get(id);
                let indent = "  ".repeat(node.depth);
                let marker = if node.is_dir { if node.expanded { "v" } else { ">" } } else { " " };
                let text = format!("{indent}{marker} [{}] {}", comparison_glyph(node.comparison), node.name);
                let mut style = comparison_style(node.comparison);
                if i == self.cursor {
                    style = style.patch(Theme::selected_style());
                }
                Line::from(Span::styled(text, style))
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), inner);
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
