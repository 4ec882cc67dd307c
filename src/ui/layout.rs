//! Layout helpers — split the terminal area into the main screen's regions
//! (spec §4.5): a header row, two side-by-side list panes, an optional log
//! pane and a status bar.

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// The main screen's region split for one frame.
pub struct AppLayout {
    pub header: Rect,
    pub left_pane: Rect,
    pub right_pane: Rect,
    pub log_pane: Option<Rect>,
    pub status_bar: Rect,
}

impl AppLayout {
    /// `log_fraction` is the share of the body given to the log pane when
    /// it's visible, as a percentage (spec §6's persisted layout setting).
    /// `pane_split` is the left pane's share of the two side-by-side list
    /// panes, also as a percentage.
    pub fn from_area(area: Rect, log_visible: bool, log_fraction: u16, pane_split: u16) -> Self {
        let log_fraction = log_fraction.clamp(10, 60);
        let pane_split = pane_split.clamp(20, 80);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(3), Constraint::Length(1)])
            .split(area);

        let header = rows[0];
        let status_bar = rows[2];
        let body = rows[1];

        let (panes_area, log_pane) = if log_visible {
            let split = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(100 - log_fraction), Constraint::Percentage(log_fraction)])
                .split(body);
            (split[0], Some(split[1]))
        } else {
            (body, None)
        };

        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(pane_split), Constraint::Percentage(100 - pane_split)])
            .split(panes_area);

        Self {
            header,
            left_pane: panes[0],
            right_pane: panes[1],
            log_pane,
            status_bar,
        }
    }
}
