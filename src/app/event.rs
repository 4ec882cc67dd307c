//! Event model and input pump (spec §4.2).
//!
//! The terminal backend (Crossterm) is polled on its own async task so the
//! main loop never blocks on `poll()`; events are forwarded over an
//! unbounded channel to the `tokio::select!` in `main` that drives
//! `UiLayerStack::handle_event`. Double-click detection happens here,
//! since it is the backend's job to decide whether two clicks close
//! enough in time and position count as one event (spec §4.2/§4.3).

use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEventKind, MouseButton as CtMouseButton, MouseEventKind as CtMouseEventKind};
use tokio::sync::mpsc;

pub use crossterm::event::{KeyCode, KeyModifiers};

/// `KeyEvent{key_code, modifiers, char?}` (spec §4.2).
#[derive(Debug, Clone, Copy)]
pub struct KeyPayload {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
    pub char: Option<char>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseKind {
    Down,
    Up,
    Move,
    Drag,
    Wheel(i8),
    DoubleClick,
}

/// `MouseEvent{row, col, kind, button, modifiers}` (spec §4.2).
#[derive(Debug, Clone, Copy)]
pub struct MousePayload {
    pub row: u16,
    pub col: u16,
    pub kind: MouseKind,
    pub button: Option<MouseButton>,
    pub modifiers: KeyModifiers,
}

/// `MenuEvent{item_id}` — only meaningful for a desktop backend with a
/// real menu bar; the terminal backend never emits one, but layers that
/// implement `handle_menu_event` stay exercised by the dispatch code.
#[derive(Debug, Clone)]
pub struct MenuPayload {
    pub item_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemKind {
    Resize(u16, u16),
    Close,
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    Key(KeyPayload),
    /// IME-composed text, committed character by character (spec §4.2,
    /// §8 scenario 6).
    Char(char),
    Mouse(MousePayload),
    Menu(MenuPayload),
    System(SystemKind),
    /// Not one of spec's event variants; drives the spinner/progress
    /// throttle and periodic redraw checks.
    Tick,
}

fn map_mouse_button(b: CtMouseButton) -> MouseButton {
    match b {
        CtMouseButton::Left => MouseButton::Left,
        CtMouseButton::Right => MouseButton::Right,
        CtMouseButton::Middle => MouseButton::Middle,
    }
}

/// Spawns the async input pump. `double_click_ms` comes from user
/// configuration (§6's persisted state).
pub fn spawn_event_reader(tick_rate: Duration, double_click_ms: u64) -> mpsc::UnboundedReceiver<AppEvent> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut last_left_down: Option<(Instant, u16, u16)> = None;
        let mut last_tick = Instant::now();

        loop {
            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));

            let has_event = event::poll(timeout).unwrap_or(false);

            if has_event {
                let ev = match event::read() {
                    Ok(ev) => ev,
                    Err(_) => continue,
                };
                match ev {
                    Event::Key(key) if key.kind == KeyEventKind::Press || key.kind == KeyEventKind::Repeat => {
                        let ch = match key.code {
                            KeyCode::Char(c) => Some(c),
                            _ => None,
                        };
                        let _ = tx.send(AppEvent::Key(KeyPayload {
                            code: key.code,
                            modifiers: key.modifiers,
                            char: ch,
                        }));
                    }
                    Event::Key(_) => {}
                    Event::Mouse(m) => {
                        let (kind, button) = match m.kind {
                            CtMouseEventKind::Down(b) => {
                                let mapped = map_mouse_button(b);
                                if mapped == MouseButton::Left {
                                    let now = Instant::now();
                                    let is_double = last_left_down
                                        .map(|(t, r, c)| {
                                            now.duration_since(t) <= Duration::from_millis(double_click_ms)
                                                && r == m.row
                                                && c == m.column
                                        })
                                        .unwrap_or(false);
                                    if is_double {
                                        last_left_down = None;
                                        (MouseKind::DoubleClick, Some(mapped))
                                    } else {
                                        last_left_down = Some((now, m.row, m.column));
                                        (MouseKind::Down, Some(mapped))
                                    }
                                } else {
                                    (MouseKind::Down, Some(mapped))
                                }
                            }
                            CtMouseEventKind::Up(b) => (MouseKind::Up, Some(map_mouse_button(b))),
                            CtMouseEventKind::Drag(b) => (MouseKind::Drag, Some(map_mouse_button(b))),
                            CtMouseEventKind::Moved => (MouseKind::Move, None),
                            CtMouseEventKind::ScrollDown => (MouseKind::Wheel(-1), None),
                            CtMouseEventKind::ScrollUp => (MouseKind::Wheel(1), None),
                            CtMouseEventKind::ScrollLeft => (MouseKind::Wheel(-1), None),
                            CtMouseEventKind::ScrollRight => (MouseKind::Wheel(1), None),
                        };
                        let _ = tx.send(AppEvent::Mouse(MousePayload {
                            row: m.row,
                            col: m.column,
                            kind,
                            button,
                            modifiers: m.modifiers,
                        }));
                    }
                    Event::Resize(cols, rows) => {
                        let _ = tx.send(AppEvent::System(SystemKind::Resize(rows, cols)));
                    }
                    Event::FocusGained | Event::FocusLost | Event::Paste(_) => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                if tx.send(AppEvent::Tick).is_err() {
                    break;
                }
                last_tick = Instant::now();
            }
        }
    });

    rx
}
