//! Renderer contract (spec §4.1).
//!
//! The core never constructs a backend directly — `main` wires one
//! concrete [`Renderer`] in and everything above this module only talks
//! to the trait. The terminal backend here is the only implementation
//! this crate ships; a desktop backend (GPU cell renderer, window
//! geometry) is a documented extension point that never needs to exist
//! for the core to compile and run.
//!
//! Ratatui's own `Buffer`/`Cell` already is the row-major, per-cell
//! `(symbol, style, skip)` grid spec §3 describes, so the terminal
//! backend draws through `ratatui::Frame` rather than reinventing a
//! `set_cell`/`draw_text` API on top of it.

use std::io::{self, Stderr};

use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::Frame;

/// The minimum surface a rendering backend must provide. `initialize`
/// acquires the device; idempotent failure there is fatal (spec §4.1).
/// `shutdown` must run on every exit path, including panics during
/// drawing — callers pair it with a scope guard rather than relying on
/// the happy path alone.
pub trait Renderer {
    fn initialize(&mut self) -> anyhow::Result<()>;
    fn shutdown(&mut self) -> anyhow::Result<()>;
    fn dimensions(&self) -> anyhow::Result<(u16, u16)>;

    /// Draw one frame; `draw_fn` receives a mutable [`Frame`] to paint
    /// into, matching how every layer in this crate renders.
    fn draw(&mut self, draw_fn: &mut dyn FnMut(&mut Frame)) -> anyhow::Result<()>;

    fn set_cursor_visible(&mut self, visible: bool) -> anyhow::Result<()>;

    /// Optional capability (spec §4.1): backends that lack clipboard access
    /// return `false`/`None`, which callers treat as `BackendUnavailable`
    /// rather than an error (spec §7).
    fn set_clipboard_text(&mut self, _text: &str) -> bool {
        false
    }

    fn get_clipboard_text(&mut self) -> Option<String> {
        None
    }
}

/// Crossterm + Ratatui terminal backend, writing to stderr so stdout stays
/// free for the shell-integration cd-target payload (§ shell::integration).
pub struct TerminalRenderer {
    terminal: Option<Terminal<CrosstermBackend<Stderr>>>,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self { terminal: None }
    }
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for TerminalRenderer {
    fn initialize(&mut self) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let mut stderr = io::stderr();
        execute!(stderr, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(io::stderr());
        self.terminal = Some(Terminal::new(backend)?);
        Ok(())
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        disable_raw_mode()?;
        execute!(io::stderr(), LeaveAlternateScreen, DisableMouseCapture)?;
        if let Some(terminal) = self.terminal.as_mut() {
            terminal.show_cursor()?;
        }
        self.terminal = None;
        Ok(())
    }

    fn dimensions(&self) -> anyhow::Result<(u16, u16)> {
        let size = self
            .terminal
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("renderer not initialized"))?
            .size()?;
        Ok((size.height, size.width))
    }

    fn draw(&mut self, draw_fn: &mut dyn FnMut(&mut Frame)) -> anyhow::Result<()> {
        let terminal = self
            .terminal
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("renderer not initialized"))?;
        terminal.draw(|frame| draw_fn(frame))?;
        Ok(())
    }

    fn set_cursor_visible(&mut self, visible: bool) -> anyhow::Result<()> {
        let terminal = self
            .terminal
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("renderer not initialized"))?;
        if visible {
            terminal.show_cursor()?;
        } else {
            terminal.hide_cursor()?;
        }
        Ok(())
    }

    /// Shells out to an OS clip tool (spec §4.1's optional capability) —
    /// the terminal device itself has no clipboard of its own.
    fn set_clipboard_text(&mut self, text: &str) -> bool {
        crate::shell::integration::copy_text_to_clipboard(text)
    }
}
