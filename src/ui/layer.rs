//! UI layer stack (spec §4.3).
//!
//! A z-ordered stack of interactive layers with exactly one permanent
//! bottom (the main screen). `handle_event` forwards only to the top
//! layer; lower layers are dormant until popped back to the top.

use ratatui::Frame;
use ratatui::layout::Rect;

use crate::app::event::{AppEvent, KeyPayload, MenuPayload, MousePayload, SystemKind};

/// Capability set every pushable layer satisfies (spec §3's "UI layer").
///
/// Implemented as a trait object (dynamic dispatch) per spec §9's "duck-
/// typed polymorphism → capability set" note — either a vtable or a
/// tagged enum is acceptable; trait objects are the idiomatic Rust choice
/// when the stack must hold heterogeneous concrete types uniformly.
pub trait UiLayer {
    /// Returns `true` if the event was consumed (spec §4.2's consumed
    /// semantics) and no further processing — e.g. IME fallback — should
    /// occur.
    fn handle_key_event(&mut self, _event: KeyPayload) -> bool {
        false
    }

    fn handle_char_event(&mut self, _ch: char) -> bool {
        false
    }

    fn handle_mouse_event(&mut self, _event: MousePayload) -> bool {
        false
    }

    fn handle_menu_event(&mut self, _event: MenuPayload) -> bool {
        false
    }

    fn handle_system_event(&mut self, _event: SystemKind) -> bool {
        false
    }

    fn draw(&mut self, frame: &mut Frame, region: Rect);

    /// A full-screen layer covers the entire grid; layers below it are
    /// skipped during the render pass (spec §4.3's redraw gating).
    fn is_full_screen(&self) -> bool {
        false
    }

    fn needs_redraw(&self) -> bool;
    fn mark_dirty(&mut self);
    fn clear_dirty(&mut self);

    /// When true, the stack pops this layer after the current event.
    fn should_close(&self) -> bool {
        false
    }

    fn on_activate(&mut self) {}
    fn on_deactivate(&mut self) {}

    /// Runs on every layer, top to bottom, on every tick — unlike the
    /// other handlers this isn't gated on being the top layer, since a
    /// background task (e.g. a copy in progress) must keep polling even
    /// while a dialog sits above the main screen (spec §5).
    fn on_tick(&mut self) {}

    /// A layer this one wants pushed above it — e.g. the main screen
    /// reacting to a `TaskPoll::ShowConflict` by requesting a choice
    /// dialog. Checked after every event and every tick (spec §9's
    /// "callback-based recursion": the next iteration pushes the dialog
    /// rather than the task recursing on the call stack).
    fn take_pending_layer(&mut self) -> Option<Box<dyn UiLayer>> {
        None
    }

    /// Only meaningful on the permanent bottom layer: `true` once the user
    /// has asked to quit (spec §4.2's CLOSE handling).
    fn wants_quit(&self) -> bool {
        false
    }

    /// Spec §4.2: "A small set of global shortcuts (quit confirmation,
    /// font-size change in desktop mode) are intercepted first, before the
    /// layer stack." Checked against every key event regardless of which
    /// layer is on top. Only the permanent bottom layer (the main screen,
    /// which owns the key-binding config) overrides this; every other
    /// layer keeps the default no-op. Returns `true` if the event matched
    /// a global shortcut and has been handled (typically by queuing a
    /// layer push through [`UiLayer::take_pending_layer`] rather than
    /// mutating the stack directly).
    fn try_global_shortcut(&mut self, _event: &KeyPayload) -> bool {
        false
    }

    /// The directory to `cd` into on exit, if the user confirmed one
    /// (spec §6's shell-integration cd-target).
    fn quit_payload(&self) -> Option<String> {
        None
    }
}

/// Dispatches one event to the top layer, then drains any layers whose
/// `should_close` became true (spec §4.3's "repeat until stable").
pub struct LayerStack {
    layers: Vec<Box<dyn UiLayer>>,
}

impl LayerStack {
    /// `bottom` becomes the permanent, never-popped layer.
    pub fn new(bottom: Box<dyn UiLayer>) -> Self {
        let mut stack = Self { layers: vec![bottom] };
        stack.layers[0].on_activate();
        stack
    }

    pub fn push(&mut self, layer: Box<dyn UiLayer>) {
        if let Some(prev) = self.layers.last_mut() {
            prev.on_deactivate();
        }
        self.layers.push(layer);
        self.layers.last_mut().unwrap().on_activate();
    }

    /// Pops the top layer, unless it is the permanent bottom.
    pub fn pop(&mut self) {
        if self.layers.len() <= 1 {
            return;
        }
        let mut popped = self.layers.pop().unwrap();
        popped.on_deactivate();
        if let Some(new_top) = self.layers.last_mut() {
            new_top.on_activate();
        }
    }

    pub fn top(&self) -> &dyn UiLayer {
        self.layers.last().unwrap().as_ref()
    }

    pub fn top_mut(&mut self) -> &mut dyn UiLayer {
        self.layers.last_mut().unwrap().as_mut()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Forwards `event` to the top layer only, then drains closed layers.
    /// Returns whether the event was consumed.
    pub fn handle_event(&mut self, event: &AppEvent) -> bool {
        let consumed = if matches!(event, AppEvent::Tick) {
            for layer in &mut self.layers {
                layer.on_tick();
            }
            false
        } else {
            let top = self.top_mut();
            match event {
                AppEvent::Key(k) => top.handle_key_event(*k),
                AppEvent::Char(c) => top.handle_char_event(*c),
                AppEvent::Mouse(m) => top.handle_mouse_event(*m),
                AppEvent::Menu(m) => top.handle_menu_event(m.clone()),
                AppEvent::System(s) => top.handle_system_event(*s),
                AppEvent::Tick => unreachable!(),
            }
        };
        self.drain_closed();
        self.drain_pending();
        consumed
    }

    fn drain_closed(&mut self) {
        while self.layers.len() > 1 && self.top().should_close() {
            self.pop();
        }
    }

    /// Pulls at most one pending layer per call, searching top to bottom —
    /// a dialog or the main screen below it may both have something
    /// queued, but only one push happens per event (the next call drains
    /// the rest).
    fn drain_pending(&mut self) {
        let pending = self.layers.iter_mut().rev().find_map(|l| l.take_pending_layer());
        if let Some(layer) = pending {
            self.push(layer);
        }
    }

    /// Render pass: finds the deepest full-screen layer at-or-below the
    /// top, skips everything below it, and redraws from there upward only
    /// if something in that range is dirty (spec §4.3's redraw gating).
    pub fn render(&mut self, frame: &mut Frame, region: Rect) {
        let top_index = self.layers.len() - 1;
        let mut start = 0;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.is_full_screen() {
                start = i;
            }
        }
        let any_dirty = self.layers[start..=top_index].iter().any(|l| l.needs_redraw());
        if !any_dirty {
            return;
        }
        for layer in &mut self.layers[start..=top_index] {
            layer.draw(frame, region);
            layer.clear_dirty();
        }
    }

    pub fn mark_all_dirty(&mut self) {
        for layer in &mut self.layers {
            layer.mark_dirty();
        }
    }

    /// The permanent bottom layer is the only one that can request quit.
    pub fn wants_quit(&self) -> bool {
        self.layers[0].wants_quit()
    }

    pub fn quit_payload(&self) -> Option<String> {
        self.layers[0].quit_payload()
    }

    /// Spec §4.2's global-shortcut interception: checked against the
    /// permanent bottom layer *before* the event is routed to the top
    /// layer, so a shortcut like quit-confirmation fires even while a
    /// dialog sits above the main screen. Drains any layer the bottom
    /// layer queued as a result (e.g. the quit-confirmation dialog).
    pub fn handle_global_shortcut(&mut self, event: &KeyPayload) -> bool {
        let consumed = self.layers[0].try_global_shortcut(event);
        if consumed {
            self.drain_pending();
        }
        consumed
    }
}
