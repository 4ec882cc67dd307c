//! UI / rendering layer — everything that touches Ratatui widgets.
//!
//! This layer takes the *core* data structures and turns them into pixels on
//! the terminal. No filesystem I/O happens here except opening a file to
//! view its contents, which goes through the storage router like anything
//! else.

pub mod batch_rename;
pub mod dialog;
pub mod diff_viewer;
pub mod layer;
pub mod layout;
pub mod renderer;
pub mod smooth_scroll;
pub mod spinner;
pub mod text;
pub mod text_viewer;
pub mod theme;
