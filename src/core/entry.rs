//! The file entry type shared by every storage backend and pane.

use std::time::SystemTime;

use crate::storage::Location;

/// What kind of filesystem object an entry represents (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

/// A single row produced by a directory listing.
///
/// Lifecycle: created by a listing call, valid only until the owning pane's
/// next refresh — panes never hold an `Entry` across a `refresh()` call.
#[derive(Debug, Clone)]
pub struct Entry {
    pub location: Location,
    pub display_name: String,
    pub size: u64,
    pub mtime: Option<SystemTime>,
    pub kind: EntryKind,
    pub symlink_target: Option<String>,
    pub is_hidden: bool,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Dir)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, EntryKind::Symlink)
    }

    /// Lower-cased extension, used by sort-by-extension and grouping.
    pub fn extension(&self) -> Option<String> {
        self.display_name
            .rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext.to_lowercase())
    }

    /// Full location string, used for progress labels and log messages.
    pub fn display(&self) -> String {
        self.location.display()
    }
}
