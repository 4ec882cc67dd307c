//! Sort modes for the file-list engine (spec §4.5).

use std::cmp::Ordering;

use super::entry::Entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Size,
    Mtime,
    Extension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortMode {
    pub key: SortKey,
    pub descending: bool,
}

impl Default for SortMode {
    fn default() -> Self {
        Self {
            key: SortKey::Name,
            descending: false,
        }
    }
}

impl SortMode {
    pub fn cycle_key(self) -> Self {
        let key = match self.key {
            SortKey::Name => SortKey::Size,
            SortKey::Size => SortKey::Mtime,
            SortKey::Mtime => SortKey::Extension,
            SortKey::Extension => SortKey::Name,
        };
        Self { key, ..self }
    }

    pub fn toggle_direction(self) -> Self {
        Self {
            descending: !self.descending,
            ..self
        }
    }

    pub fn label(self) -> &'static str {
        match (self.key, self.descending) {
            (SortKey::Name, false) => "Name ▲",
            (SortKey::Name, true) => "Name ▼",
            (SortKey::Size, false) => "Size ▲",
            (SortKey::Size, true) => "Size ▼",
            (SortKey::Mtime, false) => "Date ▲",
            (SortKey::Mtime, true) => "Date ▼",
            (SortKey::Extension, false) => "Ext ▲",
            (SortKey::Extension, true) => "Ext ▼",
        }
    }
}

fn compare_key(a: &Entry, b: &Entry, key: SortKey) -> Ordering {
    match key {
        SortKey::Name => a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()),
        SortKey::Size => a.size.cmp(&b.size),
        SortKey::Mtime => a.mtime.cmp(&b.mtime),
        SortKey::Extension => a
            .extension()
            .unwrap_or_default()
            .cmp(&b.extension().unwrap_or_default())
            .then_with(|| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase())),
    }
}

/// Sorts `entries` in place per `mode`, applying the directories-first
/// policy when `dirs_first` is set (spec §4.5).
pub fn sort_entries(entries: &mut [Entry], mode: SortMode, dirs_first: bool) {
    entries.sort_by(|a, b| {
        if dirs_first {
            let da = a.is_dir();
            let db = b.is_dir();
            if da != db {
                return if da { Ordering::Less } else { Ordering::Greater };
            }
        }
        let ord = compare_key(a, b, mode.key);
        if mode.descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entry::EntryKind;
    use crate::storage::Location;
    use std::path::PathBuf;

    fn entry(name: &str, size: u64, is_dir: bool) -> Entry {
        Entry {
            location: Location::Local(PathBuf::from(name)),
            display_name: name.to_string(),
            size,
            mtime: None,
            kind: if is_dir { EntryKind::Dir } else { EntryKind::File },
            symlink_target: None,
            is_hidden: false,
        }
    }

    #[test]
    fn dirs_first_beats_sort_key() {
        let mut entries = vec![entry("zzz_dir", 0, true), entry("aaa_file", 100, false)];
        sort_entries(&mut entries, SortMode { key: SortKey::Name, descending: false }, true);
        assert_eq!(entries[0].display_name, "zzz_dir");
    }

    #[test]
    fn size_descending() {
        let mut entries = vec![entry("a", 1, false), entry("b", 100, false), entry("c", 50, false)];
        sort_entries(&mut entries, SortMode { key: SortKey::Size, descending: true }, false);
        assert_eq!(entries.iter().map(|e| e.size).collect::<Vec<_>>(), vec![100, 50, 1]);
    }
}
