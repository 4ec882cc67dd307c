//! Grouping — collapse many similar entries into a summary line.
//!
//! When a directory contains 40 `.png` files you don't need to see all of
//! them individually. This is an opt-in display transform over a pane's
//! already-sorted/filtered entry list (§4.5); it never changes what's on
//! disk or what `PaneState::entries` holds, only what the pane renders.

use std::collections::HashMap;

use super::entry::Entry;

/// How a run of entries should be presented.
#[derive(Debug, Clone)]
pub enum GroupedEntry<'a> {
    /// Show the entry as-is (a single file or directory).
    Single(&'a Entry),
    /// A collapsed group: "12 .png files (340 KiB)".
    Group {
        /// Representative label, e.g. `"*.png"`.
        label: String,
        count: usize,
        total_size: u64,
        members: Vec<&'a Entry>,
    },
}

#[derive(Debug, Clone)]
pub struct GroupingConfig {
    /// Minimum number of files sharing an extension before they collapse
    /// into a group.
    pub min_group_size: usize,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self { min_group_size: 5 }
    }
}

/// Group a pane's visible entries. Directories are always shown
/// individually; files are bucketed by extension and buckets at or above
/// `min_group_size` collapse into a [`GroupedEntry::Group`].
pub fn group_entries<'a>(entries: &'a [Entry], config: &GroupingConfig) -> Vec<GroupedEntry<'a>> {
    let mut result: Vec<GroupedEntry<'a>> = Vec::new();
    let mut ext_buckets: HashMap<Option<String>, Vec<&'a Entry>> = HashMap::new();

    for entry in entries {
        if entry.is_dir() {
            result.push(GroupedEntry::Single(entry));
        } else {
            ext_buckets
                .entry(entry.extension().map(str::to_string))
                .or_default()
                .push(entry);
        }
    }

    let mut ext_keys: Vec<_> = ext_buckets.keys().cloned().collect();
    ext_keys.sort_by(|a, b| a.as_deref().unwrap_or("").cmp(b.as_deref().unwrap_or("")));

    for ext in ext_keys {
        let members = ext_buckets.remove(&ext).unwrap();
        if members.len() >= config.min_group_size {
            let total_size: u64 = members.iter().map(|e| e.size).sum();
            let label = match &ext {
                Some(e) => format!("*.{e}"),
                None => "(no extension)".to_string(),
            };
            result.push(GroupedEntry::Group {
                label,
                count: members.len(),
                total_size,
                members,
            });
        } else {
            for entry in members {
                result.push(GroupedEntry::Single(entry));
            }
        }
    }

    result
}

/// Human-readable size string.
pub fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    for &unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PiB")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entry::EntryKind;
    use crate::storage::Location;

    fn file(name: &str, size: u64) -> Entry {
        Entry {
            location: Location::Local(format!("/d/{name}").into()),
            display_name: name.to_string(),
            size,
            mtime: None,
            kind: EntryKind::File,
            symlink_target: None,
            is_hidden: false,
        }
    }

    fn dir(name: &str) -> Entry {
        Entry {
            location: Location::Local(format!("/d/{name}").into()),
            display_name: name.to_string(),
            size: 0,
            mtime: None,
            kind: EntryKind::Dir,
            symlink_target: None,
            is_hidden: false,
        }
    }

    #[test]
    fn small_bucket_stays_ungrouped() {
        let entries = vec![file("a.png", 10), file("b.png", 10)];
        let config = GroupingConfig { min_group_size: 5 };
        let grouped = group_entries(&entries, &config);
        assert_eq!(grouped.len(), 2);
        assert!(matches!(grouped[0], GroupedEntry::Single(_)));
    }

    #[test]
    fn large_bucket_collapses_and_dirs_stay_single() {
        let mut entries = vec![dir("sub")];
        for i in 0..6 {
            entries.push(file(&format!("f{i}.png"), 100));
        }
        let config = GroupingConfig { min_group_size: 5 };
        let grouped = group_entries(&entries, &config);
        assert_eq!(grouped.len(), 2);
        assert!(matches!(grouped[0], GroupedEntry::Single(_)));
        match &grouped[1] {
            GroupedEntry::Group { label, count, total_size, .. } => {
                assert_eq!(label, "*.png");
                assert_eq!(*count, 6);
                assert_eq!(*total_size, 600);
            }
            _ => panic!("expected a group"),
        }
    }
}
