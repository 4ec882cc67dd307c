//! Archive backend — a read-only view over a `.zip` file (spec §4.8).
//!
//! Listing and read streaming only; writes require a full repack, which is
//! the archive-create task's job (`core::task::archive`), not this backend's.

use std::io::{Cursor, Read, Write};
use std::path::PathBuf;

use zip::ZipArchive;

use crate::core::entry::{Entry, EntryKind};
use crate::core::error::{CoreError, CoreResult};

use super::{Location, StorageBackend};

pub struct ArchiveBackend;

impl ArchiveBackend {
    pub fn new() -> Self {
        ArchiveBackend
    }
}

impl Default for ArchiveBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn require_archive(loc: &Location) -> CoreResult<(&PathBuf, &str)> {
    match loc {
        Location::Archive { archive, inner } => Ok((archive, inner.as_str())),
        _ => Err(CoreError::Bug("archive backend given a non-archive location".into())),
    }
}

fn open(archive_path: &PathBuf) -> CoreResult<ZipArchive<std::fs::File>> {
    let file = std::fs::File::open(archive_path)
        .map_err(|e| CoreError::from_io(archive_path.display(), e))?;
    ZipArchive::new(file).map_err(|e| CoreError::Io(std::io::Error::other(e.to_string())))
}

fn normalized_prefix(inner: &str) -> String {
    if inner.is_empty() {
        String::new()
    } else if inner.ends_with('/') {
        inner.to_string()
    } else {
        format!("{inner}/")
    }
}

impl StorageBackend for ArchiveBackend {
    fn stat(&self, loc: &Location) -> CoreResult<Entry> {
        let (archive_path, inner) = require_archive(loc)?;
        let mut zip = open(archive_path)?;

        if inner.is_empty() {
            return Ok(Entry {
                location: loc.clone(),
                display_name: archive_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size: 0,
                mtime: None,
                kind: EntryKind::Dir,
                symlink_target: None,
                is_hidden: false,
            });
        }

        if let Ok(file) = zip.by_name(inner) {
            return Ok(Entry {
                location: loc.clone(),
                display_name: loc.name(),
                size: file.size(),
                mtime: None,
                kind: EntryKind::File,
                symlink_target: None,
                is_hidden: loc.name().starts_with('.'),
            });
        }

        let prefix = normalized_prefix(inner);
        let is_dir = (0..zip.len()).any(|i| {
            zip.by_index(i)
                .map(|f| f.name().starts_with(prefix.as_str()))
                .unwrap_or(false)
        });
        if is_dir {
            Ok(Entry {
                location: loc.clone(),
                display_name: loc.name(),
                size: 0,
                mtime: None,
                kind: EntryKind::Dir,
                symlink_target: None,
                is_hidden: loc.name().starts_with('.'),
            })
        } else {
            Err(CoreError::not_found(loc.display()))
        }
    }

    fn list(&self, loc: &Location) -> CoreResult<Vec<Entry>> {
        let (archive_path, inner) = require_archive(loc)?;
        let mut zip = open(archive_path)?;
        let prefix = normalized_prefix(inner);

        let mut seen_dirs = std::collections::HashSet::new();
        let mut out = Vec::new();

        for i in 0..zip.len() {
            let file = zip.by_index(i).map_err(|e| CoreError::Io(std::io::Error::other(e.to_string())))?;
            let name = file.name().to_string();
            let Some(rest) = name.strip_prefix(prefix.as_str()) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.find('/') {
                Some(slash_pos) => {
                    // An intermediate directory entry.
                    let dir_name = &rest[..slash_pos];
                    if seen_dirs.insert(dir_name.to_string()) {
                        out.push(Entry {
                            location: loc.join(dir_name),
                            display_name: dir_name.to_string(),
                            size: 0,
                            mtime: None,
                            kind: EntryKind::Dir,
                            symlink_target: None,
                            is_hidden: dir_name.starts_with('.'),
                        });
                    }
                }
                None => {
                    out.push(Entry {
                        location: loc.join(rest),
                        display_name: rest.to_string(),
                        size: file.size(),
                        mtime: None,
                        kind: EntryKind::File,
                        symlink_target: None,
                        is_hidden: rest.starts_with('.'),
                    });
                }
            }
        }

        Ok(out)
    }

    fn make_dir(&self, _loc: &Location) -> CoreResult<()> {
        Err(CoreError::BackendUnavailable(
            "archives are read-only; create the archive with the archive-create task".into(),
        ))
    }

    fn remove(&self, _loc: &Location) -> CoreResult<()> {
        Err(CoreError::BackendUnavailable("archives are read-only".into()))
    }

    fn rename(&self, _from: &Location, _to: &Location) -> CoreResult<()> {
        Err(CoreError::BackendUnavailable("archives are read-only".into()))
    }

    fn open_read(&self, loc: &Location) -> CoreResult<Box<dyn Read + Send>> {
        let (archive_path, inner) = require_archive(loc)?;
        let mut zip = open(archive_path)?;
        let mut file = zip
            .by_name(inner)
            .map_err(|_| CoreError::not_found(loc.display()))?;
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf).map_err(CoreError::Io)?;
        Ok(Box::new(Cursor::new(buf)))
    }

    fn open_write(&self, _loc: &Location) -> CoreResult<Box<dyn Write + Send>> {
        Err(CoreError::BackendUnavailable(
            "archives require a full repack to write; use the archive-create task".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn make_test_zip(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("test.zip");
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("a.txt", options).unwrap();
        zip.write_all(b"hello").unwrap();
        zip.start_file("sub/b.txt", options).unwrap();
        zip.write_all(b"world").unwrap();
        zip.finish().unwrap();
        path
    }

    #[test]
    fn lists_root_with_synthesized_dir() {
        let dir = tempfile::tempdir().unwrap();
        let archive = make_test_zip(dir.path());
        let backend = ArchiveBackend::new();
        let root = Location::Archive {
            archive: archive.clone(),
            inner: String::new(),
        };
        let mut entries = backend.list(&root).unwrap();
        entries.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].display_name, "a.txt");
        assert!(entries[0].kind == EntryKind::File);
        assert_eq!(entries[1].display_name, "sub");
        assert!(entries[1].kind == EntryKind::Dir);
    }

    #[test]
    fn reads_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let archive = make_test_zip(dir.path());
        let backend = ArchiveBackend::new();
        let loc = Location::Archive {
            archive,
            inner: "a.txt".to_string(),
        };
        let mut reader = backend.open_read(&loc).unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }
}
