//! The local filesystem backend — direct OS calls, no remote round trip.

use std::fs::{self, File};
use std::io::{Read, Write};

use crate::core::entry::{Entry, EntryKind};
use crate::core::error::{CoreError, CoreResult};

use super::{Location, StorageBackend};

pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        LocalBackend
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn require_local(loc: &Location) -> CoreResult<&std::path::Path> {
    loc.as_local()
        .ok_or_else(|| CoreError::Bug("local backend given a non-local location".into()))
}

fn entry_from_metadata(loc: Location, meta: &fs::Metadata) -> CoreResult<Entry> {
    let display_name = loc.name();
    let is_hidden = display_name.starts_with('.') && display_name != "." && display_name != "..";
    let kind = if meta.is_symlink() {
        EntryKind::Symlink
    } else if meta.is_dir() {
        EntryKind::Dir
    } else {
        EntryKind::File
    };
    let symlink_target = if meta.is_symlink() {
        loc.as_local()
            .and_then(|p| fs::read_link(p).ok())
            .map(|t| t.display().to_string())
    } else {
        None
    };
    Ok(Entry {
        location: loc,
        display_name,
        size: meta.len(),
        mtime: meta.modified().ok(),
        kind,
        symlink_target,
        is_hidden,
    })
}

impl StorageBackend for LocalBackend {
    fn stat(&self, loc: &Location) -> CoreResult<Entry> {
        let path = require_local(loc)?;
        let meta = fs::symlink_metadata(path)
            .map_err(|e| CoreError::from_io(path.display(), e))?;
        entry_from_metadata(loc.clone(), &meta)
    }

    fn list(&self, loc: &Location) -> CoreResult<Vec<Entry>> {
        let path = require_local(loc)?;
        let rd = fs::read_dir(path).map_err(|e| CoreError::from_io(path.display(), e))?;
        let mut out = Vec::new();
        for item in rd {
            let item = item.map_err(|e| CoreError::from_io(path.display(), e))?;
            let child_loc = loc.join(&item.file_name().to_string_lossy());
            let meta = item
                .metadata()
                .map_err(|e| CoreError::from_io(child_loc.display(), e))?;
            out.push(entry_from_metadata(child_loc, &meta)?);
        }
        Ok(out)
    }

    fn make_dir(&self, loc: &Location) -> CoreResult<()> {
        let path = require_local(loc)?;
        fs::create_dir_all(path).map_err(|e| CoreError::from_io(path.display(), e))
    }

    fn remove(&self, loc: &Location) -> CoreResult<()> {
        let path = require_local(loc)?;
        let meta = fs::symlink_metadata(path).map_err(|e| CoreError::from_io(path.display(), e))?;
        if meta.is_dir() {
            fs::remove_dir_all(path).map_err(|e| CoreError::from_io(path.display(), e))
        } else {
            fs::remove_file(path).map_err(|e| CoreError::from_io(path.display(), e))
        }
    }

    fn rename(&self, from: &Location, to: &Location) -> CoreResult<()> {
        let from_path = require_local(from)?;
        let to_path = require_local(to)?;
        fs::rename(from_path, to_path).map_err(|e| CoreError::from_io(from_path.display(), e))
    }

    fn open_read(&self, loc: &Location) -> CoreResult<Box<dyn Read + Send>> {
        let path = require_local(loc)?;
        let f = File::open(path).map_err(|e| CoreError::from_io(path.display(), e))?;
        Ok(Box::new(f))
    }

    fn open_write(&self, loc: &Location) -> CoreResult<Box<dyn Write + Send>> {
        let path = require_local(loc)?;
        let f = File::create(path).map_err(|e| CoreError::from_io(path.display(), e))?;
        Ok(Box::new(f))
    }

    /// Same-filesystem fast path via `std::fs::copy`, which preserves
    /// permissions on Unix (spec §4.8's "preserving metadata where possible").
    fn fast_copy(&self, from: &Location, to: &Location) -> CoreResult<bool> {
        let from_path = require_local(from)?;
        let to_path = require_local(to)?;
        fs::copy(from_path, to_path).map_err(|e| CoreError::from_io(from_path.display(), e))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn stat_missing_file_is_not_found() {
        let backend = LocalBackend::new();
        let loc = Location::Local(PathBuf::from("/nonexistent/definitely/missing"));
        let err = backend.stat(&loc).unwrap_err();
        assert_eq!(err.kind_tag(), "NotFound");
    }

    #[test]
    fn list_and_fast_copy_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, b"hello").unwrap();
        let backend = LocalBackend::new();
        let dir_loc = Location::Local(dir.path().to_path_buf());
        let entries = backend.list(&dir_loc).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_name, "src.txt");

        let dst = Location::Local(dir.path().join("dst.txt"));
        let src_loc = Location::Local(src.clone());
        assert!(backend.fast_copy(&src_loc, &dst).unwrap());
        assert_eq!(fs::read(dir.path().join("dst.txt")).unwrap(), b"hello");
    }
}
