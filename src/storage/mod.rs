//! Path polymorphism and storage backends (spec §4.8).
//!
//! [`Location`] is the opaque path value described in spec §3: it names a
//! place in one of four backends without the caller needing to know which.
//! [`StorageBackend`] is the trait each backend implements; [`Router`] picks
//! the right backend for a `Location` and additionally owns the
//! cross-storage streaming copy that spec §4.8/§3 requires whenever source
//! and destination disagree on scheme.

pub mod archive;
pub mod cache;
pub mod local;
pub mod s3;
pub mod sftp;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::entry::Entry;
use crate::core::error::{CoreError, CoreResult};

/// One megabyte — the chunk size spec §4.4/§4.8 uses for cross-storage
/// streaming and for the worker's cancellation check granularity.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Which backend a [`Location`] addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Local,
    Sftp,
    S3,
    Archive,
}

/// An opaque value identifying a location in one of the storage backends
/// (spec §3). Each variant carries exactly the scheme-specific address spec
/// describes: host+remote path, bucket+key, local absolute path, or an
/// archive path plus an inner path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Local(PathBuf),
    Sftp { host: String, path: String },
    S3 { bucket: String, key: String },
    Archive { archive: PathBuf, inner: String },
}

impl Location {
    pub fn scheme(&self) -> Scheme {
        match self {
            Location::Local(_) => Scheme::Local,
            Location::Sftp { .. } => Scheme::Sftp,
            Location::S3 { .. } => Scheme::S3,
            Location::Archive { .. } => Scheme::Archive,
        }
    }

    /// The final path segment — the thing a user thinks of as the "name".
    pub fn name(&self) -> String {
        match self {
            Location::Local(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string()),
            Location::Sftp { path, .. } => last_segment(path),
            Location::S3 { key, .. } => last_segment(key.trim_end_matches('/')),
            Location::Archive { inner, .. } => last_segment(inner.trim_end_matches('/')),
        }
    }

    /// The parent location, or `None` if this is already a root.
    pub fn parent(&self) -> Option<Location> {
        match self {
            Location::Local(p) => p.parent().map(|p| Location::Local(p.to_path_buf())),
            Location::Sftp { host, path } => {
                parent_segment(path).map(|p| Location::Sftp {
                    host: host.clone(),
                    path: p,
                })
            }
            Location::S3 { bucket, key } => {
                let trimmed = key.trim_end_matches('/');
                parent_segment(trimmed).map(|p| Location::S3 {
                    bucket: bucket.clone(),
                    key: p,
                })
            }
            Location::Archive { archive, inner } => {
                let trimmed = inner.trim_end_matches('/');
                parent_segment(trimmed).map(|p| Location::Archive {
                    archive: archive.clone(),
                    inner: p,
                })
            }
        }
    }

    /// Join a child name under this location.
    pub fn join(&self, name: &str) -> Location {
        match self {
            Location::Local(p) => Location::Local(p.join(name)),
            Location::Sftp { host, path } => Location::Sftp {
                host: host.clone(),
                path: join_segment(path, name),
            },
            Location::S3 { bucket, key } => Location::S3 {
                bucket: bucket.clone(),
                key: join_segment(key, name),
            },
            Location::Archive { archive, inner } => Location::Archive {
                archive: archive.clone(),
                inner: join_segment(inner, name),
            },
        }
    }

    pub fn display(&self) -> String {
        match self {
            Location::Local(p) => p.display().to_string(),
            Location::Sftp { host, path } => format!("sftp://{host}{path}"),
            Location::S3 { bucket, key } => format!("s3://{bucket}/{key}"),
            Location::Archive { archive, inner } => {
                format!("{}::{}", archive.display(), inner)
            }
        }
    }

    pub fn as_local(&self) -> Option<&Path> {
        match self {
            Location::Local(p) => Some(p),
            _ => None,
        }
    }
}

fn last_segment(s: &str) -> String {
    s.rsplit('/').find(|seg| !seg.is_empty()).unwrap_or(s).to_string()
}

fn parent_segment(s: &str) -> Option<String> {
    let trimmed = s.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => Some(parent.to_string()),
        Some((_, _)) => Some(String::from("/")),
        None => None,
    }
}

fn join_segment(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// The uniform operations every storage backend must provide (spec §3/§4.8).
pub trait StorageBackend: Send + Sync {
    fn stat(&self, loc: &Location) -> CoreResult<Entry>;
    fn exists(&self, loc: &Location) -> bool {
        self.stat(loc).is_ok()
    }
    fn list(&self, loc: &Location) -> CoreResult<Vec<Entry>>;
    fn make_dir(&self, loc: &Location) -> CoreResult<()>;
    fn remove(&self, loc: &Location) -> CoreResult<()>;
    fn rename(&self, from: &Location, to: &Location) -> CoreResult<()>;
    fn open_read(&self, loc: &Location) -> CoreResult<Box<dyn Read + Send>>;
    fn open_write(&self, loc: &Location) -> CoreResult<Box<dyn Write + Send>>;

    /// Scheme-native fast path for a same-backend copy (spec §3's
    /// `copy_to` invariant). Returns `Ok(false)` to fall back to the
    /// generic streaming copy in [`Router::copy`].
    fn fast_copy(&self, _from: &Location, _to: &Location) -> CoreResult<bool> {
        Ok(false)
    }
}

/// Dispatches [`Location`] operations to the right backend and implements
/// the cross-storage streaming copy spec §3/§4.8 require.
pub struct Router {
    pub local: Arc<local::LocalBackend>,
    pub sftp: Arc<sftp::SftpBackend>,
    pub s3: Arc<s3::S3Backend>,
    pub archive: Arc<archive::ArchiveBackend>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            local: Arc::new(local::LocalBackend::new()),
            sftp: Arc::new(sftp::SftpBackend::new()),
            s3: Arc::new(s3::S3Backend::new()),
            archive: Arc::new(archive::ArchiveBackend::new()),
        }
    }

    fn backend(&self, scheme: Scheme) -> &dyn StorageBackend {
        match scheme {
            Scheme::Local => self.local.as_ref(),
            Scheme::Sftp => self.sftp.as_ref(),
            Scheme::S3 => self.s3.as_ref(),
            Scheme::Archive => self.archive.as_ref(),
        }
    }

    pub fn stat(&self, loc: &Location) -> CoreResult<Entry> {
        self.backend(loc.scheme()).stat(loc)
    }

    pub fn exists(&self, loc: &Location) -> bool {
        self.backend(loc.scheme()).exists(loc)
    }

    pub fn list(&self, loc: &Location) -> CoreResult<Vec<Entry>> {
        self.backend(loc.scheme()).list(loc)
    }

    pub fn make_dir(&self, loc: &Location) -> CoreResult<()> {
        self.backend(loc.scheme()).make_dir(loc)
    }

    pub fn remove(&self, loc: &Location) -> CoreResult<()> {
        self.backend(loc.scheme()).remove(loc)
    }

    pub fn open_read(&self, loc: &Location) -> CoreResult<Box<dyn Read + Send>> {
        self.backend(loc.scheme()).open_read(loc)
    }

    pub fn rename(&self, from: &Location, to: &Location) -> CoreResult<()> {
        if from.scheme() != to.scheme() {
            return Err(CoreError::InvalidArgument(
                "rename requires matching schemes".into(),
            ));
        }
        self.backend(from.scheme()).rename(from, to)
    }

    /// Copy `from` to `to`, honoring `cancel` between chunks (spec §8
    /// invariant 4: the worker exits within one 1 MiB chunk boundary).
    ///
    /// Same-scheme copies try the backend's native fast path first; any
    /// other combination always streams (spec §3's cross-storage invariant).
    pub fn copy(
        &self,
        from: &Location,
        to: &Location,
        cancel: &AtomicBool,
        mut on_bytes: impl FnMut(u64),
    ) -> CoreResult<()> {
        if from.scheme() == to.scheme() {
            if self.backend(from.scheme()).fast_copy(from, to)? {
                return Ok(());
            }
        }
        self.stream_copy(from, to, cancel, &mut on_bytes)
    }

    fn stream_copy(
        &self,
        from: &Location,
        to: &Location,
        cancel: &AtomicBool,
        on_bytes: &mut dyn FnMut(u64),
    ) -> CoreResult<()> {
        let mut reader = self.backend(from.scheme()).open_read(from)?;
        let mut writer = self.backend(to.scheme()).open_write(to)?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            if cancel.load(Ordering::Relaxed) {
                drop(writer);
                let _ = self.backend(to.scheme()).remove(to);
                return Err(CoreError::Cancelled);
            }
            let n = reader.read(&mut buf).map_err(CoreError::Io)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).map_err(CoreError::Io)?;
            on_bytes(n as u64);
            if cancel.load(Ordering::Relaxed) {
                drop(writer);
                let _ = self.backend(to.scheme()).remove(to);
                return Err(CoreError::Cancelled);
            }
        }
        writer.flush().map_err(CoreError::Io)?;
        Ok(())
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_join_and_parent_roundtrip() {
        let loc = Location::Local(PathBuf::from("/a/b"));
        let child = loc.join("c.txt");
        assert_eq!(child.name(), "c.txt");
        assert_eq!(child.parent().unwrap(), loc);
    }

    #[test]
    fn s3_parent_of_root_key_is_none() {
        let loc = Location::S3 {
            bucket: "bkt".into(),
            key: "top".into(),
        };
        assert!(loc.parent().is_none());
    }

    #[test]
    fn sftp_display_format() {
        let loc = Location::Sftp {
            host: "example.com".into(),
            path: "/home/u/file".into(),
        };
        assert_eq!(loc.display(), "sftp://example.com/home/u/file");
    }
}
