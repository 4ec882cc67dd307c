//! S3 backend. `aws-sdk-s3` is async-only; since the task framework's
//! workers are plain OS threads (spec §5), each call is driven through a
//! small dedicated `tokio::runtime::Runtime` that blocks until the async
//! call resolves — the idiomatic "sync facade over an async client" shape.
//!
//! Key prefixes stand in for directories (spec §4.8): `is_dir` is inferred
//! from the presence of children under the prefix, `rename` is
//! unsupported, and `make_dir` is a no-op since keys are created on first
//! write.

use std::io::{Cursor, Read, Write};
use std::sync::OnceLock;
use std::time::Duration;

use aws_sdk_s3::Client;
use tokio::runtime::Runtime;

use crate::core::entry::{Entry, EntryKind};
use crate::core::error::{CoreError, CoreResult};

use super::cache::TtlCache;
use super::{Location, StorageBackend};

fn blocking_runtime() -> &'static Runtime {
    static RT: OnceLock<Runtime> = OnceLock::new();
    RT.get_or_init(|| {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to start s3 blocking runtime")
    })
}

pub struct S3Backend {
    client: OnceLock<Client>,
    // Listing cache keyed by "bucket/prefix"; invalidated by task completion
    // (spec §4.8: "task completion invalidates the cache for paths it
    // touched").
    listing_cache: TtlCache<String, Vec<Entry>>,
}

impl S3Backend {
    pub fn new() -> Self {
        S3Backend {
            client: OnceLock::new(),
            listing_cache: TtlCache::new(Duration::from_secs(30)),
        }
    }

    fn client(&self) -> CoreResult<&Client> {
        if let Some(c) = self.client.get() {
            return Ok(c);
        }
        let client = blocking_runtime().block_on(async {
            let config = aws_config::load_from_env().await;
            Client::new(&config)
        });
        Ok(self.client.get_or_init(|| client))
    }

    /// Invalidate the listing cache for a bucket/prefix a completed task
    /// touched (spec §4.8).
    pub fn invalidate(&self, bucket: &str, prefix: &str) {
        self.listing_cache.remove(&cache_key(bucket, prefix));
    }
}

impl Default for S3Backend {
    fn default() -> Self {
        Self::new()
    }
}

fn cache_key(bucket: &str, prefix: &str) -> String {
    format!("{bucket}/{prefix}")
}

fn require_s3(loc: &Location) -> CoreResult<(&str, &str)> {
    match loc {
        Location::S3 { bucket, key } => Ok((bucket.as_str(), key.as_str())),
        _ => Err(CoreError::Bug("s3 backend given a non-s3 location".into())),
    }
}

fn normalized_prefix(key: &str) -> String {
    if key.is_empty() || key.ends_with('/') {
        key.to_string()
    } else {
        format!("{key}/")
    }
}

impl StorageBackend for S3Backend {
    fn stat(&self, loc: &Location) -> CoreResult<Entry> {
        let (bucket, key) = require_s3(loc)?;
        let client = self.client()?;
        let prefix = normalized_prefix(key);

        let head = blocking_runtime().block_on(
            client
                .head_object()
                .bucket(bucket)
                .key(key)
                .send(),
        );
        if let Ok(head) = head {
            return Ok(Entry {
                location: loc.clone(),
                display_name: loc.name(),
                size: head.content_length().unwrap_or(0).max(0) as u64,
                mtime: head
                    .last_modified()
                    .and_then(|t| t.to_chrono_utc().ok())
                    .map(|dt| std::time::UNIX_EPOCH + Duration::from_secs(dt.timestamp().max(0) as u64)),
                kind: EntryKind::File,
                symlink_target: None,
                is_hidden: loc.name().starts_with('.'),
            });
        }

        // Not an object; treat as a directory if any key shares the prefix.
        let listed = blocking_runtime().block_on(
            client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(&prefix)
                .max_keys(1)
                .send(),
        );
        match listed {
            Ok(resp) if !resp.contents().is_empty() || !resp.common_prefixes().is_empty() => {
                Ok(Entry {
                    location: loc.clone(),
                    display_name: loc.name(),
                    size: 0,
                    mtime: None,
                    kind: EntryKind::Dir,
                    symlink_target: None,
                    is_hidden: loc.name().starts_with('.'),
                })
            }
            Ok(_) => Err(CoreError::not_found(loc.display())),
            Err(e) => Err(CoreError::Network(e.to_string())),
        }
    }

    fn list(&self, loc: &Location) -> CoreResult<Vec<Entry>> {
        let (bucket, key) = require_s3(loc)?;
        let prefix = normalized_prefix(key);
        let cache_key = cache_key(bucket, &prefix);
        if let Some(cached) = self.listing_cache.get(&cache_key) {
            return Ok(cached);
        }

        let client = self.client()?;
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut req = client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(&prefix)
                .delimiter("/");
            if let Some(tok) = continuation.clone() {
                req = req.continuation_token(tok);
            }
            let resp = blocking_runtime()
                .block_on(req.send())
                .map_err(|e| CoreError::Network(e.to_string()))?;

            for common in resp.common_prefixes() {
                if let Some(p) = common.prefix() {
                    let name = p.trim_end_matches('/').rsplit('/').next().unwrap_or(p);
                    entries.push(Entry {
                        location: loc.join(name),
                        display_name: name.to_string(),
                        size: 0,
                        mtime: None,
                        kind: EntryKind::Dir,
                        symlink_target: None,
                        is_hidden: name.starts_with('.'),
                    });
                }
            }
            for obj in resp.contents() {
                let full_key = obj.key().unwrap_or_default();
                if full_key == prefix {
                    continue;
                }
                let name = full_key.rsplit('/').next().unwrap_or(full_key);
                entries.push(Entry {
                    location: loc.join(name),
                    display_name: name.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    mtime: obj
                        .last_modified()
                        .and_then(|t| t.to_chrono_utc().ok())
                        .map(|dt| std::time::UNIX_EPOCH + Duration::from_secs(dt.timestamp().max(0) as u64)),
                    kind: EntryKind::File,
                    symlink_target: None,
                    is_hidden: name.starts_with('.'),
                });
            }

            if resp.is_truncated().unwrap_or(false) {
                continuation = resp.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        self.listing_cache.insert(cache_key, entries.clone());
        Ok(entries)
    }

    /// No-op: S3 keys are created on first write (spec §4.8).
    fn make_dir(&self, _loc: &Location) -> CoreResult<()> {
        Ok(())
    }

    fn remove(&self, loc: &Location) -> CoreResult<()> {
        let (bucket, key) = require_s3(loc)?;
        let client = self.client()?;
        blocking_runtime()
            .block_on(client.delete_object().bucket(bucket).key(key).send())
            .map_err(|e| CoreError::Network(e.to_string()))?;
        Ok(())
    }

    fn rename(&self, _from: &Location, _to: &Location) -> CoreResult<()> {
        Err(CoreError::BackendUnavailable(
            "S3 does not support rename".into(),
        ))
    }

    fn open_read(&self, loc: &Location) -> CoreResult<Box<dyn Read + Send>> {
        let (bucket, key) = require_s3(loc)?;
        let client = self.client()?;
        let resp = blocking_runtime()
            .block_on(client.get_object().bucket(bucket).key(key).send())
            .map_err(|e| CoreError::Network(e.to_string()))?;
        let bytes = blocking_runtime()
            .block_on(resp.body.collect())
            .map_err(|e| CoreError::Network(e.to_string()))?
            .into_bytes();
        Ok(Box::new(Cursor::new(bytes.to_vec())))
    }

    /// Buffers the whole object in memory and uploads it on `flush`/drop
    /// semantics are not available for a plain `Write`, so the writer
    /// uploads eagerly once all bytes are buffered by the streaming copy
    /// loop's final `flush()` call.
    fn open_write(&self, loc: &Location) -> CoreResult<Box<dyn Write + Send>> {
        let (bucket, key) = require_s3(loc)?;
        Ok(Box::new(S3Writer {
            bucket: bucket.to_string(),
            key: key.to_string(),
            buf: Vec::new(),
        }))
    }
}

struct S3Writer {
    bucket: String,
    key: String,
    buf: Vec<u8>,
}

impl Write for S3Writer {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let rt = blocking_runtime();
        let config = rt.block_on(aws_config::load_from_env());
        let client = Client::new(&config);
        let body = aws_sdk_s3::primitives::ByteStream::from(std::mem::take(&mut self.buf));
        rt.block_on(
            client
                .put_object()
                .bucket(&self.bucket)
                .key(&self.key)
                .body(body)
                .send(),
        )
        .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(())
    }
}

impl Drop for S3Writer {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_prefix_adds_trailing_slash() {
        assert_eq!(normalized_prefix("foo"), "foo/");
        assert_eq!(normalized_prefix("foo/"), "foo/");
        assert_eq!(normalized_prefix(""), "");
    }
}
