//! src/services/storage_service.rs
//!
//! StorageService — bucket and object operations performed directly against a
//! rooted directory tree. The filesystem is the only source of truth: a bucket
//! is a directory under `base_path`, an object is a regular file at
//! `base_path/{bucket}/{key}`, and every read reflects the tree as it is at
//! that moment.

use crate::{
    models::{bucket::Bucket, object::Object},
    services::{
        listing,
        lock_table::{BucketGuard, LockTable},
    },
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, pin_mut};
use std::{
    fs::Metadata,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    time::timeout,
};
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("{what}")]
    Conflict { what: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{what} timed out")]
    TimedOut { what: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Upper bound on receiving one object body.
pub const DEFAULT_BODY_TIMEOUT: Duration = Duration::from_secs(30);

/// Wrap an I/O failure with descriptive context.
pub(crate) fn io_context(context: impl Into<String>) -> impl FnOnce(io::Error) -> StorageError {
    let context = context.into();
    move |source| StorageError::Io { context, source }
}

/// Modification time of a filesystem entry as UTC.
pub(crate) fn modified_at(meta: &Metadata) -> DateTime<Utc> {
    DateTime::<Utc>::from(meta.modified().unwrap_or(SystemTime::UNIX_EPOCH))
}

fn bucket_not_found(bucket: &str) -> StorageError {
    StorageError::NotFound {
        what: format!("bucket `{}`", bucket),
    }
}

fn object_not_found(bucket: &str, key: &str) -> StorageError {
    StorageError::NotFound {
        what: format!("object `{}` in bucket `{}`", key, bucket),
    }
}

/// StorageService provides the bucket/object contract:
/// - buckets: list, create (idempotent), delete (must be empty)
/// - objects: put (streamed, overwrites), get (open file handle), delete,
///   list by plain string prefix
///
/// Writes are not atomic: the object file is written in place, so a crash
/// mid-write leaves a truncated file behind. Concurrent access is coordinated
/// by a [`LockTable`] shared between clones.
#[derive(Clone)]
pub struct StorageService {
    /// Root directory on disk; each child directory is a bucket.
    pub base_path: PathBuf,

    /// How long a put may spend receiving its body while holding the
    /// bucket lock.
    body_timeout: Duration,

    locks: Arc<LockTable>,
}

impl StorageService {
    /// Open a storage root, creating it (and any parents) if missing.
    pub async fn open(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await.map_err(io_context(format!(
            "failed to create root directory {}",
            base_path.display()
        )))?;
        Ok(Self {
            base_path,
            body_timeout: DEFAULT_BODY_TIMEOUT,
            locks: Arc::new(LockTable::new()),
        })
    }

    pub fn with_body_timeout(mut self, body_timeout: Duration) -> Self {
        self.body_timeout = body_timeout;
        self
    }

    /// Key validation against path traversal.
    ///
    /// Every `/`-separated segment must be non-empty and neither `.` nor
    /// `..`; backslashes and NUL bytes are refused so a key can only ever
    /// address a path beneath its bucket directory.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::InvalidArgument("object key is empty".into()));
        }
        if key.bytes().any(|b| b == b'\\' || b == b'\0') {
            return Err(StorageError::InvalidArgument(format!(
                "object key `{}` contains a forbidden character",
                key.escape_debug()
            )));
        }
        if key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(StorageError::InvalidArgument(format!(
                "object key `{}` contains an empty, `.` or `..` segment",
                key
            )));
        }
        Ok(())
    }

    /// Bucket names are otherwise opaque, but must name exactly one
    /// directory directly beneath the root.
    fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        if name.is_empty() || name == "." || name == ".." {
            return Err(StorageError::InvalidArgument(format!(
                "bucket name `{}` is not allowed",
                name
            )));
        }
        if name.bytes().any(|b| b == b'/' || b == b'\\' || b == b'\0') {
            return Err(StorageError::InvalidArgument(format!(
                "bucket name `{}` contains a forbidden character",
                name.escape_debug()
            )));
        }
        Ok(())
    }

    /// Physical directory for a bucket. Does not check for existence.
    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Physical file path for an object, using native separators.
    /// Parent directories may not exist yet.
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let mut path = self.bucket_root(bucket_name);
        path.extend(key.split('/'));
        path
    }

    /// Resolve a bucket directory, failing with NotFound when it is absent
    /// or not a directory.
    async fn existing_bucket_root(&self, bucket: &str) -> StorageResult<PathBuf> {
        let root = self.bucket_root(bucket);
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => Ok(root),
            Ok(_) => Err(bucket_not_found(bucket)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(bucket_not_found(bucket)),
            Err(err) => Err(io_context(format!("failed to stat bucket `{}`", bucket))(err)),
        }
    }

    /// [`Self::existing_bucket_root`] under a bucket guard. A missing bucket
    /// releases its lock entry so unknown names do not pile up.
    async fn guarded_bucket_root<G>(
        &self,
        guard: &BucketGuard<G>,
        bucket: &str,
    ) -> StorageResult<PathBuf> {
        let result = self.existing_bucket_root(bucket).await;
        if let Err(StorageError::NotFound { .. }) = &result {
            self.locks.forget_missing(guard, bucket);
        }
        result
    }

    /// List every directory directly under the root as a bucket.
    ///
    /// Non-directory entries and entries whose metadata cannot be read are
    /// skipped. Results are ordered by name.
    pub async fn list_buckets(&self) -> StorageResult<Vec<Bucket>> {
        let _guard = self.locks.read_namespace().await;

        let mut entries = fs::read_dir(&self.base_path)
            .await
            .map_err(io_context("failed to read buckets"))?;

        let mut buckets = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(io_context("failed to read buckets"))?
        {
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(err) => {
                    debug!("skipping {}: {}", entry.path().display(), err);
                    continue;
                }
            };
            if !meta.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                debug!("skipping non UTF-8 directory {}", entry.path().display());
                continue;
            };
            buckets.push(Bucket {
                name,
                created_at: modified_at(&meta),
            });
        }

        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("listed {} buckets", buckets.len());
        Ok(buckets)
    }

    /// Ensure a bucket directory exists.
    ///
    /// Idempotent: creating an existing bucket succeeds without signaling
    /// that nothing new was created.
    pub async fn create_bucket(&self, name: &str) -> StorageResult<()> {
        self.ensure_bucket_name_safe(name)?;
        let _guard = self.locks.write_namespace().await;

        let bucket_root = self.bucket_root(name);
        fs::create_dir_all(&bucket_root)
            .await
            .map_err(io_context(format!("failed to create bucket `{}`", name)))?;
        debug!("created bucket {}", bucket_root.display());
        Ok(())
    }

    /// Delete an empty bucket directory.
    ///
    /// Fails with Conflict when the bucket still contains entries and with
    /// NotFound when it does not exist.
    pub async fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        self.ensure_bucket_name_safe(name)?;
        let guard = self.locks.write_namespace().await;

        let bucket_root = self.existing_bucket_root(name).await?;
        match fs::remove_dir(&bucket_root).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => {
                return Err(StorageError::Conflict {
                    what: format!("bucket `{}` is not empty", name),
                });
            }
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(bucket_not_found(name)),
            Err(err) => {
                return Err(io_context(format!("failed to delete bucket `{}`", name))(err));
            }
        }

        self.locks.forget(&guard, name);
        debug!(
            "deleted bucket {} ({} bucket locks tracked)",
            bucket_root.display(),
            self.locks.tracked_buckets()
        );
        Ok(())
    }

    /// Stream an object body into `base_path/{bucket}/{key}`.
    ///
    /// - Creates intermediate directories for nested keys.
    /// - Truncates and overwrites any existing file in place.
    /// - When `declared_len` is given, the number of bytes received must
    ///   match it.
    ///
    /// The body must arrive within the body timeout. On any failure the
    /// partial file and the directories it created are removed best-effort.
    pub async fn put_object_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        declared_len: Option<u64>,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)?;
        let guard = self.locks.write_bucket(bucket).await;
        let bucket_root = self.guarded_bucket_root(&guard, bucket).await?;

        let file_path = self.object_path(bucket, key);
        if let Some(parent) = file_path.parent() {
            if let Err(err) = fs::create_dir_all(parent).await {
                self.prune_empty_dirs(parent, &bucket_root).await;
                return Err(classify_path_error(err, bucket, key, "create object directory"));
            }
        }
        let mut file = match File::create(&file_path).await {
            Ok(file) => file,
            Err(err) => {
                if let Some(parent) = file_path.parent() {
                    self.prune_empty_dirs(parent, &bucket_root).await;
                }
                return Err(classify_path_error(err, bucket, key, "create object file"));
            }
        };

        let outcome = timeout(self.body_timeout, write_body(&mut file, stream)).await;
        drop(file);
        let failure = match outcome {
            Ok(Ok(written)) => match declared_len {
                Some(expected) if expected != written => Some(StorageError::InvalidArgument(
                    format!(
                        "declared length {} does not match {} bytes received",
                        expected, written
                    ),
                )),
                _ => None,
            },
            Ok(Err(err)) => Some(io_context(format!("failed to write object `{}`", key))(err)),
            Err(_) => Some(StorageError::TimedOut {
                what: format!("receiving object `{}` ({:?} limit)", key, self.body_timeout),
            }),
        };
        if let Some(err) = failure {
            self.discard_partial(&file_path, &bucket_root).await;
            return Err(err);
        }

        let meta = fs::metadata(&file_path)
            .await
            .map_err(io_context(format!("failed to stat object `{}`", key)))?;
        debug!("stored {} bytes at {}", meta.len(), file_path.display());

        Ok(Object {
            key: key.to_string(),
            size_bytes: meta.len(),
            last_modified: modified_at(&meta),
            etag: None,
        })
    }

    /// Open an object for reading.
    ///
    /// Returns metadata and an open File handle ready for streaming out. The
    /// locks are released once the handle is open; the caller owns (and
    /// closes by dropping) the file.
    pub async fn get_object_reader(&self, bucket: &str, key: &str) -> StorageResult<(Object, File)> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)?;
        let guard = self.locks.read_bucket(bucket).await;
        self.guarded_bucket_root(&guard, bucket).await?;

        let file_path = self.object_path(bucket, key);
        let meta = match fs::metadata(&file_path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(object_not_found(bucket, key)),
            Err(err) => return Err(classify_lookup_error(err, bucket, key, "stat object")),
        };
        let file = File::open(&file_path)
            .await
            .map_err(|err| classify_lookup_error(err, bucket, key, "open object"))?;

        let object = Object {
            key: key.to_string(),
            size_bytes: meta.len(),
            last_modified: modified_at(&meta),
            etag: None,
        };
        Ok((object, file))
    }

    /// Remove an object file.
    ///
    /// Directories left empty by the removal are pruned up to (not
    /// including) the bucket root, so a bucket emptied of objects can be
    /// deleted.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)?;
        let guard = self.locks.write_bucket(bucket).await;
        let bucket_root = self.guarded_bucket_root(&guard, bucket).await?;

        let file_path = self.object_path(bucket, key);
        match fs::symlink_metadata(&file_path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(object_not_found(bucket, key)),
            Err(err) => return Err(classify_lookup_error(err, bucket, key, "stat object")),
        }
        fs::remove_file(&file_path)
            .await
            .map_err(|err| classify_lookup_error(err, bucket, key, "delete object"))?;
        debug!("removed {}", file_path.display());

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }

    /// List objects whose key starts with `prefix` (empty matches all).
    ///
    /// Walks the whole bucket subtree on every call.
    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<Object>> {
        self.ensure_bucket_name_safe(bucket)?;
        let guard = self.locks.read_bucket(bucket).await;

        let bucket_root = self.guarded_bucket_root(&guard, bucket).await?;
        let objects = listing::walk_objects(&bucket_root, prefix).await?;
        debug!(
            "listed {} objects in {} with prefix {:?}",
            objects.len(),
            bucket,
            prefix
        );
        Ok(objects)
    }

    /// Remove a partially written object along with any directories its
    /// key created, so a failed put leaves the bucket as it was.
    async fn discard_partial(&self, file_path: &Path, bucket_root: &Path) {
        if let Err(err) = fs::remove_file(file_path).await {
            debug!("failed to remove partial object {}: {}", file_path.display(), err);
        }
        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, bucket_root).await;
        }
    }

    /// Recursively remove empty directories up to bucket root.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached root
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

/// Copy a body stream into `file`, returning the number of bytes written.
async fn write_body<S>(file: &mut File, stream: S) -> io::Result<u64>
where
    S: Stream<Item = io::Result<Bytes>> + Send,
{
    let mut written: u64 = 0;
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Map a failed lookup of an existing object: a missing path (or a path
/// running through a regular file) means the object does not exist.
fn classify_lookup_error(err: io::Error, bucket: &str, key: &str, action: &str) -> StorageError {
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::NotADirectory => object_not_found(bucket, key),
        _ => io_context(format!("failed to {} `{}`", action, key))(err),
    }
}

/// Map a failed creation: a key that collides with an existing object or
/// key prefix is a conflict rather than a server fault.
fn classify_path_error(err: io::Error, bucket: &str, key: &str, action: &str) -> StorageError {
    match err.kind() {
        ErrorKind::NotADirectory | ErrorKind::IsADirectory | ErrorKind::AlreadyExists => {
            StorageError::Conflict {
                what: format!(
                    "object key `{}` collides with an existing entry in bucket `{}`",
                    key, bucket
                ),
            }
        }
        _ => io_context(format!("failed to {} `{}`", action, key))(err),
    }
}
