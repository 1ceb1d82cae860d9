//! Listing engine: walks a bucket directory and filters keys by prefix.
//!
//! The walk is depth-first and pre-order, visiting each directory's entries
//! in byte order of their names, so a listing comes back grouped by
//! directory. Only regular files become objects; directories, symlinks and
//! other special files are skipped. The whole subtree is materialized before
//! returning, with no pagination.

use crate::{
    models::object::Object,
    services::storage_service::{StorageError, StorageResult, io_context, modified_at},
};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::debug;

/// Plain string-prefix match. An empty prefix matches every key.
pub fn matches_prefix(key: &str, prefix: &str) -> bool {
    prefix.is_empty() || key.starts_with(prefix)
}

/// Convert a path relative to the bucket root into a `/`-separated key.
///
/// Returns `None` when a component is not valid UTF-8, since such a file
/// cannot be addressed by any request key.
pub fn key_from_relative(relative: &Path) -> Option<String> {
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

/// Walk `bucket_root` and return every regular file whose key starts with
/// `prefix`, in traversal order.
pub async fn walk_objects(bucket_root: &Path, prefix: &str) -> StorageResult<Vec<Object>> {
    let mut objects = Vec::new();
    let mut pending = read_sorted(bucket_root).await?;
    pending.reverse();

    while let Some(path) = pending.pop() {
        let meta = fs::symlink_metadata(&path)
            .await
            .map_err(io_context(format!("failed to stat {}", path.display())))?;

        if meta.is_dir() {
            let mut children = read_sorted(&path).await?;
            children.reverse();
            pending.extend(children);
            continue;
        }
        if !meta.is_file() {
            continue;
        }

        let relative = path.strip_prefix(bucket_root).map_err(|_| StorageError::Io {
            context: format!("failed to list objects under {}", bucket_root.display()),
            source: io::Error::other(format!("{} is outside the bucket", path.display())),
        })?;
        let Some(key) = key_from_relative(relative) else {
            debug!("skipping non UTF-8 path {}", path.display());
            continue;
        };
        if matches_prefix(&key, prefix) {
            objects.push(Object {
                key,
                size_bytes: meta.len(),
                last_modified: modified_at(&meta),
                etag: None,
            });
        }
    }

    Ok(objects)
}

async fn read_sorted(dir: &Path) -> StorageResult<Vec<PathBuf>> {
    let context = || format!("failed to list objects under {}", dir.display());
    let mut entries = fs::read_dir(dir).await.map_err(io_context(context()))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_context(context()))? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}
