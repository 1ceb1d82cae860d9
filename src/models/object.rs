//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};

/// Represents a single object within a bucket.
///
/// The key is the file path relative to the bucket directory, with `/` as the
/// separator regardless of platform. Only filesystem attributes are exposed;
/// no content type or user metadata is persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Object {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size_bytes: u64,

    /// File modification time.
    pub last_modified: DateTime<Utc>,

    /// Entity tag. The filesystem backend never computes one.
    pub etag: Option<String>,
}
