//! Represents a logical bucket — a top-level directory under the storage root.

use chrono::{DateTime, Utc};

/// A storage bucket.
///
/// The name is used verbatim as the directory name. There is no separately
/// persisted creation timestamp; `created_at` is the directory's modification
/// time, so it moves whenever entries are added to or removed from the bucket
/// root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    /// Bucket name (directory name under the storage root).
    pub name: String,

    /// Directory modification time, reported as the creation date.
    pub created_at: DateTime<Utc>,
}
