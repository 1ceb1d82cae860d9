//! Core data models for the filesystem-backed object store.
//!
//! Neither entity is tracked independently of the filesystem: a bucket is a
//! top-level directory under the storage root and an object is a regular file
//! beneath it. These structs are snapshots taken at read time.

pub mod bucket;
pub mod object;
