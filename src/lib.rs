//! S3-compatible object storage gateway backed by a local directory tree.
//!
//! Buckets are top-level directories under a storage root and objects are
//! files beneath them. [`routes::routes::app`] builds the HTTP surface
//! around a [`services::storage_service::StorageService`].

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod xml;
