//! HTTP request dispatcher for bucket and object operations.
//!
//! A single entry point splits the request path into `(bucket, key)` and
//! picks the storage operation from the method and whether a key is present:
//!
//! | Method | `/`          | `/{bucket}`        | `/{bucket}/{key}` |
//! |--------|--------------|--------------------|-------------------|
//! | GET    | list buckets | list objects (XML) | stream object     |
//! | PUT    | 405          | create bucket      | store object      |
//! | DELETE | 405          | delete bucket      | delete object     |
//! | other  | 405          | 405                | 405               |
//!
//! Object bodies are streamed in both directions; listings are rendered as
//! XML before the status line is sent.

use crate::{
    errors::AppError,
    services::storage_service::StorageService,
    xml::{self, ListAllMyBucketsResult, ListBucketResult},
};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use futures::{StreamExt, TryStreamExt};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::io;
use tokio_util::io::ReaderStream;
use tracing::error;

/// Query params accepted by the object listing. Anything else is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct ListObjectsQuery {
    pub prefix: Option<String>,
}

/// What a request path addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `/` — the bucket collection.
    Service,
    Bucket(String),
    Object { bucket: String, key: String },
}

/// Split a request path into `(bucket, key)`.
///
/// The leading slash is stripped and the raw path split on the first `/`;
/// each part is then percent-decoded on its own, so an escaped `%2F` stays
/// inside the segment it was written in. An empty key (`/bucket/`)
/// addresses the bucket itself. No naming rules are applied here.
pub fn parse_target(path: &str) -> Result<Target, AppError> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);

    if trimmed.is_empty() {
        return Ok(Target::Service);
    }
    match trimmed.split_once('/') {
        Some((bucket, key)) if !key.is_empty() => Ok(Target::Object {
            bucket: decode_segment(bucket)?,
            key: decode_segment(key)?,
        }),
        Some((bucket, _)) => Ok(Target::Bucket(decode_segment(bucket)?)),
        None => Ok(Target::Bucket(decode_segment(trimmed)?)),
    }
}

fn decode_segment(raw: &str) -> Result<String, AppError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| AppError::new(StatusCode::BAD_REQUEST, "Invalid request path"))
}

/// Mounted at the server root; routes every storage request.
pub async fn dispatch(
    State(service): State<StorageService>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    if !matches!(method, Method::GET | Method::PUT | Method::DELETE) {
        return Err(AppError::method_not_allowed());
    }

    match (method, parse_target(uri.path())?) {
        (Method::GET, Target::Service) => list_buckets(&service).await,
        (Method::GET, Target::Bucket(bucket)) => list_objects(&service, &bucket, &uri).await,
        (Method::GET, Target::Object { bucket, key }) => get_object(&service, &bucket, &key).await,
        (Method::PUT, Target::Bucket(bucket)) => create_bucket(&service, &bucket).await,
        (Method::PUT, Target::Object { bucket, key }) => {
            put_object(&service, &bucket, &key, &headers, body).await
        }
        (Method::DELETE, Target::Bucket(bucket)) => delete_bucket(&service, &bucket).await,
        (Method::DELETE, Target::Object { bucket, key }) => {
            delete_object(&service, &bucket, &key).await
        }
        _ => Err(AppError::method_not_allowed()),
    }
}

/// GET `/` — list buckets.
async fn list_buckets(service: &StorageService) -> Result<Response, AppError> {
    let buckets = service.list_buckets().await?;
    let doc = xml::to_document(&ListAllMyBucketsResult::new(&buckets))
        .map_err(|err| AppError::internal(format!("failed to encode bucket list: {}", err)))?;
    Ok(xml_response(doc))
}

/// GET `/{bucket}` — list objects, supports ?prefix=
async fn list_objects(
    service: &StorageService,
    bucket: &str,
    uri: &Uri,
) -> Result<Response, AppError> {
    let Query(q) = Query::<ListObjectsQuery>::try_from_uri(uri)
        .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.body_text()))?;
    let prefix = q.prefix.unwrap_or_default();

    let objects = service.list_objects(bucket, &prefix).await?;
    let doc = xml::to_document(&ListBucketResult::new(bucket, &objects))
        .map_err(|err| AppError::internal(format!("failed to encode object list: {}", err)))?;
    Ok(xml_response(doc))
}

/// GET `/{bucket}/{key}` — stream the object body.
async fn get_object(service: &StorageService, bucket: &str, key: &str) -> Result<Response, AppError> {
    let (meta, file) = service.get_object_reader(bucket, key).await?;

    let key_owned = key.to_string();
    let stream = ReaderStream::new(file).inspect_err(move |err| {
        error!("failed to stream object `{}`: {}", key_owned, err);
    });

    let mut response = Response::new(Body::from_stream(stream));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size_bytes));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    let last_modified = meta
        .last_modified
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    Ok(response)
}

/// PUT `/{bucket}` — create bucket (idempotent).
async fn create_bucket(service: &StorageService, bucket: &str) -> Result<Response, AppError> {
    service.create_bucket(bucket).await?;
    Ok(StatusCode::OK.into_response())
}

/// PUT `/{bucket}/{key}` — store the request body as the object.
async fn put_object(
    service: &StorageService,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let stream = body.into_data_stream().map(|chunk| chunk.map_err(io::Error::other));

    service
        .put_object_stream(bucket, key, declared_len, stream)
        .await?;
    Ok(StatusCode::OK.into_response())
}

/// DELETE `/{bucket}` — delete an empty bucket.
async fn delete_bucket(service: &StorageService, bucket: &str) -> Result<Response, AppError> {
    service.delete_bucket(bucket).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// DELETE `/{bucket}/{key}` — delete an object.
async fn delete_object(service: &StorageService, bucket: &str, key: &str) -> Result<Response, AppError> {
    service.delete_object(bucket, key).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn xml_response(doc: String) -> Response {
    let mut response = Response::new(Body::from(doc));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    *response.status_mut() = StatusCode::OK;
    response
}
