//! XML envelopes for bucket and object listings.
//!
//! Both documents carry the `http://s3.amazonaws.com/doc/2006-03-01/`
//! namespace on the root element, which existing S3 clients require before
//! they will parse the body.

use crate::models::{bucket::Bucket, object::Object};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

pub const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

#[derive(Debug, Serialize)]
#[serde(rename = "ListAllMyBucketsResult")]
pub struct ListAllMyBucketsResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Buckets")]
    pub buckets: BucketsWrapper,
}

#[derive(Debug, Serialize)]
pub struct BucketsWrapper {
    #[serde(rename = "Bucket")]
    pub buckets: Vec<BucketInfo>,
}

#[derive(Debug, Serialize)]
pub struct BucketInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "CreationDate")]
    pub creation_date: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "ListBucketResult")]
pub struct ListBucketResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Contents")]
    pub contents: Vec<ObjectInfo>,
}

#[derive(Debug, Serialize)]
pub struct ObjectInfo {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
    #[serde(rename = "ETag", skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl ListAllMyBucketsResult {
    pub fn new(buckets: &[Bucket]) -> Self {
        Self {
            xmlns: S3_XMLNS,
            buckets: BucketsWrapper {
                buckets: buckets
                    .iter()
                    .map(|b| BucketInfo {
                        name: b.name.clone(),
                        creation_date: timestamp(&b.created_at),
                    })
                    .collect(),
            },
        }
    }
}

impl ListBucketResult {
    pub fn new(bucket: &str, objects: &[Object]) -> Self {
        Self {
            xmlns: S3_XMLNS,
            name: bucket.to_string(),
            contents: objects
                .iter()
                .map(|o| ObjectInfo {
                    key: o.key.clone(),
                    size: o.size_bytes,
                    last_modified: timestamp(&o.last_modified),
                    etag: o.etag.as_ref().map(|e| format!("\"{}\"", e)),
                })
                .collect(),
        }
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serialize an envelope into a complete document, declaration included.
pub fn to_document<T: Serialize>(envelope: &T) -> Result<String, quick_xml::DeError> {
    let body = quick_xml::se::to_string(envelope)?;
    let mut doc = String::with_capacity(XML_DECLARATION.len() + body.len());
    doc.push_str(XML_DECLARATION);
    doc.push_str(&body);
    Ok(doc)
}
