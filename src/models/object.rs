#![allow(dead_code)]
//! Represents objects as seen through the storage client.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A single entry returned by a listing page.
///
/// Only the key drives the conversion; the rest is carried for logging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedObject {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes as reported by the listing.
    pub size_bytes: i64,

    /// Entity tag, without surrounding quotes.
    pub etag: Option<String>,

    /// Timestamp when the object was last modified, if reported.
    pub last_modified: Option<DateTime<Utc>>,
}

impl ListedObject {
    pub fn new(key: impl Into<String>, size_bytes: i64) -> Self {
        Self {
            key: key.into(),
            size_bytes,
            etag: None,
            last_modified: None,
        }
    }
}

/// One page of a ListObjectsV2-style listing.
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

impl ListPage {
    /// Token to continue with, or `None` when the listing is exhausted.
    ///
    /// A truncated page without a token is treated as the last one since the
    /// position cannot be resumed.
    pub fn continuation(&self) -> Option<&str> {
        if self.is_truncated {
            self.next_continuation_token.as_deref()
        } else {
            None
        }
    }
}

/// Metadata returned by a successful existence probe.
#[derive(Clone, Debug)]
pub struct ObjectHead {
    pub key: String,
    pub size_bytes: Option<i64>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// Canned access policy applied to a stored object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Private,
    PublicRead,
}

impl Visibility {
    /// Value for the `x-amz-acl` header.
    pub fn as_acl(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::PublicRead => "public-read",
        }
    }
}

/// Write request for a converted object.
#[derive(Clone, Debug)]
pub struct PutObject {
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
    pub visibility: Visibility,
}
