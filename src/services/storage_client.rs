//! Storage client seam used by the batch engine.
//!
//! A client is bound to one bucket. Absent objects are reported as
//! [`StorageError::NotFound`](crate::errors::StorageError::NotFound) so callers
//! never have to inspect status codes or messages.

use crate::{
    errors::StorageResult,
    models::object::{ListPage, ObjectHead, PutObject},
};
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Bucket this client operates on, for logging.
    fn bucket(&self) -> &str;

    /// Fetch one listing page, starting after `continuation_token` when given.
    async fn list_objects(&self, continuation_token: Option<&str>) -> StorageResult<ListPage>;

    /// Probe for an object without reading its body.
    async fn head_object(&self, key: &str) -> StorageResult<ObjectHead>;

    /// Read a whole object into memory.
    async fn get_object(&self, key: &str) -> StorageResult<Bytes>;

    /// Write (or overwrite) an object.
    async fn put_object(&self, request: PutObject) -> StorageResult<()>;
}
