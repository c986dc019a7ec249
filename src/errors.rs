//! Error taxonomy for the batch converter.
//!
//! Storage and transcode failures are per-key and end up inside a
//! [`TaskOutcome::Failed`](crate::models::task::TaskOutcome::Failed); only a
//! failed listing page escapes as a [`BatchError`].

use std::{io, time::Duration};
use thiserror::Error;

/// Errors reported by an [`ObjectStorage`](crate::services::storage_client::ObjectStorage) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The expected "absent" signal. Not a failure during the existence probe.
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("storage responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The input bytes could not be turned into the target format.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("could not decode source image: {0}")]
    Decode(String),
    #[error("could not encode target image: {0}")]
    Encode(String),
}

/// Outcome of racing an operation against its deadline.
#[derive(Debug, Error)]
pub enum GuardError<E> {
    #[error("timeout after {}ms for {label}", .duration.as_millis())]
    Timeout { label: String, duration: Duration },
    #[error(transparent)]
    Operation(E),
}

/// Why a single conversion failed.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("timeout after {}ms for {label}", .duration.as_millis())]
    Timeout { label: String, duration: Duration },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
}

impl TaskError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout { .. })
    }
}

impl From<GuardError<StorageError>> for TaskError {
    fn from(err: GuardError<StorageError>) -> Self {
        match err {
            GuardError::Timeout { label, duration } => TaskError::Timeout { label, duration },
            GuardError::Operation(inner) => TaskError::Storage(inner),
        }
    }
}

/// Fatal run-level failure: a listing page could not be fetched.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("listing page {page} (continuation token {token:?}) failed: {source}")]
    Enumeration {
        page: usize,
        token: Option<String>,
        #[source]
        source: TaskError,
    },
}
