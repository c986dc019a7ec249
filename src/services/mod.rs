//! Batch engine and its collaborators.
//!
//! Data flows `enumerator` -> `filter` -> `scheduler` -> `conversion`, with
//! every remote call wrapped by `timeout_guard` and outcomes landing in
//! `report`.

pub mod conversion;
pub mod enumerator;
pub mod filter;
pub mod local_storage;
#[cfg(test)]
pub mod memory_storage;
pub mod report;
pub mod s3_storage;
pub mod scheduler;
pub mod storage_client;
pub mod timeout_guard;
pub mod transcoder;
