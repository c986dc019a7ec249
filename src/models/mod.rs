//! Core data models for the batch converter.
//!
//! These are plain values passed between the storage client, the per-key
//! conversion task and the run report. None of them perform I/O.

pub mod object;
pub mod task;
