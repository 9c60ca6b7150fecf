//! Shared data models for the BeatSync gateway.
//!
//! This crate provides:
//! - Job identifiers binding a submission to its input/output files
//! - Processing parameters forwarded to the external processor
//! - The upload policy (extension allow-list, size and duration ceilings)

pub mod job;
pub mod params;
pub mod upload;

// Re-export common types
pub use job::JobId;
pub use params::{ParamError, ProcessingParams};
pub use upload::{DurationProbe, UploadPolicy, UploadRejection};
