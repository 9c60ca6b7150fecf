//! External tool wrappers for the BeatSync gateway.
//!
//! This crate provides:
//! - Best-effort duration probing via ffprobe
//! - Type-safe command building for the beat-sync processor
//! - Process execution with captured output, timeout and process-group kill

pub mod error;
pub mod probe;
pub mod processor;

pub use error::{FailureKind, MediaError, MediaResult};
pub use probe::{probe_duration, ProbeConfig};
pub use processor::{ProcessOutput, ProcessorCommand, ProcessorConfig, ProcessorRunner};
