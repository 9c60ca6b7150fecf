//! Artifact storage for the BeatSync gateway.
//!
//! This crate provides:
//! - The `ArtifactStore` capability used by the gateway
//! - A local filesystem implementation
//! - Upload filename sanitizing and the job id -> path scheme

pub mod error;
pub mod local;
pub mod paths;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use local::{LocalArtifactStore, StorageConfig};
pub use paths::{input_file_name, output_file_name, sanitize_filename, stored_filename};
pub use store::{ArtifactStore, DeleteOutcome, OutputReader, StoredInput};
