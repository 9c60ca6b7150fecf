//! Storage capability used by the gateway.

use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use beatsync_models::JobId;

use crate::error::StorageResult;

/// An upload persisted for one job.
#[derive(Debug, Clone)]
pub struct StoredInput {
    pub job_id: JobId,
    /// Name as supplied by the client
    pub original_filename: String,
    /// Safe form of the client name used on disk
    pub sanitized_filename: String,
    /// Absolute path of the stored file
    pub path: PathBuf,
    /// Bytes written
    pub size: u64,
}

/// A readable processed artifact.
pub struct OutputReader {
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
    pub len: u64,
}

impl std::fmt::Debug for OutputReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputReader").field("len", &self.len).finish()
    }
}

/// Result of deleting an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

impl DeleteOutcome {
    pub fn was_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted)
    }
}

/// Where uploads and processed artifacts live.
///
/// Inputs are ephemeral and keyed by job id plus a sanitized name; outputs
/// sit at a path that is a pure function of the job id.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stream an upload into the input area.
    ///
    /// A partially written file is removed before an error is returned.
    async fn store_input(
        &self,
        job_id: &JobId,
        filename: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<StoredInput>;

    /// Canonical artifact path for `job_id`. No I/O.
    fn output_path(&self, job_id: &JobId) -> PathBuf;

    /// Whether an artifact exists for `job_id`.
    async fn exists_output(&self, job_id: &JobId) -> bool;

    /// Open the artifact for streaming. `StorageError::NotFound` if absent.
    async fn open_output(&self, job_id: &JobId) -> StorageResult<OutputReader>;

    /// Delete the artifact. Absence is reported, not an error.
    async fn delete_output(&self, job_id: &JobId) -> StorageResult<DeleteOutcome>;

    /// Remove a stored input. Best effort; failures are logged only.
    async fn delete_input(&self, path: &Path);

    /// Verify the backing locations are usable.
    async fn check_ready(&self) -> StorageResult<()>;
}
