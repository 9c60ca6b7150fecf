//! Local filesystem artifact store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, warn};

use beatsync_models::JobId;

use crate::error::{StorageError, StorageResult};
use crate::paths::{input_file_name, output_file_name, stored_filename};
use crate::store::{ArtifactStore, DeleteOutcome, OutputReader, StoredInput};

/// Directory layout for the local store.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Ephemeral uploads
    pub upload_dir: PathBuf,
    /// Processed artifacts
    pub processed_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            processed_dir: PathBuf::from("processed"),
        }
    }
}

/// Artifact store backed by two local directories.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    upload_dir: PathBuf,
    processed_dir: PathBuf,
}

impl LocalArtifactStore {
    /// Create both directories if needed and resolve them to absolute paths.
    pub fn new(config: &StorageConfig) -> StorageResult<Self> {
        let upload_dir = prepare_dir(&config.upload_dir)?;
        let processed_dir = prepare_dir(&config.processed_dir)?;

        info!(
            upload_dir = %upload_dir.display(),
            processed_dir = %processed_dir.display(),
            "Local artifact store ready"
        );

        Ok(Self {
            upload_dir,
            processed_dir,
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// Resolve an input path and make sure it stays inside the upload area.
    fn input_path(&self, job_id: &JobId, filename: &str) -> StorageResult<PathBuf> {
        let name = input_file_name(job_id, filename);
        let path = self.upload_dir.join(&name);
        if path.parent() != Some(self.upload_dir.as_path()) {
            return Err(StorageError::InvalidKey(name));
        }
        Ok(path)
    }
}

/// Remove a file, treating absence as success and logging other failures.
async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("Removed upload: {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove upload {}: {}", path.display(), e),
    }
}

fn prepare_dir(dir: &Path) -> StorageResult<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| {
        StorageError::config_error(format!("cannot create {}: {}", dir.display(), e))
    })?;
    dir.canonicalize().map_err(|e| {
        StorageError::config_error(format!("cannot resolve {}: {}", dir.display(), e))
    })
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn store_input(
        &self,
        job_id: &JobId,
        filename: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<StoredInput> {
        let sanitized_filename = stored_filename(filename);
        let path = self.input_path(job_id, filename)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        // Only reached when the caller drops this future mid-copy.
        let abandoned = scopeguard::guard(path, |path| {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        remove_quietly(&path).await;
                    });
                }
                Err(_) => warn!("No runtime to remove partial upload {}", path.display()),
            }
        });

        let written = async {
            let size = tokio::io::copy(reader, &mut file).await?;
            file.flush().await?;
            Ok::<_, std::io::Error>(size)
        }
        .await;
        drop(file);

        let path = scopeguard::ScopeGuard::into_inner(abandoned);

        match written {
            Ok(size) => {
                debug!(job_id = %job_id, size, "Stored upload: {}", path.display());
                Ok(StoredInput {
                    job_id: *job_id,
                    original_filename: filename.to_string(),
                    sanitized_filename,
                    path,
                    size,
                })
            }
            Err(e) => {
                remove_quietly(&path).await;
                Err(StorageError::Io(e))
            }
        }
    }

    fn output_path(&self, job_id: &JobId) -> PathBuf {
        self.processed_dir.join(output_file_name(job_id))
    }

    async fn exists_output(&self, job_id: &JobId) -> bool {
        fs::metadata(self.output_path(job_id))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn open_output(&self, job_id: &JobId) -> StorageResult<OutputReader> {
        let path = self.output_path(job_id);
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::not_found(job_id.to_string()));
            }
            Err(e) => return Err(StorageError::Io(e)),
        };
        let len = file.metadata().await?.len();

        Ok(OutputReader {
            reader: Box::pin(file),
            len,
        })
    }

    async fn delete_output(&self, job_id: &JobId) -> StorageResult<DeleteOutcome> {
        let path = self.output_path(job_id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(job_id = %job_id, "Deleted processed video");
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(StorageError::delete_failed(format!("{}: {}", job_id, e))),
        }
    }

    async fn delete_input(&self, path: &Path) {
        remove_quietly(path).await;
    }

    async fn check_ready(&self) -> StorageResult<()> {
        for dir in [&self.upload_dir, &self.processed_dir] {
            let meta = fs::metadata(dir).await.map_err(|e| {
                StorageError::config_error(format!("{}: {}", dir.display(), e))
            })?;
            if !meta.is_dir() {
                return Err(StorageError::config_error(format!(
                    "{} is not a directory",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}
