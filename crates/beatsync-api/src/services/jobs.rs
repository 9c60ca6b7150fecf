//! Submission pipeline: probe, validate, run the processor, keep or purge the artifact.

use std::sync::Arc;

use tracing::{info, warn};

use beatsync_media::{probe_duration, ProbeConfig, ProcessOutput, ProcessorCommand, ProcessorConfig, ProcessorRunner};
use beatsync_models::{JobId, ProcessingParams, UploadPolicy};
use beatsync_storage::{ArtifactStore, StoredInput};

use crate::error::ApiResult;
use crate::logging::JobLogger;
use crate::metrics;

/// A stored upload that is removed once the submission finishes.
///
/// `release` removes it in-line; a lease dropped without release (request
/// cancelled mid-processing) removes it on a background task.
pub struct InputLease {
    store: Arc<dyn ArtifactStore>,
    input: StoredInput,
    released: bool,
}

impl InputLease {
    pub fn new(store: Arc<dyn ArtifactStore>, input: StoredInput) -> Self {
        Self {
            store,
            input,
            released: false,
        }
    }

    pub fn input(&self) -> &StoredInput {
        &self.input
    }

    /// Delete the stored upload now.
    pub async fn release(mut self) {
        self.store.delete_input(&self.input.path).await;
        self.released = true;
    }
}

impl Drop for InputLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let store = Arc::clone(&self.store);
        let path = self.input.path.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    store.delete_input(&path).await;
                });
            }
            Err(_) => {
                warn!("No runtime to remove abandoned upload {}", path.display());
            }
        }
    }
}

/// Runs one submission against the external processor.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn ArtifactStore>,
    policy: UploadPolicy,
    processor: ProcessorConfig,
    probe: ProbeConfig,
}

impl JobService {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        policy: UploadPolicy,
        processor: ProcessorConfig,
        probe: ProbeConfig,
    ) -> Self {
        Self {
            store,
            policy,
            processor,
            probe,
        }
    }

    /// Probe, check the duration ceiling and run the processor.
    ///
    /// On success the artifact is left at the canonical output path. On any
    /// failure no artifact remains for `job_id`.
    pub async fn process(
        &self,
        job_id: &JobId,
        input: &StoredInput,
        params: ProcessingParams,
    ) -> ApiResult<ProcessOutput> {
        let logger = JobLogger::new(job_id, "process_video");

        let probe = probe_duration(&self.probe, &input.path).await;
        self.policy.check_duration(probe)?;
        logger.log_progress(&format!("duration check passed ({:?})", probe));

        let output_path = self.store.output_path(job_id);
        let command = ProcessorCommand::new(&self.processor, &input.path, &output_path)
            .params(params)
            .log_level(self.processor.log_level.clone());

        // Cancellation while the child runs must not leave a partial artifact.
        let purge = {
            let store = Arc::clone(&self.store);
            let job_id = *job_id;
            scopeguard::guard((), move |_| {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        let _ = store.delete_output(&job_id).await;
                    });
                }
            })
        };

        let runner = ProcessorRunner::new().with_timeout(self.processor.timeout);
        let started = std::time::Instant::now();
        let result = runner.run(&command).await;
        scopeguard::ScopeGuard::into_inner(purge);

        match result {
            Ok(output) => {
                metrics::record_processor_duration("success", output.elapsed);
                info!(
                    job_id = %job_id,
                    elapsed_ms = output.elapsed.as_millis() as u64,
                    "Processor produced {}",
                    output.output.display()
                );
                Ok(output)
            }
            Err(err) => {
                let kind = err.kind();
                metrics::record_processor_duration(kind.as_str(), started.elapsed());
                logger.log_error(&err.to_string());

                // A tool may write partial output before failing.
                if let Err(e) = self.store.delete_output(job_id).await {
                    logger.log_warning(&format!("failed to purge partial output: {}", e));
                }

                Err(err.into())
            }
        }
    }
}
