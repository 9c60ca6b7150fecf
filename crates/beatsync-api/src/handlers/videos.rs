//! Video submission, download and cleanup handlers.

use std::io;

use axum::body::Body;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use futures_util::TryStreamExt;
use serde::Serialize;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{info, Instrument};

use beatsync_models::{JobId, ProcessingParams, UploadRejection};
use beatsync_storage::{StorageError, StoredInput};

use crate::error::{ApiError, ApiResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::services::InputLease;
use crate::state::AppState;

/// Multipart field carrying the video.
const VIDEO_FIELD: &str = "video";

/// Successful submission response.
#[derive(Serialize)]
pub struct ProcessVideoResponse {
    pub success: bool,
    #[serde(rename = "videoId")]
    pub video_id: String,
    pub message: String,
}

/// Cleanup response.
#[derive(Serialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub message: String,
}

/// Accept an upload, run the processor on it and report the job id.
pub async fn process_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ProcessVideoResponse>> {
    let job_id = JobId::new();
    let logger = JobLogger::new(&job_id, "process_video");

    let result = submit(&state, &job_id, &logger, &headers, multipart)
        .instrument(logger.create_span())
        .await;

    match result {
        Ok(()) => {
            metrics::record_job_succeeded();
            logger.log_completion("video processed");
            Ok(Json(ProcessVideoResponse {
                success: true,
                video_id: job_id.to_string(),
                message: "Video processed successfully".to_string(),
            }))
        }
        Err(err) => {
            metrics::record_job_failed(err.kind());
            logger.log_error(&err.to_string());
            Err(err)
        }
    }
}

async fn submit(
    state: &AppState,
    job_id: &JobId,
    logger: &JobLogger,
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<()> {
    metrics::record_job_submitted();
    logger.log_start("reading upload");

    if let Some(declared) = content_length(headers) {
        state.config.upload.check_size(declared)?;
    }

    let mut multipart = multipart.map_err(|_| ApiError::from(UploadRejection::MissingFile))?;

    let mut params = ProcessingParams::default();
    let mut lease: Option<InputLease> = None;

    let read = read_form(state, job_id, &mut multipart, &mut params, &mut lease).await;

    let outcome = match (read, &lease) {
        (Err(err), _) => Err(err),
        (Ok(()), None) => Err(UploadRejection::MissingFile.into()),
        (Ok(()), Some(lease)) => run_job(state, job_id, logger, lease.input(), params).await,
    };

    // The upload never outlives the request, whatever the outcome.
    if let Some(lease) = lease {
        lease.release().await;
    }

    outcome
}

/// Drain the form: store the first `video` file and collect parameters.
async fn read_form(
    state: &AppState,
    job_id: &JobId,
    multipart: &mut Multipart,
    params: &mut ProcessingParams,
    lease: &mut Option<InputLease>,
) -> ApiResult<()> {
    let policy = &state.config.upload;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == VIDEO_FIELD {
            // A text part named `video` is not a file.
            let Some(filename) = field.file_name().map(str::to_string) else {
                continue;
            };
            if lease.is_some() {
                continue;
            }

            policy.validate_upload(&filename, None)?;

            let reader = StreamReader::new(field.map_err(io::Error::other));
            tokio::pin!(reader);

            let stored = state
                .store
                .store_input(job_id, &filename, &mut reader)
                .await
                .map_err(upload_error)?;

            let size = stored.size;
            *lease = Some(InputLease::new(state.store.clone(), stored));
            policy.check_size(size)?;

            info!(job_id = %job_id, size, "Stored upload {}", filename);
        } else if ProcessingParams::FIELDS.contains(&name.as_str()) {
            let value = field.text().await?;
            params.apply_field(&name, &value)?;
        }
    }

    Ok(())
}

async fn run_job(
    state: &AppState,
    job_id: &JobId,
    logger: &JobLogger,
    input: &StoredInput,
    params: ProcessingParams,
) -> ApiResult<()> {
    logger.log_progress(&format!(
        "processing {} (stored as {})",
        input.original_filename, input.sanitized_filename
    ));
    state.jobs.process(job_id, input, params).await?;
    Ok(())
}

/// Stream a processed video back to the client.
pub async fn download_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let job_id = JobId::parse(&id).ok_or_else(video_not_found)?;

    let output = state
        .store
        .open_output(&job_id)
        .await
        .map_err(|e| match e {
            StorageError::NotFound(_) => video_not_found(),
            other => ApiError::Storage(other),
        })?;

    metrics::record_artifact_downloaded();

    let body = Body::from_stream(ReaderStream::new(output.reader));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"beatsync_video_{}.mp4\"", job_id),
        )
        .header(header::CONTENT_LENGTH, output.len)
        .body(body)
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// Delete a processed video.
pub async fn cleanup_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CleanupResponse>> {
    let Some(job_id) = JobId::parse(&id) else {
        return Ok(Json(cleanup_not_found()));
    };

    let outcome = state.store.delete_output(&job_id).await?;

    if outcome.was_deleted() {
        metrics::record_artifact_deleted();
        info!(job_id = %job_id, "Cleaned up processed video");
        Ok(Json(CleanupResponse {
            success: true,
            message: "Video cleaned up successfully".to_string(),
        }))
    } else {
        Ok(Json(cleanup_not_found()))
    }
}

fn video_not_found() -> ApiError {
    ApiError::not_found("Video not found")
}

fn cleanup_not_found() -> CleanupResponse {
    CleanupResponse {
        success: false,
        message: "Video not found".to_string(),
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Body read failures (including the size limit) surface as multipart errors.
fn upload_error(err: StorageError) -> ApiError {
    match err {
        StorageError::Io(io_err)
            if io_err
                .get_ref()
                .is_some_and(|inner| inner.is::<MultipartError>()) =>
        {
            match io_err.into_inner().map(|inner| inner.downcast::<MultipartError>()) {
                Some(Ok(multipart_err)) => ApiError::from(*multipart_err),
                _ => ApiError::internal("upload stream failed"),
            }
        }
        other => ApiError::Storage(other),
    }
}
