//! Upload acceptance policy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default allow-list of container extensions.
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 4] = ["mp4", "mov", "avi", "mkv"];

/// Default size ceiling (500 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Default duration ceiling in seconds.
pub const DEFAULT_MAX_DURATION_SECS: f64 = 120.0;

/// Reasons an upload is refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UploadRejection {
    #[error("No video file provided")]
    MissingFile,

    #[error("No file selected")]
    EmptyFilename,

    #[error("Invalid file type. Please upload {0} files.")]
    UnsupportedExtension(String),

    #[error("File is too large. Maximum upload size is {limit} bytes.")]
    TooLarge { size: u64, limit: u64 },

    #[error("Video is too long. Maximum duration is {}.", describe_duration(.limit))]
    TooLong { duration: f64, limit: f64 },
}

impl UploadRejection {
    /// Whether the rejection is a size ceiling (reported as 413 rather than 400).
    pub fn is_too_large(&self) -> bool {
        matches!(self, UploadRejection::TooLarge { .. })
    }
}

/// Outcome of a best-effort duration probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "seconds", rename_all = "snake_case")]
pub enum DurationProbe {
    /// The container reported a duration.
    Probed(f64),
    /// Probing failed; the duration ceiling is not enforced.
    Unknown,
}

/// Extension allow-list and ceilings applied to every submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPolicy {
    /// Lowercase extensions without the dot
    pub allowed_extensions: Vec<String>,
    /// Size ceiling in bytes
    pub max_upload_bytes: u64,
    /// Duration ceiling in seconds
    pub max_duration_secs: f64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }
}

impl UploadPolicy {
    /// Check the filename and declared size of an incoming upload.
    ///
    /// Returns the lowercase extension on acceptance.
    pub fn validate_upload(
        &self,
        filename: &str,
        declared_size: Option<u64>,
    ) -> Result<String, UploadRejection> {
        if filename.is_empty() {
            return Err(UploadRejection::EmptyFilename);
        }

        let extension = self
            .allowed_extension(filename)
            .ok_or_else(|| UploadRejection::UnsupportedExtension(self.describe_extensions()))?;

        if let Some(size) = declared_size {
            self.check_size(size)?;
        }

        Ok(extension)
    }

    /// Check a size against the ceiling.
    pub fn check_size(&self, size: u64) -> Result<(), UploadRejection> {
        if size > self.max_upload_bytes {
            return Err(UploadRejection::TooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }
        Ok(())
    }

    /// Check a probed duration. `Unknown` never rejects.
    pub fn check_duration(&self, probe: DurationProbe) -> Result<(), UploadRejection> {
        match probe {
            DurationProbe::Probed(duration) if duration > self.max_duration_secs => {
                Err(UploadRejection::TooLong {
                    duration,
                    limit: self.max_duration_secs,
                })
            }
            _ => Ok(()),
        }
    }

    /// Lowercase extension of `filename` if it is on the allow-list.
    pub fn allowed_extension(&self, filename: &str) -> Option<String> {
        let (_, ext) = filename.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
            .then_some(ext)
    }

    fn describe_extensions(&self) -> String {
        let upper: Vec<String> = self
            .allowed_extensions
            .iter()
            .map(|e| e.to_ascii_uppercase())
            .collect();
        match upper.split_last() {
            None => "video".to_string(),
            Some((last, [])) => last.clone(),
            Some((last, rest)) => format!("{}, or {}", rest.join(", "), last),
        }
    }
}

fn describe_duration(limit: &f64) -> String {
    let limit = *limit;
    if limit >= 60.0 && limit % 60.0 == 0.0 {
        let minutes = (limit / 60.0) as u64;
        if minutes == 1 {
            "1 minute".to_string()
        } else {
            format!("{} minutes", minutes)
        }
    } else {
        format!("{} seconds", limit)
    }
}
