//! API configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use beatsync_media::{ProbeConfig, ProcessorConfig};
use beatsync_models::UploadPolicy;
use beatsync_storage::StorageConfig;

/// API server configuration.
///
/// Built once at startup and shared read-only with every component.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Environment (development/production)
    pub environment: String,
    /// Expose Prometheus metrics at /metrics
    pub metrics_enabled: bool,
    /// Extension allow-list and ceilings
    pub upload: UploadPolicy,
    /// Upload and output directories
    pub storage: StorageConfig,
    /// External processor invocation
    pub processor: ProcessorConfig,
    /// ffprobe invocation
    pub probe: ProbeConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: vec!["*".to_string()],
            environment: "development".to_string(),
            metrics_enabled: true,
            upload: UploadPolicy::default(),
            storage: StorageConfig::default(),
            processor: ProcessorConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let upload = UploadPolicy {
            allowed_extensions: std::env::var("ALLOWED_EXTENSIONS")
                .ok()
                .map(|s| parse_list(&s))
                .filter(|list| !list.is_empty())
                .map(|list| list.into_iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect())
                .unwrap_or(defaults.upload.allowed_extensions),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", defaults.upload.max_upload_bytes),
            max_duration_secs: env_parse("MAX_VIDEO_DURATION_SECS", defaults.upload.max_duration_secs),
        };

        let storage = StorageConfig {
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage.upload_dir),
            processed_dir: std::env::var("PROCESSED_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage.processed_dir),
        };

        let processor = ProcessorConfig {
            program: std::env::var("PROCESSOR_PROGRAM").unwrap_or(defaults.processor.program),
            script: match std::env::var("PROCESSOR_SCRIPT") {
                Ok(s) if s.trim().is_empty() => None,
                Ok(s) => Some(PathBuf::from(s)),
                Err(_) => defaults.processor.script,
            },
            working_dir: std::env::var("PROCESSOR_WORKDIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.processor.working_dir),
            timeout: Duration::from_secs(env_parse(
                "PROCESSOR_TIMEOUT_SECS",
                defaults.processor.timeout.as_secs(),
            )),
            log_level: std::env::var("PROCESSOR_LOG_LEVEL").unwrap_or(defaults.processor.log_level),
        };

        let probe = ProbeConfig {
            program: std::env::var("FFPROBE_PROGRAM").unwrap_or(defaults.probe.program),
            script: defaults.probe.script,
            timeout: Duration::from_secs(env_parse(
                "FFPROBE_TIMEOUT_SECS",
                defaults.probe.timeout.as_secs(),
            )),
        };

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT", defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| parse_list(&s))
                .unwrap_or(defaults.cors_origins),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
            upload,
            storage,
            processor,
            probe,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
