//! FFprobe duration probing.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use beatsync_models::DurationProbe;

use crate::error::{MediaError, MediaResult};

/// How to invoke ffprobe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Program name or path
    pub program: String,
    /// Optional script passed as the first argument (wrapper scripts)
    pub script: Option<PathBuf>,
    /// Wall-clock budget for a single probe
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            program: "ffprobe".to_string(),
            script: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Probe the container duration of `path`.
///
/// Never fails: any problem (missing binary, malformed container, timeout)
/// degrades to [`DurationProbe::Unknown`].
pub async fn probe_duration(config: &ProbeConfig, path: impl AsRef<Path>) -> DurationProbe {
    let path = path.as_ref();
    match run_ffprobe(config, path).await {
        Ok(seconds) => {
            debug!(path = %path.display(), seconds, "Probed video duration");
            DurationProbe::Probed(seconds)
        }
        Err(e) => {
            warn!(path = %path.display(), "Could not determine video duration: {}", e);
            DurationProbe::Unknown
        }
    }
}

async fn run_ffprobe(config: &ProbeConfig, path: &Path) -> MediaResult<f64> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(MediaError::InvalidVideo(format!(
            "{} does not exist",
            path.display()
        )));
    }

    // PATH lookup touches the filesystem; keep it off the async workers.
    let program = config.program.clone();
    let found = tokio::task::spawn_blocking(move || which::which(&program).is_ok())
        .await
        .unwrap_or(false);
    if !found {
        return Err(MediaError::FfprobeFailed {
            message: format!("{} not found in PATH", config.program),
            stderr: None,
        });
    }

    let mut cmd = Command::new(&config.program);
    if let Some(script) = &config.script {
        cmd.arg(script);
    }
    cmd.args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(config.timeout, cmd.output())
        .await
        .map_err(|_| MediaError::Timeout(config.timeout.as_secs()))??;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("ffprobe exited with {}", output.status),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_duration_json(&output.stdout)
}

/// Extract `format.duration` from ffprobe's JSON output.
fn parse_duration_json(stdout: &[u8]) -> MediaResult<f64> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;
    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .ok_or_else(|| MediaError::InvalidVideo("No duration in container".to_string()))?;

    if !duration.is_finite() || duration < 0.0 {
        return Err(MediaError::InvalidVideo(format!(
            "Unusable duration {}",
            duration
        )));
    }
    Ok(duration)
}
