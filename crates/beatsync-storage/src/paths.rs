//! Job id -> file name scheme.

use beatsync_models::JobId;
use unicode_normalization::UnicodeNormalization;

/// Longest sanitized name kept, in bytes (ASCII only after sanitizing).
const MAX_NAME_LEN: usize = 128;

/// Fallback when nothing of the original name survives sanitizing.
const FALLBACK_NAME: &str = "upload";

/// Reduce an untrusted upload name to a safe single path component.
///
/// Accented letters are decomposed (NFKD) so their ASCII base survives.
/// Path separators become word breaks, anything outside `[A-Za-z0-9._-]` is
/// dropped, whitespace runs collapse to `_`, and leading/trailing dots and
/// underscores are stripped. The result never contains `/`, `\` or a leading
/// `.`, so it cannot name a parent directory or a hidden file.
pub fn sanitize_filename(name: &str) -> String {
    let spaced: String = name
        .nfkd()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');

    if trimmed.len() > MAX_NAME_LEN {
        // Keep the tail so the extension survives.
        trimmed[trimmed.len() - MAX_NAME_LEN..]
            .trim_start_matches(|c| c == '.' || c == '_')
            .to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sanitized name of an upload, or a fixed fallback when nothing survives.
pub fn stored_filename(original: &str) -> String {
    let sanitized = sanitize_filename(original);
    if sanitized.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        sanitized
    }
}

/// File name of a stored upload: `<job_id>_<sanitized name>`.
pub fn input_file_name(job_id: &JobId, original: &str) -> String {
    format!("{}_{}", job_id, stored_filename(original))
}

/// File name of a processed artifact: `<job_id>_processed.mp4`.
pub fn output_file_name(job_id: &JobId) -> String {
    format!("{}_processed.mp4", job_id)
}
