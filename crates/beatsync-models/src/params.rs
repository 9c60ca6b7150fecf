//! Tuning parameters forwarded to the external processor.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A form value that did not coerce to its parameter's type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid value for {field}: expected {expected}, got '{value}'")]
pub struct ParamError {
    pub field: &'static str,
    pub expected: &'static str,
    pub value: String,
}

/// Numeric tuning values for one processing run.
///
/// Only type coercion is enforced here; ranges (including
/// `min_size < max_size`) are left for the processor to judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingParams {
    pub pts_per_beat: i64,
    pub ambient_rate: f64,
    pub life_frames: i64,
    pub jitter_px: f64,
    pub min_size: i64,
    pub max_size: i64,
    pub neighbor_links: i64,
}

impl Default for ProcessingParams {
    fn default() -> Self {
        Self {
            pts_per_beat: 20,
            ambient_rate: 5.0,
            life_frames: 10,
            jitter_px: 0.5,
            min_size: 15,
            max_size: 40,
            neighbor_links: 3,
        }
    }
}

impl ProcessingParams {
    /// Form field names understood by [`ProcessingParams::apply_field`].
    pub const FIELDS: [&'static str; 7] = [
        "pts_per_beat",
        "ambient_rate",
        "life_frames",
        "jitter_px",
        "min_size",
        "max_size",
        "neighbor_links",
    ];

    /// Apply one form field.
    ///
    /// Returns `Ok(false)` for names that are not processing parameters.
    pub fn apply_field(&mut self, name: &str, value: &str) -> Result<bool, ParamError> {
        match name {
            "pts_per_beat" => self.pts_per_beat = parse_int("pts_per_beat", value)?,
            "ambient_rate" => self.ambient_rate = parse_float("ambient_rate", value)?,
            "life_frames" => self.life_frames = parse_int("life_frames", value)?,
            "jitter_px" => self.jitter_px = parse_float("jitter_px", value)?,
            "min_size" => self.min_size = parse_int("min_size", value)?,
            "max_size" => self.max_size = parse_int("max_size", value)?,
            "neighbor_links" => self.neighbor_links = parse_int("neighbor_links", value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Render as command-line flags in the processor's expected form.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--pts-per-beat".to_string(),
            self.pts_per_beat.to_string(),
            "--ambient-rate".to_string(),
            format_float(self.ambient_rate),
            "--life-frames".to_string(),
            self.life_frames.to_string(),
            "--jitter-px".to_string(),
            format_float(self.jitter_px),
            "--min-size".to_string(),
            self.min_size.to_string(),
            "--max-size".to_string(),
            self.max_size.to_string(),
            "--neighbor-links".to_string(),
            self.neighbor_links.to_string(),
        ]
    }
}

fn parse_int(field: &'static str, value: &str) -> Result<i64, ParamError> {
    value.trim().parse().map_err(|_| ParamError {
        field,
        expected: "integer",
        value: value.to_string(),
    })
}

fn parse_float(field: &'static str, value: &str) -> Result<f64, ParamError> {
    value.trim().parse().map_err(|_| ParamError {
        field,
        expected: "number",
        value: value.to_string(),
    })
}

/// Floats always carry a decimal point (`5.0`, not `5`).
fn format_float(value: f64) -> String {
    format!("{:?}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_render_expected_flags() {
        let args = ProcessingParams::default().to_args();
        assert_eq!(
            args,
            vec![
                "--pts-per-beat", "20",
                "--ambient-rate", "5.0",
                "--life-frames", "10",
                "--jitter-px", "0.5",
                "--min-size", "15",
                "--max-size", "40",
                "--neighbor-links", "3",
            ]
        );
    }

    #[test]
    fn test_apply_field_coerces_types() {
        let mut params = ProcessingParams::default();
        assert!(params.apply_field("pts_per_beat", " 32 ").unwrap());
        assert!(params.apply_field("ambient_rate", "2").unwrap());
        assert!(params.apply_field("jitter_px", "1.25").unwrap());
        assert_eq!(params.pts_per_beat, 32);
        assert_eq!(params.ambient_rate, 2.0);
        assert_eq!(params.jitter_px, 1.25);
    }

    #[test]
    fn test_apply_field_ignores_unknown_names() {
        let mut params = ProcessingParams::default();
        assert!(!params.apply_field("title", "hello").unwrap());
        assert_eq!(params, ProcessingParams::default());
    }

    #[test]
    fn test_apply_field_rejects_wrong_type() {
        let mut params = ProcessingParams::default();
        let err = params.apply_field("life_frames", "10.5").unwrap_err();
        assert_eq!(err.field, "life_frames");
        assert_eq!(err.expected, "integer");

        assert!(params.apply_field("jitter_px", "wide").is_err());
    }

    #[test]
    fn test_out_of_range_values_are_not_rejected() {
        let mut params = ProcessingParams::default();
        params.apply_field("min_size", "999999").unwrap();
        assert!(params.min_size > params.max_size);
        assert!(params.to_args().contains(&"999999".to_string()));
    }
}
