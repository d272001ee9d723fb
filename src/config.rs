use std::path::Path;

use serde::Deserialize;

use crate::error::AlignmentError;
use crate::types::AlignmentLevel;

/// Acoustic feature framing used by the toolkit when the features were computed.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub first_frame_center_s: f64,
    pub frame_width_s: f64,
    pub frame_spacing_s: f64,
}

impl FrameConfig {
    pub const DEFAULT_FIRST_FRAME_CENTER_S: f64 = 0.0125;
    pub const DEFAULT_FRAME_WIDTH_S: f64 = 0.025;
    pub const DEFAULT_FRAME_SPACING_S: f64 = 0.01;

    pub fn validate(&self) -> Result<(), AlignmentError> {
        let all_finite = self.first_frame_center_s.is_finite()
            && self.frame_width_s.is_finite()
            && self.frame_spacing_s.is_finite();
        if !all_finite {
            return Err(AlignmentError::invalid_input(format!(
                "frame parameters must be finite: {self:?}"
            )));
        }
        if self.frame_width_s <= 0.0 || self.frame_spacing_s <= 0.0 {
            return Err(AlignmentError::invalid_input(format!(
                "frame width and spacing must be positive (width={}, spacing={})",
                self.frame_width_s, self.frame_spacing_s
            )));
        }
        if self.first_frame_center_s < 0.0 {
            return Err(AlignmentError::invalid_input(format!(
                "first frame center must be >= 0, got {}",
                self.first_frame_center_s
            )));
        }
        Ok(())
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            first_frame_center_s: Self::DEFAULT_FIRST_FRAME_CENTER_S,
            frame_width_s: Self::DEFAULT_FRAME_WIDTH_S,
            frame_spacing_s: Self::DEFAULT_FRAME_SPACING_S,
        }
    }
}

/// What to do with an utterance that fails to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Return the first error and produce nothing.
    #[default]
    Abort,
    /// Drop the utterance and record it in the batch report.
    Skip,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Skip => "skip",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlignConfig {
    #[serde(default)]
    pub frame: FrameConfig,
    #[serde(default)]
    pub level: AlignmentLevel,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default = "default_true")]
    pub word_position_dependent: bool,
    #[serde(default)]
    pub with_posteriors: bool,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_silences")]
    pub silences: Vec<String>,
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_true() -> bool {
    true
}

fn default_silences() -> Vec<String> {
    vec!["SIL".to_string()]
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            level: AlignmentLevel::default(),
            jobs: default_jobs(),
            word_position_dependent: true,
            with_posteriors: false,
            failure_policy: FailurePolicy::default(),
            silences: default_silences(),
        }
    }
}

impl AlignConfig {
    pub fn load(path: &Path) -> Result<Self, AlignmentError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| AlignmentError::io("read alignment config", e))?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| AlignmentError::json("parse alignment config", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AlignmentError> {
        self.frame.validate()?;
        if self.jobs == 0 {
            return Err(AlignmentError::invalid_input("jobs must be >= 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_config_default() {
        let frame = FrameConfig::default();
        assert_eq!(frame.first_frame_center_s, 0.0125);
        assert_eq!(frame.frame_width_s, 0.025);
        assert_eq!(frame.frame_spacing_s, 0.01);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn frame_config_rejects_zero_spacing() {
        let frame = FrameConfig {
            frame_spacing_s: 0.0,
            ..FrameConfig::default()
        };
        assert!(matches!(
            frame.validate(),
            Err(AlignmentError::InvalidInput { .. })
        ));
    }

    #[test]
    fn align_config_partial_json_uses_defaults() {
        let json = r#"{
            "frame": { "frame_spacing_s": 0.02 },
            "level": "words",
            "jobs": 3,
            "failure_policy": "skip"
        }"#;
        let config: AlignConfig = serde_json::from_str(json).expect("valid config json");
        assert_eq!(config.frame.frame_spacing_s, 0.02);
        assert_eq!(config.frame.frame_width_s, 0.025);
        assert_eq!(config.level, AlignmentLevel::Words);
        assert_eq!(config.jobs, 3);
        assert_eq!(config.failure_policy, FailurePolicy::Skip);
        assert!(config.word_position_dependent);
        assert!(!config.with_posteriors);
        assert_eq!(config.silences, vec!["SIL".to_string()]);
    }

    #[test]
    fn align_config_rejects_zero_jobs() {
        let config = AlignConfig {
            jobs: 0,
            ..AlignConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
