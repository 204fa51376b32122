//! Declarative pipeline configuration, loaded once at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::grasp::GraspConfig;
use crate::integration::{DetectorBackend, TtaConfig, WorkerConfig};
use crate::orchestrator::{DetectionMode, LabelLayoutConfig, RenderConfig};
use crate::refine::{DepthValidationConfig, MaskSmootherConfig, TransparentConfig};
use crate::tracker::{ConsensusConfig, TrackerConfig};

/// Every tunable of the pipeline. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub initial_mode: DetectionMode,
    pub smoothing: MaskSmootherConfig,
    pub depth_validation: DepthValidationConfig,
    pub transparent: TransparentConfig,
    pub tracker: TrackerConfig,
    pub consensus: ConsensusConfig,
    pub labels: LabelLayoutConfig,
    pub render: RenderConfig,
    pub grasp: GraspConfig,
    pub detector: DetectorBackend,
    pub tta: TtaConfig,
    pub worker: WorkerConfig,
    /// JSON-lines file receiving one record per processed frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_log: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        tracing::info!(path = %path.display(), "pipeline configuration loaded");
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values no stage can work with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let s = &self.smoothing;
        for (name, size) in [
            ("smoothing.small_kernel", s.small_kernel),
            ("smoothing.medium_kernel", s.medium_kernel),
            ("smoothing.large_kernel", s.large_kernel),
        ] {
            if size == 0 {
                return Err(invalid(name, "must be positive"));
            }
        }
        if s.small_area_fraction > s.large_area_fraction {
            return Err(invalid(
                "smoothing.small_area_fraction",
                "must not exceed large_area_fraction",
            ));
        }

        let d = &self.depth_validation;
        if !(d.min_depth >= 0.0 && d.min_depth < d.max_depth) {
            return Err(invalid("depth_validation.min_depth", "must be below max_depth"));
        }
        if !(0.0..=1.0).contains(&d.min_confidence) {
            return Err(invalid("depth_validation.min_confidence", "must be in [0, 1]"));
        }
        if d.bilateral_diameter == 0 {
            return Err(invalid("depth_validation.bilateral_diameter", "must be positive"));
        }
        if d.discontinuity_threshold <= 0.0 {
            return Err(invalid("depth_validation.discontinuity_threshold", "must be positive"));
        }

        let t = &self.tracker;
        if !(0.0..1.0).contains(&t.smoothing_alpha) {
            return Err(invalid("tracker.smoothing_alpha", "must be in [0, 1)"));
        }
        if let Some(alpha) = t.moving_alpha {
            if !(0.0..1.0).contains(&alpha) {
                return Err(invalid("tracker.moving_alpha", "must be in [0, 1)"));
            }
        }
        if t.frame_rate <= 0.0 {
            return Err(invalid("tracker.frame_rate", "must be positive"));
        }
        if !(0.0..=1.0).contains(&t.min_iou) {
            return Err(invalid("tracker.min_iou", "must be in [0, 1]"));
        }
        if t.low_score_thresh > t.track_thresh {
            return Err(invalid("tracker.low_score_thresh", "must not exceed track_thresh"));
        }

        if self.consensus.min_frames_to_show == 0 {
            return Err(invalid("consensus.min_frames_to_show", "must be at least 1"));
        }
        if self.render.medium_confidence > self.render.high_confidence {
            return Err(invalid("render.medium_confidence", "must not exceed high_confidence"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> PipelineError {
    PipelineError::Config(format!("{field} {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{AssignmentMethod, TrackerBackend};
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "tracker": { "smoothing_alpha": 0.97, "backend": "ema", "assignment": "optimal" },
                "consensus": { "min_frames_to_show": 3 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.tracker.smoothing_alpha, 0.97);
        assert_eq!(config.tracker.backend, TrackerBackend::Ema);
        assert_eq!(config.tracker.assignment, AssignmentMethod::Optimal);
        assert_eq!(config.tracker.track_buffer, 60);
        assert_eq!(config.consensus.min_frames_to_show, 3);
        assert_eq!(config.consensus.max_frames_missing, 3);
        assert!(config.smoothing.enabled);
    }

    #[test]
    fn test_rejects_bad_alpha() {
        let err = PipelineConfig::from_json_str(r#"{"tracker": {"smoothing_alpha": 1.0}}"#).unwrap_err();
        assert!(matches!(err, PipelineError::Config(msg) if msg.contains("smoothing_alpha")));
    }

    #[test]
    fn test_rejects_inverted_depth_range() {
        let err = PipelineConfig::from_json_str(
            r#"{"depth_validation": {"min_depth": 2.0, "max_depth": 1.0}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_kernel() {
        let mut config = PipelineConfig::default();
        config.smoothing.medium_kernel = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        let err = PipelineConfig::from_json_str("{ tracker: ").unwrap_err();
        assert!(matches!(err, PipelineError::Json(_)));
    }

    #[test]
    fn test_file_round_trip() {
        let mut config = PipelineConfig::default();
        config.depth_validation.enabled = false;
        config.frame_log = Some(PathBuf::from("session.jsonl"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_json_string().unwrap().as_bytes()).unwrap();
        let loaded = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
