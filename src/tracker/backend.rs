//! Interchangeable tracking strategies behind one interface.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::tracker::ema_tracker::EmaTracker;
use crate::tracker::matching::Detection;
use crate::tracker::temporal_tracker::{TemporalTracker, TrackerConfig};
use crate::tracker::track::TrackedObject;

/// Tracking strategy selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerBackend {
    /// Kalman prediction with IoU assignment.
    #[default]
    Kalman,
    /// Same-class IoU matching with exponential smoothing, no motion model.
    Ema,
    /// No tracking: every detection is reported as-is.
    PassThrough,
}

/// A per-frame tracker that owns its track table.
pub trait ObjectTracker: Send {
    /// Fold one frame of detections in and return every live track.
    fn update(&mut self, detections: Vec<Detection>) -> Result<Vec<TrackedObject>, PipelineError>;

    /// Forget all tracks.
    fn reset(&mut self);

    fn name(&self) -> &'static str;

    /// Number of tracks currently held, lost ones included.
    fn live_tracks(&self) -> usize;
}

/// Degenerate tracker: id `-1`, age 1, no smoothing.
#[derive(Debug, Default)]
pub struct PassThroughTracker;

impl ObjectTracker for PassThroughTracker {
    fn update(&mut self, detections: Vec<Detection>) -> Result<Vec<TrackedObject>, PipelineError> {
        Ok(detections.iter().map(TrackedObject::untracked).collect())
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "pass_through"
    }

    fn live_tracks(&self) -> usize {
        0
    }
}

/// Construct the configured tracker.
pub fn build_tracker(config: &TrackerConfig, confirm_frames: u32) -> Box<dyn ObjectTracker> {
    match config.backend {
        TrackerBackend::Kalman => {
            Box::new(TemporalTracker::new(config.clone()).with_confirm_frames(confirm_frames))
        }
        TrackerBackend::Ema => Box::new(EmaTracker::new(config.clone(), confirm_frames)),
        TrackerBackend::PassThrough => Box::new(PassThroughTracker),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Rect;
    use crate::tracker::track::UNTRACKED_ID;

    #[test]
    fn test_pass_through_objects() {
        let mut tracker = PassThroughTracker;
        let det = Detection::new("cup", Rect::new(0.0, 0.0, 10.0, 10.0), 0.7);
        let out = tracker.update(vec![det.clone(), det]).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|t| t.track_id == UNTRACKED_ID && t.age == 1));
        assert!(out.iter().all(|t| t.motion.is_none()));
    }

    #[test]
    fn test_build_tracker_by_backend() {
        let mut config = TrackerConfig::default();
        assert_eq!(build_tracker(&config, 2).name(), "kalman");
        config.backend = TrackerBackend::Ema;
        assert_eq!(build_tracker(&config, 2).name(), "ema");
        config.backend = TrackerBackend::PassThrough;
        assert_eq!(build_tracker(&config, 2).name(), "pass_through");
    }
}
