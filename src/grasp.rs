//! Ranking of stabilized objects as grasp targets.

use serde::{Deserialize, Serialize};

use crate::raster::Point2;
use crate::tracker::{Rect, TrackState, TrackedObject};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraspConfig {
    pub enabled: bool,
    /// Combined confidence an object needs to be offered.
    pub min_confidence: f32,
    /// Upper bound on returned candidates; 0 keeps all.
    pub max_candidates: usize,
}

impl Default for GraspConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: 0.5,
            max_candidates: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraspCandidate {
    pub track_id: i64,
    pub class_label: String,
    pub center: Point2,
    pub bbox: Rect,
    /// Metres from the camera
    pub depth: f32,
    pub confidence: f32,
}

impl GraspCandidate {
    fn from_object(object: &TrackedObject, depth: f32) -> Self {
        Self {
            track_id: object.track_id,
            class_label: object.class_label.clone(),
            center: object.center,
            bbox: object.bbox,
            depth,
            confidence: object.confidence,
        }
    }
}

/// Objects seen this frame with valid depth, best first.
///
/// Order: confidence descending, then nearer first, then lower track id.
pub fn select_grasp_candidates(objects: &[TrackedObject], config: &GraspConfig) -> Vec<GraspCandidate> {
    if !config.enabled {
        return Vec::new();
    }
    let mut candidates: Vec<GraspCandidate> = objects
        .iter()
        .filter(|o| o.frames_missing == 0)
        .filter(|o| o.state == TrackState::Confirmed || !o.is_tracked())
        .filter(|o| o.confidence >= config.min_confidence)
        .filter_map(|o| match o.depth {
            Some(d) if d > 0.0 => Some(GraspCandidate::from_object(o, d)),
            _ => None,
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.depth.total_cmp(&b.depth))
            .then_with(|| a.track_id.cmp(&b.track_id))
    });
    if config.max_candidates > 0 {
        candidates.truncate(config.max_candidates);
    }
    candidates
}
