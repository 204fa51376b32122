//! Presence gate layered over tracker output.

use serde::{Deserialize, Serialize};

use crate::tracker::track::TrackedObject;

/// Show/hide thresholds, tuned independently of the tracker buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Matches required before a track is shown.
    pub min_frames_to_show: u32,
    /// Consecutive misses a shown track survives.
    pub max_frames_missing: u32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_frames_to_show: 2,
            max_frames_missing: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsensusGate {
    config: ConsensusConfig,
}

impl ConsensusGate {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Warn when the grace window outlives the tracker's track buffer.
    pub fn validate(&self, max_time_lost: u32) {
        if self.config.max_frames_missing > max_time_lost {
            tracing::warn!(
                max_frames_missing = self.config.max_frames_missing,
                max_time_lost,
                "grace window exceeds track buffer; lost tracks vanish before grace ends"
            );
        }
    }

    pub fn admits(&self, object: &TrackedObject) -> bool {
        if !object.is_tracked() {
            return true;
        }
        object.frames_seen >= self.config.min_frames_to_show
            && object.frames_missing <= self.config.max_frames_missing
    }

    /// Keep the objects that downstream consumers should see.
    pub fn filter(&self, objects: Vec<TrackedObject>) -> Vec<TrackedObject> {
        objects.into_iter().filter(|o| self.admits(o)).collect()
    }
}
