use serde::{Deserialize, Serialize};

/// Track state enumeration for object tracking lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Newly created track, not yet confirmed
    #[default]
    New,
    /// Seen for enough frames to be trusted
    Confirmed,
    /// Unmatched in the latest frame
    Lost,
    /// Removed from tracking
    Removed,
}
