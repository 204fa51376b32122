mod backend;
mod consensus;
mod ema_tracker;
mod kalman_filter;
pub mod matching;
mod rect;
mod temporal_tracker;
mod track;
mod track_state;

pub use backend::{ObjectTracker, PassThroughTracker, TrackerBackend, build_tracker};
pub use consensus::{ConsensusConfig, ConsensusGate};
pub use ema_tracker::EmaTracker;
pub use kalman_filter::{KalmanFilter, MotionNoise};
pub use matching::{AssignmentMethod, Detection};
pub use rect::{Rect, iou_batch};
pub use temporal_tracker::{TemporalTracker, TrackerConfig};
pub use track::{MotionState, Smoothing, TrackedObject, UNTRACKED_ID};
pub use track_state::TrackState;
