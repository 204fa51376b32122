//! Temporal stabilization of noisy per-frame object detections.
//!
//! Raw detector output (boxes, class labels, contours, masks) is refined by a
//! mask boundary smoother, cross-checked against depth discontinuities, tracked
//! across frames with a constant-velocity Kalman filter and gated by multi-frame
//! consensus before it is handed to rendering and grasp selection.

pub mod config;
pub mod detection;
pub mod error;
pub mod frame_log;
pub mod grasp;
pub mod integration;
pub mod orchestrator;
pub mod raster;
pub mod refine;
pub mod stabilizer;
pub mod tracker;

pub use config::PipelineConfig;
pub use detection::{DetectionBuilder, RawDetection};
pub use error::PipelineError;
pub use orchestrator::{DetectionMode, FrameInput, FrameOutput, Orchestrator};
pub use raster::{Contour, DepthSample, FrameSize, Mask, Point2, RgbImage};
pub use stabilizer::{StabilizedFrame, Stabilizer};
pub use tracker::{
    ConsensusConfig, ConsensusGate, Detection, ObjectTracker, Rect, TemporalTracker,
    TrackState, TrackedObject, TrackerConfig,
};
