//! Integration module for connecting detection backends and camera sources to the pipeline.
//!
//! This module provides the detector capability trait, the bundled detector
//! strategies (replay, test-time augmentation, Burn) and the worker thread
//! that drives the orchestrator frame by frame.

mod detector;
mod replay;
mod tta;
mod worker;

pub use detector::{DetectionSource, DetectorBackend, build_detector};
pub use replay::ReplayDetector;
pub use tta::{TtaConfig, TtaDetector};
pub use worker::{
    FrameSource, FrameTick, PipelineStats, SharedControl, WorkerConfig, WorkerHandle, spawn_worker,
};

#[cfg(feature = "burn-backend")]
mod burn_backend;

#[cfg(feature = "burn-backend")]
pub use burn_backend::{BurnDetector, BurnModel, ModelOutput};
