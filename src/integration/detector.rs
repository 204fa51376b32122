//! Capability interface for detection backends and startup-time backend selection.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::detection::RawDetection;
use crate::error::PipelineError;
use crate::integration::replay::ReplayDetector;
use crate::integration::tta::{TtaConfig, TtaDetector};
use crate::raster::RgbImage;

/// Trait for object detection inference backends.
///
/// Implement this trait to connect any segmentation model to the pipeline.
///
/// # Example
///
/// ```ignore
/// use stabletrack_rs::integration::DetectionSource;
/// use stabletrack_rs::{PipelineError, RawDetection, RgbImage};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl DetectionSource for MyDetector {
///     fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, PipelineError> {
///         // Run inference and return detections
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource: Send {
    /// Run inference on one frame.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, PipelineError>;

    fn name(&self) -> &str {
        "detector"
    }
}

impl DetectionSource for Box<dyn DetectionSource> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, PipelineError> {
        (**self).detect(image)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Which detector the pipeline is wired to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorBackend {
    /// No object model; only face and camera modes are available.
    #[default]
    None,
    /// Detections recorded earlier, one JSON array per frame.
    Replay { path: PathBuf },
}

/// Construct the configured detector, wrapped for test-time augmentation when enabled.
pub fn build_detector(
    backend: &DetectorBackend,
    tta: &TtaConfig,
) -> Result<Option<Box<dyn DetectionSource>>, PipelineError> {
    let detector: Box<dyn DetectionSource> = match backend {
        DetectorBackend::None => return Ok(None),
        DetectorBackend::Replay { path } => Box::new(ReplayDetector::from_file(path)?),
    };
    if tta.enabled {
        return Ok(Some(Box::new(TtaDetector::new(detector, tta.clone()))));
    }
    Ok(Some(detector))
}
