//! Burn inference backend for object detection.
//!
//! This module provides a `BurnDetector` that implements `DetectionSource`
//! for running segmentation models built with the Burn framework.
//!
//! # Example
//!
//! ```ignore
//! use stabletrack_rs::integration::{BurnDetector, BurnModel, ModelOutput};
//! use burn::backend::NdArray;
//!
//! // Implement BurnModel for your detection model
//! struct MyYoloModel { /* ... */ }
//!
//! impl BurnModel<NdArray> for MyYoloModel {
//!     fn forward(&self, input: burn::tensor::Tensor<NdArray, 4>) -> Vec<ModelOutput> {
//!         // Run inference
//!     }
//! }
//!
//! let model = MyYoloModel::load("model.bin");
//! let detector = BurnDetector::new(model, Default::default(), vec!["cup".into()]);
//! ```

use burn::prelude::*;
use burn::tensor::Tensor;
use ndarray::Axis;

use crate::detection::{DetectionBuilder, RawDetection};
use crate::error::PipelineError;
use crate::integration::DetectionSource;
use crate::raster::{Mask, RgbImage};

/// One model prediction before confidence filtering.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// Bounding box: [x1, y1, x2, y2] or [cx, cy, w, h] depending on model
    pub bbox: [f32; 4],
    /// Confidence score
    pub score: f32,
    /// Index into the detector's class names
    pub class_id: usize,
    /// Frame-sized instance mask, when the model segments
    pub mask: Option<Mask>,
}

/// Trait for Burn-based detection models.
///
/// Implement this trait for your specific model architecture.
pub trait BurnModel<B: Backend>: Send + Sync {
    /// Run forward pass on a `[1, 3, height, width]` tensor scaled to [0, 1].
    fn forward(&self, input: Tensor<B, 4>) -> Vec<ModelOutput>;

    /// Get the expected input size (height, width).
    fn input_size(&self) -> (usize, usize) {
        (640, 640) // Default YOLO input size
    }

    /// Whether bbox output is in XYWH format (vs TLBR).
    fn bbox_is_xywh(&self) -> bool {
        true // Most YOLO variants use XYWH
    }
}

/// Burn-based object detector implementing `DetectionSource`.
pub struct BurnDetector<B: Backend, M: BurnModel<B>> {
    model: M,
    device: B::Device,
    class_names: Vec<String>,
    conf_threshold: f32,
}

impl<B: Backend, M: BurnModel<B>> BurnDetector<B, M> {
    pub fn new(model: M, device: B::Device, class_names: Vec<String>) -> Self {
        Self {
            model,
            device,
            class_names,
            conf_threshold: 0.25,
        }
    }

    /// Set the confidence threshold for filtering detections.
    pub fn with_conf_threshold(mut self, threshold: f32) -> Self {
        self.conf_threshold = threshold;
        self
    }

    /// Convert an interleaved frame to a planar `[1, 3, H, W]` tensor.
    pub fn preprocess(&self, image: &RgbImage) -> Result<Tensor<B, 4>, PipelineError> {
        let (height, width, channels) = image.dim();
        let expected = self.model.input_size();
        if channels != 3 || (height, width) != expected {
            return Err(PipelineError::DimensionMismatch {
                expected,
                got: (height, width),
            });
        }

        let mut data = Vec::with_capacity(height * width * 3);
        for ch in 0..3 {
            data.extend(image.index_axis(Axis(2), ch).iter().map(|&v| v as f32 / 255.0));
        }
        Ok(Tensor::<B, 1>::from_floats(data.as_slice(), &self.device).reshape([1, 3, height, width]))
    }

    fn postprocess(&self, outputs: Vec<ModelOutput>) -> Result<Vec<RawDetection>, PipelineError> {
        outputs
            .into_iter()
            .filter(|d| d.score >= self.conf_threshold)
            .map(|d| {
                let label = self.class_names.get(d.class_id).ok_or_else(|| {
                    PipelineError::Detector(format!("class id {} has no name", d.class_id))
                })?;
                let [a, b, c, e] = d.bbox;
                let builder = DetectionBuilder::new().class_label(label.clone()).confidence(d.score);
                let builder = if self.model.bbox_is_xywh() {
                    builder.xywh(a, b, c, e)
                } else {
                    builder.tlbr(a, b, c, e)
                };
                Ok(match d.mask {
                    Some(mask) => builder.mask(mask).build(),
                    None => builder.build(),
                })
            })
            .collect()
    }
}

impl<B: Backend, M: BurnModel<B>> DetectionSource for BurnDetector<B, M> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, PipelineError> {
        let tensor = self.preprocess(image)?;
        let outputs = self.model.forward(tensor);
        self.postprocess(outputs)
    }

    fn name(&self) -> &str {
        "burn"
    }
}
