//! Detection-mode state machine that drives one frame end to end.

mod label_layout;
mod mode;
mod overlay;

use serde::{Deserialize, Serialize};

pub use label_layout::{LabelLayoutConfig, PlacedLabel, layout_labels};
pub use mode::DetectionMode;
pub use overlay::{
    ConfidenceLevel, Overlay, OverlayItem, RenderConfig, build_overlay, draw_overlay, label_text,
    track_color,
};

use crate::config::PipelineConfig;
use crate::detection::RawDetection;
use crate::error::PipelineError;
use crate::frame_log::{FrameLogRecord, FrameLogger};
use crate::grasp::{GraspCandidate, GraspConfig, select_grasp_candidates};
use crate::integration::{DetectionSource, build_detector};
use crate::raster::{DepthSample, EdgeMap, FrameSize, Point2, RgbImage};
use crate::refine::TransparentCandidate;
use crate::stabilizer::{StabilizedFrame, Stabilizer};
use crate::tracker::{Rect, TrackedObject};

/// One aligned camera frame.
#[derive(Debug, Clone)]
pub struct FrameInput {
    pub index: u64,
    pub image: RgbImage,
    pub depth: Option<DepthSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub bbox: Rect,
    pub points: Vec<Point2>,
}

/// Facial landmark model; runs independently of object tracking.
pub trait FaceLandmarker: Send {
    fn landmarks(&mut self, image: &RgbImage) -> Result<Vec<FaceLandmarks>, PipelineError>;
}

/// Everything handed to rendering and grasp selection for one frame.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub index: u64,
    pub mode: DetectionMode,
    /// Frame with the overlay drawn, or untouched in camera mode
    pub image: RgbImage,
    pub objects: Vec<TrackedObject>,
    pub faces: Vec<FaceLandmarks>,
    pub overlay: Overlay,
    pub edge_map: Option<EdgeMap>,
    pub transparent: Vec<TransparentCandidate>,
    pub grasp_candidates: Vec<GraspCandidate>,
    pub live_tracks: usize,
    pub degraded: bool,
}

impl FrameOutput {
    fn passthrough(index: u64, mode: DetectionMode, image: RgbImage) -> Self {
        Self {
            index,
            mode,
            image,
            objects: Vec::new(),
            faces: Vec::new(),
            overlay: Overlay::default(),
            edge_map: None,
            transparent: Vec::new(),
            grasp_candidates: Vec::new(),
            live_tracks: 0,
            degraded: false,
        }
    }
}

/// Owns all cross-frame state: the mode, the stabilizer's track table and the log.
pub struct Orchestrator {
    mode: DetectionMode,
    pending: Option<DetectionMode>,
    detector: Option<Box<dyn DetectionSource>>,
    faces: Option<Box<dyn FaceLandmarker>>,
    stabilizer: Stabilizer,
    layout: LabelLayoutConfig,
    render: RenderConfig,
    grasp: GraspConfig,
    logger: Option<FrameLogger>,
    detector_failing: bool,
}

impl Orchestrator {
    pub fn new(config: &PipelineConfig, detector: Option<Box<dyn DetectionSource>>) -> Self {
        let has_model = detector.is_some();
        Self {
            mode: config.initial_mode.available(has_model),
            pending: None,
            detector,
            faces: None,
            stabilizer: Stabilizer::new(config),
            layout: config.labels.clone(),
            render: config.render.clone(),
            grasp: config.grasp.clone(),
            logger: None,
            detector_failing: false,
        }
    }

    /// Build the detector and frame log named in the configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let detector = build_detector(&config.detector, &config.tta)?;
        let mut orchestrator = Self::new(config, detector);
        if let Some(path) = &config.frame_log {
            orchestrator.logger = Some(FrameLogger::create(path)?);
        }
        Ok(orchestrator)
    }

    pub fn with_face_landmarker(mut self, landmarker: Box<dyn FaceLandmarker>) -> Self {
        self.faces = Some(landmarker);
        self
    }

    pub fn with_frame_logger(mut self, logger: FrameLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    pub fn has_object_model(&self) -> bool {
        self.detector.is_some()
    }

    /// Switch to `mode` at the start of the next frame.
    pub fn request_mode(&mut self, mode: DetectionMode) {
        self.pending = Some(mode);
    }

    /// Queue the next mode in the cycle, after any mode already queued.
    pub fn cycle_mode(&mut self) {
        let from = self.pending.unwrap_or(self.mode);
        self.pending = Some(from.next(self.has_object_model()));
    }

    fn apply_pending_mode(&mut self) {
        let Some(requested) = self.pending.take() else {
            return;
        };
        let next = requested.available(self.has_object_model());
        if next == self.mode {
            return;
        }
        if next.runs_objects() && !self.mode.runs_objects() {
            self.stabilizer.reset();
        }
        tracing::info!(from = %self.mode, to = %next, "detection mode changed");
        self.mode = next;
    }

    fn detect(&mut self, image: &RgbImage) -> Vec<RawDetection> {
        let Some(detector) = self.detector.as_mut() else {
            return Vec::new();
        };
        match detector.detect(image) {
            Ok(detections) => {
                if self.detector_failing {
                    tracing::info!(detector = detector.name(), "detector recovered");
                    self.detector_failing = false;
                }
                detections
            }
            Err(err) => {
                if !self.detector_failing {
                    tracing::warn!(detector = detector.name(), error = %err, "detector failed, frame has no objects");
                    self.detector_failing = true;
                }
                Vec::new()
            }
        }
    }

    fn landmarks(&mut self, image: &RgbImage) -> Vec<FaceLandmarks> {
        let Some(landmarker) = self.faces.as_mut() else {
            return Vec::new();
        };
        landmarker.landmarks(image).unwrap_or_else(|err| {
            tracing::debug!(error = %err, "face landmarks unavailable");
            Vec::new()
        })
    }

    /// Process one frame atomically.
    pub fn process_frame(&mut self, input: FrameInput) -> FrameOutput {
        self.apply_pending_mode();
        let FrameInput { index, image, depth } = input;
        let mode = self.mode;
        if mode == DetectionMode::Camera {
            return FrameOutput::passthrough(index, mode, image);
        }

        let frame = FrameSize::of_image(&image);
        let stabilized = if mode.runs_objects() {
            let detections = self.detect(&image);
            self.stabilizer.process(frame, depth.as_ref(), detections)
        } else {
            StabilizedFrame::default()
        };
        let faces = if mode.runs_faces() {
            self.landmarks(&image)
        } else {
            Vec::new()
        };

        let overlay = build_overlay(
            &stabilized.objects,
            &stabilized.detections,
            &faces,
            frame,
            &self.render,
            &self.layout,
        );
        let mut image = image;
        draw_overlay(&mut image, &overlay, &self.render);
        let grasp_candidates = select_grasp_candidates(&stabilized.objects, &self.grasp);

        if mode.runs_objects() {
            self.log_frame(index, mode, &stabilized);
        }

        FrameOutput {
            index,
            mode,
            image,
            objects: stabilized.objects,
            faces,
            overlay,
            edge_map: stabilized.edge_map,
            transparent: stabilized.transparent,
            grasp_candidates,
            live_tracks: stabilized.live_tracks,
            degraded: stabilized.degraded,
        }
    }

    fn log_frame(&mut self, index: u64, mode: DetectionMode, frame: &StabilizedFrame) {
        let Some(logger) = self.logger.as_mut() else {
            return;
        };
        let record = FrameLogRecord::new(index, mode, &frame.detections, &frame.objects);
        if let Err(err) = logger.log(&record) {
            tracing::warn!(error = %err, "frame log write failed, logging disabled");
            self.logger = None;
        }
    }

    /// Flush the frame log.
    pub fn finish(&mut self) {
        if let Some(logger) = self.logger.as_mut() {
            if let Err(err) = logger.flush() {
                tracing::warn!(error = %err, "frame log flush failed");
            }
        }
    }
}
