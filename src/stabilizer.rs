//! Per-frame composition of mask smoothing, depth validation, tracking and consensus.

use crate::config::PipelineConfig;
use crate::detection::RawDetection;
use crate::error::PipelineError;
use crate::raster::{DepthSample, EdgeMap, FrameSize};
use crate::refine::{
    DepthBoundaryValidator, MaskSmoother, TransparentCandidate, TransparentConfig,
    find_transparent_candidates,
};
use crate::tracker::{
    ConsensusGate, Detection, ObjectTracker, PassThroughTracker, Rect, TrackedObject, build_tracker,
};

/// Window radius (pixels) for sampling object depth around its center.
const DEPTH_SAMPLE_RADIUS: usize = 2;

/// Everything one frame produced.
#[derive(Debug, Clone, Default)]
pub struct StabilizedFrame {
    /// Detections after mask refinement, in detector order
    pub detections: Vec<RawDetection>,
    /// Objects that passed the consensus gate
    pub objects: Vec<TrackedObject>,
    /// Tracks held by the tracker, shown or not
    pub live_tracks: usize,
    /// Depth-edge raster, present when a depth frame was used
    pub edge_map: Option<EdgeMap>,
    pub transparent: Vec<TransparentCandidate>,
    /// The tracker has fallen back to pass-through
    pub degraded: bool,
}

/// Owns the track table; every other stage is stateless.
pub struct Stabilizer {
    smoother: MaskSmoother,
    validator: DepthBoundaryValidator,
    transparent: TransparentConfig,
    tracker: Box<dyn ObjectTracker>,
    gate: ConsensusGate,
    degraded: bool,
}

impl Stabilizer {
    pub fn new(config: &PipelineConfig) -> Self {
        let gate = ConsensusGate::new(config.consensus);
        gate.validate(config.tracker.max_time_lost());
        let tracker = build_tracker(&config.tracker, config.consensus.min_frames_to_show);
        tracing::info!(tracker = tracker.name(), "stabilizer ready");
        Self {
            smoother: MaskSmoother::new(config.smoothing.clone()),
            validator: DepthBoundaryValidator::new(config.depth_validation.clone()),
            transparent: config.transparent.clone(),
            tracker,
            gate,
            degraded: false,
        }
    }

    pub fn tracker_name(&self) -> &'static str {
        self.tracker.name()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Drop all tracks. Ids keep counting up.
    pub fn reset(&mut self) {
        self.tracker.reset();
    }

    /// Run one frame through every stage. Never fails; stage errors turn into fallbacks.
    pub fn process(
        &mut self,
        frame: FrameSize,
        depth: Option<&DepthSample>,
        mut detections: Vec<RawDetection>,
    ) -> StabilizedFrame {
        for det in detections.iter_mut() {
            if let Some(mask) = det.mask.as_ref() {
                det.mask = Some(self.smoother.smooth(mask, frame));
            }
        }

        let depth = depth.filter(|d| {
            let matches = d.size() == frame;
            if !matches {
                tracing::debug!(
                    depth_width = d.size().width,
                    depth_height = d.size().height,
                    frame_width = frame.width,
                    frame_height = frame.height,
                    "depth frame not aligned, ignoring it"
                );
            }
            matches
        });

        let depth_cfg = self.validator.config();
        let boxes: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();
        let (boundary, edge_map, transparent) = match depth {
            Some(depth) => {
                let contours: Vec<_> = detections.iter().map(|d| d.contour.clone()).collect();
                let validation = self.validator.validate(depth, &boxes, &contours);
                let transparent = find_transparent_candidates(
                    depth,
                    &boxes,
                    depth_cfg.min_depth,
                    depth_cfg.max_depth,
                    &self.transparent,
                );
                (validation.confidences, Some(validation.edge_map), transparent)
            }
            None => (vec![1.0; detections.len()], None, Vec::new()),
        };

        let tracker_input: Vec<Detection> = detections
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let metric = depth.and_then(|d| {
                    d.depth_at(raw.center, DEPTH_SAMPLE_RADIUS, depth_cfg.min_depth, depth_cfg.max_depth)
                });
                Detection::from_raw(raw, i)
                    .with_depth(metric)
                    .with_boundary_confidence(boundary[i], depth_cfg.min_confidence)
            })
            .collect();

        let tracked = match self.tracker.update(tracker_input.clone()) {
            Ok(tracked) => tracked,
            Err(err) => {
                self.fall_back(&err);
                tracker_input.iter().map(TrackedObject::untracked).collect()
            }
        };
        let live_tracks = self.tracker.live_tracks();
        let objects = self.gate.filter(tracked);

        tracing::debug!(
            raw = detections.len(),
            shown = objects.len(),
            live_tracks,
            "frame stabilized"
        );

        StabilizedFrame {
            detections,
            objects,
            live_tracks,
            edge_map,
            transparent,
            degraded: self.degraded,
        }
    }

    fn fall_back(&mut self, err: &PipelineError) {
        if !self.degraded {
            tracing::warn!(
                tracker = self.tracker.name(),
                error = %err,
                "tracker failed, continuing untracked for this session"
            );
            self.degraded = true;
        }
        self.tracker = Box::new(PassThroughTracker);
    }
}
