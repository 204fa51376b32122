//! Single tracked object for multi-object tracking.

use ndarray::{Array1, Array2};

use crate::error::PipelineError;
use crate::raster::Point2;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::Detection;
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// Track id carried by objects that bypass tracking.
pub const UNTRACKED_ID: i64 = -1;

/// Velocity is scaled by this each frame a track goes unmatched.
const LOST_VELOCITY_DECAY: f64 = 0.5;

/// Kalman filter mean (4-dim) and covariance (4x4).
#[derive(Debug, Clone, PartialEq)]
pub struct MotionState {
    pub mean: Array1<f64>,
    pub covariance: Array2<f64>,
}

/// Exponential smoothing factors applied on each matched update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothing {
    /// Weight of the previous value for near-static objects.
    pub alpha: f32,
    /// Weight used instead when the object moves faster than `moving_speed_thresh`.
    pub moving_alpha: Option<f32>,
    /// Speed (pixels per frame) separating static from moving.
    pub moving_speed_thresh: f32,
}

impl Smoothing {
    pub fn alpha_for(&self, speed: Option<f32>) -> f32 {
        match (self.moving_alpha, speed) {
            (Some(moving), Some(speed)) if speed > self.moving_speed_thresh => moving,
            _ => self.alpha,
        }
    }
}

/// Persistent tracked entity with smoothed geometry and presence counters.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    /// Unique track identifier, `-1` for untracked pass-through objects
    pub track_id: i64,
    /// Class label; fixed for the lifetime of the track
    pub class_label: String,
    /// Current track state
    pub state: TrackState,
    /// Smoothed bounding box (TLWH)
    pub bbox: Rect,
    /// Smoothed center
    pub center: Point2,
    /// Smoothed metric depth
    pub depth: Option<f32>,
    /// Latest detector score
    pub score: f32,
    /// Latest boundary-alignment score
    pub boundary_confidence: f32,
    /// Latest combined confidence
    pub confidence: f32,
    /// Motion filter state, absent for trackers without one
    pub motion: Option<MotionState>,
    /// Frames in which the track was matched; consecutive until confirmed
    pub frames_seen: u32,
    /// Consecutive frames without a match
    pub frames_missing: u32,
    /// Frames since creation, inclusive
    pub age: u32,
    /// Frame ID when track was started
    pub start_frame: u32,
    /// Frame ID of the last match
    pub frame_id: u32,
    /// Index of the detection matched in the current frame
    pub detection_index: Option<usize>,
}

impl TrackedObject {
    /// Start a new track from an unmatched detection.
    pub fn activate(
        detection: &Detection,
        track_id: i64,
        kalman_filter: Option<&KalmanFilter>,
        frame_id: u32,
    ) -> Self {
        let motion = kalman_filter.map(|kf| {
            let (mean, covariance) =
                kf.initiate([detection.center.x as f64, detection.center.y as f64]);
            MotionState { mean, covariance }
        });
        Self {
            track_id,
            class_label: detection.class_label.clone(),
            state: TrackState::New,
            bbox: detection.bbox,
            center: detection.center,
            depth: detection.depth.filter(|d| *d > 0.0),
            score: detection.score,
            boundary_confidence: detection.boundary_confidence,
            confidence: detection.confidence,
            motion,
            frames_seen: 1,
            frames_missing: 0,
            age: 1,
            start_frame: frame_id,
            frame_id,
            detection_index: detection.source_index,
        }
    }

    /// Raw detection wrapped as an object without history.
    pub fn untracked(detection: &Detection) -> Self {
        Self::activate(detection, UNTRACKED_ID, None, 0)
    }

    pub fn is_tracked(&self) -> bool {
        self.track_id >= 0
    }

    pub fn is_confirmed(&self, min_frames: u32) -> bool {
        self.frames_seen >= min_frames
    }

    pub fn velocity(&self) -> Option<(f32, f32)> {
        self.motion
            .as_ref()
            .map(|m| (m.mean[2] as f32, m.mean[3] as f32))
    }

    pub fn speed(&self) -> Option<f32> {
        self.velocity().map(|(vx, vy)| (vx * vx + vy * vy).sqrt())
    }

    /// Smoothed box moved to the motion filter's current position estimate.
    pub fn predicted_rect(&self) -> Rect {
        match &self.motion {
            Some(m) => Rect::from_center(m.mean[0] as f32, m.mean[1] as f32, self.bbox.width, self.bbox.height),
            None => self.bbox,
        }
    }

    pub fn predict(&mut self, kalman_filter: &KalmanFilter) {
        if let Some(motion) = &self.motion {
            let mut mean_to_predict = motion.mean.clone();
            if self.state == TrackState::Lost {
                mean_to_predict[2] *= LOST_VELOCITY_DECAY;
                mean_to_predict[3] *= LOST_VELOCITY_DECAY;
            }
            let (mean, covariance) = kalman_filter.predict(&mean_to_predict, &motion.covariance);
            self.motion = Some(MotionState { mean, covariance });
        }
    }

    /// Fold a matched detection into the track.
    pub fn update(
        &mut self,
        detection: &Detection,
        kalman_filter: Option<&KalmanFilter>,
        frame_id: u32,
        smoothing: &Smoothing,
        confirm_frames: u32,
    ) -> Result<(), PipelineError> {
        let position = match (&self.motion, kalman_filter) {
            (Some(motion), Some(kf)) => {
                let (mean, covariance) = kf.update(
                    &motion.mean,
                    &motion.covariance,
                    [detection.center.x as f64, detection.center.y as f64],
                )?;
                let position = Point2::new(mean[0] as f32, mean[1] as f32);
                self.motion = Some(MotionState { mean, covariance });
                position
            }
            _ => detection.center,
        };

        let alpha = smoothing.alpha_for(self.speed());
        self.center = Point2::new(
            alpha * self.center.x + (1.0 - alpha) * position.x,
            alpha * self.center.y + (1.0 - alpha) * position.y,
        );
        self.bbox = self.bbox.blend(&detection.bbox, alpha);
        self.depth = match (self.depth, detection.depth) {
            (Some(prev), Some(cur)) if prev > 0.0 && cur > 0.0 => Some(alpha * prev + (1.0 - alpha) * cur),
            (_, cur) => cur.filter(|d| *d > 0.0),
        };

        self.score = detection.score;
        self.boundary_confidence = detection.boundary_confidence;
        self.confidence = detection.confidence;
        self.frames_seen += 1;
        self.frames_missing = 0;
        self.age += 1;
        self.frame_id = frame_id;
        self.detection_index = detection.source_index;
        self.state = if self.is_confirmed(confirm_frames) {
            TrackState::Confirmed
        } else {
            TrackState::New
        };
        Ok(())
    }

    /// A miss before confirmation restarts the presence count. Confirmed
    /// tracks keep theirs so recovery after a dropout is immediate.
    pub fn mark_missed(&mut self, confirm_frames: u32) {
        if !self.is_confirmed(confirm_frames) {
            self.frames_seen = 0;
        }
        self.frames_missing += 1;
        self.age += 1;
        self.detection_index = None;
        self.state = TrackState::Lost;
    }

    pub fn mark_removed(&mut self) {
        self.state = TrackState::Removed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smoothing(alpha: f32) -> Smoothing {
        Smoothing {
            alpha,
            moving_alpha: None,
            moving_speed_thresh: 5.0,
        }
    }

    fn det_at(cx: f32, cy: f32, depth: Option<f32>) -> Detection {
        Detection::new("cup", Rect::from_center(cx, cy, 40.0, 40.0), 0.9).with_depth(depth)
    }

    #[test]
    fn test_activate_and_counters() {
        let kf = KalmanFilter::default();
        let mut track = TrackedObject::activate(&det_at(100.0, 100.0, Some(0.8)), 1, Some(&kf), 1);
        assert_eq!(track.frames_seen, 1);
        assert_eq!(track.state, TrackState::New);

        track.predict(&kf);
        track.update(&det_at(101.0, 100.0, Some(0.8)), Some(&kf), 2, &smoothing(0.9), 2).unwrap();
        assert_eq!(track.frames_seen, 2);
        assert_eq!(track.age, 2);
        assert_eq!(track.state, TrackState::Confirmed);

        track.mark_missed(2);
        assert_eq!(track.state, TrackState::Lost);
        assert_eq!(track.frames_missing, 1);
        assert_eq!(track.frames_seen, 2);
        assert_eq!(track.age, 3);

        track.mark_missed(2);
        assert_eq!(track.frames_seen, 2);
    }

    #[test]
    fn test_miss_before_confirmation_restarts_count() {
        let mut track = TrackedObject::activate(&det_at(50.0, 50.0, None), 1, None, 1);
        track.mark_missed(2);
        assert_eq!(track.frames_seen, 0);
        assert_eq!(track.frames_missing, 1);

        track.update(&det_at(50.0, 50.0, None), None, 3, &smoothing(0.9), 2).unwrap();
        assert_eq!(track.frames_seen, 1);
        assert_eq!(track.state, TrackState::New);
    }

    #[test]
    fn test_depth_not_smoothed_through_invalid() {
        let mut track = TrackedObject::activate(&det_at(0.0, 0.0, Some(1.0)), 1, None, 1);
        track.update(&det_at(0.0, 0.0, Some(2.0)), None, 2, &smoothing(0.5), 2).unwrap();
        assert_eq!(track.depth, Some(1.5));

        track.update(&det_at(0.0, 0.0, None), None, 3, &smoothing(0.5), 2).unwrap();
        assert_eq!(track.depth, None);

        track.update(&det_at(0.0, 0.0, Some(0.7)), None, 4, &smoothing(0.5), 2).unwrap();
        assert_eq!(track.depth, Some(0.7));
    }

    #[test]
    fn test_exponential_box_smoothing() {
        let mut track = TrackedObject::activate(&det_at(100.0, 100.0, None), 1, None, 1);
        track.update(&det_at(110.0, 100.0, None), None, 2, &smoothing(0.9), 2).unwrap();
        assert!((track.center.x - 101.0).abs() < 1e-4);
        assert!((track.bbox.x - 81.0).abs() < 1e-4);
    }

    #[test]
    fn test_moving_alpha() {
        let s = Smoothing {
            alpha: 0.97,
            moving_alpha: Some(0.6),
            moving_speed_thresh: 4.0,
        };
        assert_eq!(s.alpha_for(Some(1.0)), 0.97);
        assert_eq!(s.alpha_for(Some(8.0)), 0.6);
        assert_eq!(s.alpha_for(None), 0.97);
    }

    #[test]
    fn test_lost_velocity_decays() {
        let kf = KalmanFilter::default();
        let mut track = TrackedObject::activate(&det_at(0.0, 0.0, None), 1, Some(&kf), 1);
        if let Some(m) = track.motion.as_mut() {
            m.mean[2] = 4.0;
        }
        track.mark_missed(1);
        track.predict(&kf);
        let (vx, _) = track.velocity().unwrap();
        assert!((vx - 2.0).abs() < 1e-6);
    }
}
