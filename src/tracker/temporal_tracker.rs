//! Motion-predictive multi-object tracker with exponential smoothing.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::tracker::backend::{ObjectTracker, TrackerBackend};
use crate::tracker::kalman_filter::{KalmanFilter, MotionNoise};
use crate::tracker::matching::{self, AssignmentMethod, AssignmentResult, Detection};
use crate::tracker::rect::Rect;
use crate::tracker::track::{Smoothing, TrackedObject};
use crate::tracker::track_state::TrackState;

/// Cost ceiling for the second, low-score association.
const LOW_SCORE_MATCH_THRESH: f32 = 0.5;

/// IoU above which a live and a lost track of the same class are duplicates.
const DUPLICATE_IOU: f32 = 0.85;

/// Configuration for the temporal tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub backend: TrackerBackend,
    /// Detections at or above this score take part in the first association.
    pub track_thresh: f32,
    /// Detections at or below this score are discarded.
    pub low_score_thresh: f32,
    /// Minimum score for an unmatched detection to start a track.
    pub new_track_thresh: f32,
    /// Maximum fused cost `1 - iou * score` for a match.
    pub match_thresh: f32,
    /// IoU floor below which a pair is never matched.
    pub min_iou: f32,
    /// Frames a lost track survives at 30 fps.
    pub track_buffer: u32,
    pub frame_rate: f32,
    /// Weight of the previous value in box, center and depth smoothing.
    pub smoothing_alpha: f32,
    /// Weight used instead of `smoothing_alpha` for fast-moving tracks.
    pub moving_alpha: Option<f32>,
    /// Speed (pixels per frame) above which `moving_alpha` applies.
    pub moving_speed_thresh: f32,
    pub assignment: AssignmentMethod,
    pub motion_noise: MotionNoise,
    /// Grid cell (pixels) for the EMA tracker's position fallback.
    pub grid_size: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            backend: TrackerBackend::Kalman,
            track_thresh: 0.5,
            low_score_thresh: 0.1,
            new_track_thresh: 0.6,
            match_thresh: 0.8,
            min_iou: 0.1,
            track_buffer: 60,
            frame_rate: 30.0,
            smoothing_alpha: 0.95,
            moving_alpha: None,
            moving_speed_thresh: 4.0,
            assignment: AssignmentMethod::Greedy,
            motion_noise: MotionNoise::default(),
            grid_size: 50.0,
        }
    }
}

impl TrackerConfig {
    /// Lost-track lifetime in frames at the configured frame rate.
    pub fn max_time_lost(&self) -> u32 {
        (self.frame_rate / 30.0 * self.track_buffer as f32) as u32
    }

    pub fn smoothing(&self) -> Smoothing {
        Smoothing {
            alpha: self.smoothing_alpha,
            moving_alpha: self.moving_alpha,
            moving_speed_thresh: self.moving_speed_thresh,
        }
    }
}

/// Kalman-filter tracker owning the track table.
///
/// Tracks are only observable through the clones returned by [`update`](ObjectTracker::update).
pub struct TemporalTracker {
    tracks: Vec<TrackedObject>,
    frame_id: u32,
    next_id: i64,
    config: TrackerConfig,
    max_time_lost: u32,
    confirm_frames: u32,
    kalman_filter: KalmanFilter,
}

impl TemporalTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let max_time_lost = config.max_time_lost();
        let kalman_filter = KalmanFilter::new(config.motion_noise);
        Self {
            tracks: Vec::new(),
            frame_id: 0,
            next_id: 1,
            config,
            max_time_lost,
            confirm_frames: 1,
            kalman_filter,
        }
    }

    /// Frames a track needs before its state reads `Confirmed`.
    pub fn with_confirm_frames(mut self, frames: u32) -> Self {
        self.confirm_frames = frames.max(1);
        self
    }

    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn associate(
        &self,
        rows: &[usize],
        detections: &[Detection],
        thresh: f32,
        fuse_scores: bool,
    ) -> Result<AssignmentResult, PipelineError> {
        let predicted: Vec<Rect> = rows.iter().map(|&i| self.tracks[i].predicted_rect()).collect();
        let previous: Vec<Rect> = rows.iter().map(|&i| self.tracks[i].bbox).collect();
        let classes: Vec<&str> = rows.iter().map(|&i| self.tracks[i].class_label.as_str()).collect();
        let ids: Vec<i64> = rows.iter().map(|&i| self.tracks[i].track_id).collect();

        let costs = matching::gated_costs(
            &predicted,
            &previous,
            &classes,
            detections,
            self.config.min_iou,
            fuse_scores,
        );
        matching::assign(&costs, &ids, thresh, self.config.assignment)
    }

    fn step(&mut self, detections: Vec<Detection>) -> Result<Vec<TrackedObject>, PipelineError> {
        self.frame_id += 1;
        let smoothing = self.config.smoothing();

        // Step 1: Split detections into high-score and low-score
        let mut detections_high = Vec::new();
        let mut detections_low = Vec::new();
        for det in detections {
            if det.score >= self.config.track_thresh {
                detections_high.push(det);
            } else if det.score > self.config.low_score_thresh {
                detections_low.push(det);
            }
        }

        // Step 2: Predict every track forward one frame
        for track in self.tracks.iter_mut() {
            track.predict(&self.kalman_filter);
        }

        // Step 3: First association, all tracks against high score detections
        let all_rows: Vec<usize> = (0..self.tracks.len()).collect();
        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = self.associate(&all_rows, &detections_high, self.config.match_thresh, true)?;

        let mut matched = vec![false; self.tracks.len()];
        for (itrack, idet) in matches {
            self.tracks[itrack].update(
                &detections_high[idet],
                Some(&self.kalman_filter),
                self.frame_id,
                &smoothing,
                self.confirm_frames,
            )?;
            matched[itrack] = true;
        }

        // Step 4: Second association, tracks seen last frame against low score detections
        let second_rows: Vec<usize> = unmatched_tracks
            .into_iter()
            .filter(|&i| self.tracks[i].state != TrackState::Lost)
            .collect();
        let second = self.associate(&second_rows, &detections_low, LOW_SCORE_MATCH_THRESH, false)?;
        for (irow, idet) in second.matches {
            let itrack = second_rows[irow];
            self.tracks[itrack].update(
                &detections_low[idet],
                Some(&self.kalman_filter),
                self.frame_id,
                &smoothing,
                self.confirm_frames,
            )?;
            matched[itrack] = true;
        }

        for (track, was_matched) in self.tracks.iter_mut().zip(&matched) {
            if !was_matched {
                track.mark_missed(self.confirm_frames);
            }
        }

        // Step 5: Init new tracks
        for idet in unmatched_detections {
            let det = &detections_high[idet];
            if det.score < self.config.new_track_thresh || !det.bbox.is_valid() {
                continue;
            }
            let track_id = self.allocate_id();
            let track = TrackedObject::activate(det, track_id, Some(&self.kalman_filter), self.frame_id);
            self.tracks.push(track);
        }

        // Step 6: Age out lost tracks and drop duplicates
        let max_time_lost = self.max_time_lost;
        for track in self.tracks.iter_mut() {
            if track.frames_missing > max_time_lost {
                track.mark_removed();
            }
        }
        mark_duplicate_tracks(&mut self.tracks);
        self.tracks.retain(|t| t.state != TrackState::Removed);

        tracing::debug!(
            frame = self.frame_id,
            tracks = self.tracks.len(),
            "temporal tracker updated"
        );
        Ok(self.tracks.clone())
    }
}

impl ObjectTracker for TemporalTracker {
    fn update(&mut self, detections: Vec<Detection>) -> Result<Vec<TrackedObject>, PipelineError> {
        self.step(detections)
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.frame_id = 0;
    }

    fn name(&self) -> &'static str {
        "kalman"
    }

    fn live_tracks(&self) -> usize {
        self.tracks.len()
    }
}

/// Mark the younger of any live/lost pair of the same class that overlap heavily.
fn mark_duplicate_tracks(tracks: &mut [TrackedObject]) {
    let mut duplicates = Vec::new();
    for (i, a) in tracks.iter().enumerate() {
        if a.state == TrackState::Lost || a.state == TrackState::Removed {
            continue;
        }
        for (j, b) in tracks.iter().enumerate() {
            if b.state != TrackState::Lost || a.class_label != b.class_label {
                continue;
            }
            if a.bbox.iou(&b.bbox) > DUPLICATE_IOU {
                let time_a = a.frame_id - a.start_frame;
                let time_b = b.frame_id - b.start_frame;
                duplicates.push(if time_a > time_b { j } else { i });
            }
        }
    }
    for idx in duplicates {
        tracks[idx].mark_removed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, x: f32, y: f32, score: f32) -> Detection {
        Detection::new(label, Rect::new(x, y, 100.0, 100.0), score)
    }

    #[test]
    fn test_ids_persist_and_increase() {
        let mut tracker = TemporalTracker::new(TrackerConfig::default());
        let t1 = tracker.update(vec![det("cup", 0.0, 0.0, 0.9), det("cup", 300.0, 0.0, 0.9)]).unwrap();
        assert_eq!(t1.iter().map(|t| t.track_id).collect::<Vec<_>>(), vec![1, 2]);

        let t2 = tracker.update(vec![det("cup", 302.0, 1.0, 0.9), det("cup", 2.0, 1.0, 0.9)]).unwrap();
        let id_at_origin = t2.iter().find(|t| t.bbox.x < 100.0).unwrap().track_id;
        assert_eq!(id_at_origin, 1);
        assert!(t2.iter().all(|t| t.frames_seen == 2));
    }

    #[test]
    fn test_class_change_forces_new_track() {
        let mut tracker = TemporalTracker::new(TrackerConfig::default()).with_confirm_frames(2);
        tracker.update(vec![det("cup", 0.0, 0.0, 0.9)]).unwrap();
        tracker.update(vec![det("cup", 0.0, 0.0, 0.9)]).unwrap();
        let tracks = tracker.update(vec![det("bowl", 0.0, 0.0, 0.9)]).unwrap();
        let cup = tracks.iter().find(|t| t.class_label == "cup").unwrap();
        let bowl = tracks.iter().find(|t| t.class_label == "bowl").unwrap();
        assert_eq!(cup.track_id, 1);
        assert_eq!(cup.state, TrackState::Lost);
        assert_eq!(bowl.track_id, 2);
    }

    #[test]
    fn test_low_score_extends_but_never_spawns() {
        let mut tracker = TemporalTracker::new(TrackerConfig::default());
        tracker.update(vec![det("cup", 0.0, 0.0, 0.9)]).unwrap();
        let tracks = tracker.update(vec![det("cup", 3.0, 0.0, 0.3), det("cup", 500.0, 0.0, 0.3)]).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].frames_missing, 0);
        assert_eq!(tracks[0].frames_seen, 2);
    }

    #[test]
    fn test_removed_after_buffer() {
        let config = TrackerConfig {
            track_buffer: 3,
            ..Default::default()
        };
        let mut tracker = TemporalTracker::new(config);
        tracker.update(vec![det("cup", 0.0, 0.0, 0.9)]).unwrap();
        for missing in 1..=3 {
            let tracks = tracker.update(vec![]).unwrap();
            assert_eq!(tracks.len(), 1);
            assert_eq!(tracks[0].frames_missing, missing);
        }
        assert!(tracker.update(vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_lost_track_is_recovered() {
        let mut tracker = TemporalTracker::new(TrackerConfig::default());
        tracker.update(vec![det("cup", 100.0, 100.0, 0.9)]).unwrap();
        tracker.update(vec![det("cup", 101.0, 100.0, 0.9)]).unwrap();
        tracker.update(vec![]).unwrap();
        let tracks = tracker.update(vec![det("cup", 102.0, 101.0, 0.9)]).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, 1);
        assert_eq!(tracks[0].frames_missing, 0);
        assert_eq!(tracks[0].frames_seen, 3);
    }

    #[test]
    fn test_optimal_assignment_backend() {
        let config = TrackerConfig {
            assignment: AssignmentMethod::Optimal,
            ..Default::default()
        };
        let mut tracker = TemporalTracker::new(config);
        tracker.update(vec![det("cup", 0.0, 0.0, 0.9), det("cup", 300.0, 0.0, 0.9)]).unwrap();
        let tracks = tracker.update(vec![det("cup", 305.0, 0.0, 0.9), det("cup", 5.0, 0.0, 0.9)]).unwrap();
        assert_eq!(tracks.len(), 2);
        assert!(tracks.iter().all(|t| t.frames_seen == 2));
    }

    #[test]
    fn test_max_time_lost_scales_with_frame_rate() {
        let config = TrackerConfig {
            track_buffer: 30,
            frame_rate: 60.0,
            ..Default::default()
        };
        assert_eq!(config.max_time_lost(), 60);
    }
}
