//! Lightweight tracker without a motion model.
//!
//! Detections are matched to tracks of the same class by IoU against the last
//! smoothed box. Whatever is left is matched by class and quantised center
//! cell, which keeps identities for small objects whose boxes jitter apart.

use std::collections::HashMap;

use crate::error::PipelineError;
use crate::raster::Point2;
use crate::tracker::backend::ObjectTracker;
use crate::tracker::matching::{self, AssignmentMethod, Detection};
use crate::tracker::rect::Rect;
use crate::tracker::temporal_tracker::TrackerConfig;
use crate::tracker::track::TrackedObject;
use crate::tracker::track_state::TrackState;

pub struct EmaTracker {
    tracks: Vec<TrackedObject>,
    frame_id: u32,
    next_id: i64,
    config: TrackerConfig,
    confirm_frames: u32,
}

impl EmaTracker {
    pub fn new(config: TrackerConfig, confirm_frames: u32) -> Self {
        Self {
            tracks: Vec::new(),
            frame_id: 0,
            next_id: 1,
            config,
            confirm_frames: confirm_frames.max(1),
        }
    }

    fn grid_key(&self, class_label: &str, center: Point2) -> (String, i64, i64) {
        let cell = self.config.grid_size.max(1.0);
        (
            class_label.to_string(),
            (center.x / cell).floor() as i64,
            (center.y / cell).floor() as i64,
        )
    }

    fn step(&mut self, detections: Vec<Detection>) -> Result<Vec<TrackedObject>, PipelineError> {
        self.frame_id += 1;
        let smoothing = self.config.smoothing();
        let detections: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.score > self.config.low_score_thresh)
            .collect();

        let boxes: Vec<Rect> = self.tracks.iter().map(|t| t.bbox).collect();
        let classes: Vec<&str> = self.tracks.iter().map(|t| t.class_label.as_str()).collect();
        let ids: Vec<i64> = self.tracks.iter().map(|t| t.track_id).collect();
        let costs = matching::gated_costs(&boxes, &boxes, &classes, &detections, self.config.min_iou, false);
        let result = matching::assign(&costs, &ids, 1.0 - self.config.min_iou, AssignmentMethod::Greedy)?;

        let mut matched = vec![false; self.tracks.len()];
        let mut pairs = result.matches;

        // Grid fallback for whatever IoU left unmatched.
        let mut by_cell: HashMap<(String, i64, i64), usize> = HashMap::new();
        for &i in &result.unmatched_tracks {
            by_cell
                .entry(self.grid_key(&self.tracks[i].class_label, self.tracks[i].center))
                .or_insert(i);
        }
        let mut unmatched_detections = Vec::new();
        for j in result.unmatched_detections {
            let key = self.grid_key(&detections[j].class_label, detections[j].center);
            match by_cell.remove(&key) {
                Some(i) => pairs.push((i, j)),
                None => unmatched_detections.push(j),
            }
        }

        for (i, j) in pairs {
            self.tracks[i].update(&detections[j], None, self.frame_id, &smoothing, self.confirm_frames)?;
            matched[i] = true;
        }
        for (track, was_matched) in self.tracks.iter_mut().zip(&matched) {
            if !was_matched {
                track.mark_missed(self.confirm_frames);
            }
        }

        for j in unmatched_detections {
            let det = &detections[j];
            if det.score < self.config.new_track_thresh || !det.bbox.is_valid() {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.push(TrackedObject::activate(det, id, None, self.frame_id));
        }

        let max_time_lost = self.config.max_time_lost();
        self.tracks.retain(|t| t.frames_missing <= max_time_lost && t.state != TrackState::Removed);
        Ok(self.tracks.clone())
    }
}

impl ObjectTracker for EmaTracker {
    fn update(&mut self, detections: Vec<Detection>) -> Result<Vec<TrackedObject>, PipelineError> {
        self.step(detections)
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.frame_id = 0;
    }

    fn name(&self) -> &'static str {
        "ema"
    }

    fn live_tracks(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32) -> Detection {
        Detection::new("cup", Rect::new(x, y, w, w), 0.9)
    }

    #[test]
    fn test_iou_match_keeps_identity() {
        let mut tracker = EmaTracker::new(TrackerConfig::default(), 2);
        tracker.update(vec![det(0.0, 0.0, 100.0)]).unwrap();
        let tracks = tracker.update(vec![det(4.0, 3.0, 100.0)]).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, 1);
        assert_eq!(tracks[0].state, TrackState::Confirmed);
        assert!(tracks[0].motion.is_none());
    }

    #[test]
    fn test_grid_fallback_for_non_overlapping_jitter() {
        let mut tracker = EmaTracker::new(TrackerConfig::default(), 2);
        // Tiny boxes that stop overlapping but stay in the same 50px cell.
        tracker.update(vec![det(10.0, 10.0, 4.0)]).unwrap();
        let tracks = tracker.update(vec![det(20.0, 12.0, 4.0)]).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].frames_seen, 2);
    }

    #[test]
    fn test_unmatched_track_goes_lost() {
        let mut tracker = EmaTracker::new(TrackerConfig::default(), 2);
        tracker.update(vec![det(0.0, 0.0, 100.0)]).unwrap();
        let tracks = tracker.update(vec![det(400.0, 400.0, 100.0)]).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].state, TrackState::Lost);
        assert_eq!(tracks[1].track_id, 2);
    }
}
