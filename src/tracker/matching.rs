//! Matching utilities for multi-object tracking.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::detection::RawDetection;
use crate::error::PipelineError;
use crate::raster::Point2;
use crate::tracker::rect::Rect;

/// Detection input for the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_label: String,
    /// Bounding box in TLWH format
    pub bbox: Rect,
    pub center: Point2,
    /// Detector confidence score
    pub score: f32,
    /// Boundary-alignment confidence from depth validation
    pub boundary_confidence: f32,
    /// Combined confidence handed to consumers
    pub confidence: f32,
    /// Metric depth at the center, when valid
    pub depth: Option<f32>,
    /// Index into the frame's detection list
    pub source_index: Option<usize>,
}

impl Detection {
    pub fn new(class_label: impl Into<String>, bbox: Rect, score: f32) -> Self {
        Self {
            class_label: class_label.into(),
            bbox,
            center: bbox.center(),
            score,
            boundary_confidence: 1.0,
            confidence: score,
            depth: None,
            source_index: None,
        }
    }

    pub fn from_raw(raw: &RawDetection, source_index: usize) -> Self {
        Self {
            class_label: raw.class_label.clone(),
            bbox: raw.bbox,
            center: raw.center,
            score: raw.confidence,
            boundary_confidence: 1.0,
            confidence: raw.confidence,
            depth: None,
            source_index: Some(source_index),
        }
    }

    pub fn with_depth(mut self, depth: Option<f32>) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_center(mut self, center: Point2) -> Self {
        self.center = center;
        self
    }

    /// Attach a boundary score and recompute the combined confidence.
    pub fn with_boundary_confidence(mut self, boundary: f32, min_confidence: f32) -> Self {
        self.boundary_confidence = boundary;
        self.confidence = (boundary * self.score).clamp(min_confidence, 1.0);
        self
    }
}

/// How track/detection pairs are chosen from the cost matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    /// Best pair first; ties go to higher IoU, then lower track id.
    #[default]
    Greedy,
    /// Globally optimal Jonker-Volgenant assignment.
    Optimal,
}

/// Cost assigned to pairs that may never match.
pub const INFEASIBLE: f32 = 1e6;

/// Per-pair matching inputs: raw IoU and fused cost `1 - iou * score`.
#[derive(Debug, Clone)]
pub struct MatchCosts {
    pub ious: Array2<f32>,
    pub costs: Array2<f32>,
}

/// Build the gated cost matrix between track boxes and detections.
///
/// Each track offers two boxes (motion-predicted and last smoothed); the
/// better overlap counts. Pairs of different class or below `min_iou` are
/// infeasible.
pub fn gated_costs(
    predicted: &[Rect],
    previous: &[Rect],
    track_classes: &[&str],
    detections: &[Detection],
    min_iou: f32,
    fuse_scores: bool,
) -> MatchCosts {
    let rows = predicted.len();
    let cols = detections.len();
    let mut ious = Array2::zeros((rows, cols));
    let mut costs = Array2::from_elem((rows, cols), INFEASIBLE);
    for i in 0..rows {
        for (j, det) in detections.iter().enumerate() {
            if track_classes[i] != det.class_label {
                continue;
            }
            let iou = predicted[i].iou(&det.bbox).max(previous[i].iou(&det.bbox));
            ious[[i, j]] = iou;
            if iou < min_iou || iou <= 0.0 {
                continue;
            }
            let sim = if fuse_scores { iou * det.score } else { iou };
            costs[[i, j]] = 1.0 - sim;
        }
    }
    MatchCosts { ious, costs }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

impl AssignmentResult {
    fn from_matches(matches: Vec<(usize, usize)>, num_rows: usize, num_cols: usize) -> Self {
        let mut row_used = vec![false; num_rows];
        let mut col_used = vec![false; num_cols];
        for &(r, c) in &matches {
            row_used[r] = true;
            col_used[c] = true;
        }
        Self {
            matches,
            unmatched_tracks: (0..num_rows).filter(|&r| !row_used[r]).collect(),
            unmatched_detections: (0..num_cols).filter(|&c| !col_used[c]).collect(),
        }
    }
}

/// Assign detections to tracks with cost at most `thresh`.
///
/// `track_ids[i]` identifies row `i` for tie-breaking.
pub fn assign(
    costs: &MatchCosts,
    track_ids: &[i64],
    thresh: f32,
    method: AssignmentMethod,
) -> Result<AssignmentResult, PipelineError> {
    match method {
        AssignmentMethod::Greedy => Ok(greedy_assignment(costs, track_ids, thresh)),
        AssignmentMethod::Optimal => linear_assignment(&costs.costs, thresh),
    }
}

pub fn greedy_assignment(costs: &MatchCosts, track_ids: &[i64], thresh: f32) -> AssignmentResult {
    let (num_rows, num_cols) = costs.costs.dim();
    let mut candidates: Vec<(usize, usize)> = Vec::new();
    for i in 0..num_rows {
        for j in 0..num_cols {
            if costs.costs[[i, j]] <= thresh {
                candidates.push((i, j));
            }
        }
    }
    candidates.sort_by(|&(ia, ja), &(ib, jb)| {
        costs.costs[[ia, ja]]
            .total_cmp(&costs.costs[[ib, jb]])
            .then_with(|| costs.ious[[ib, jb]].total_cmp(&costs.ious[[ia, ja]]))
            .then_with(|| track_ids[ia].cmp(&track_ids[ib]))
            .then_with(|| ja.cmp(&jb))
    });

    let mut row_used = vec![false; num_rows];
    let mut col_used = vec![false; num_cols];
    let mut matches = Vec::new();
    for (i, j) in candidates {
        if row_used[i] || col_used[j] {
            continue;
        }
        row_used[i] = true;
        col_used[j] = true;
        matches.push((i, j));
    }
    matches.sort_unstable();
    AssignmentResult::from_matches(matches, num_rows, num_cols)
}

pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> Result<AssignmentResult, PipelineError> {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return Ok(AssignmentResult::from_matches(Vec::new(), num_rows, num_cols));
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), INFEASIBLE as f64);

    for i in 0..num_rows {
        for j in 0..num_cols {
            padded[[i, j]] = cost_matrix[[i, j]] as f64;
        }
    }

    let (row_to_col, _) =
        lapjv::lapjv(&padded).map_err(|err| PipelineError::Assignment(format!("{err:?}")))?;
    let matches = row_to_col
        .iter()
        .enumerate()
        .filter(|&(row_idx, &col_idx)| {
            row_idx < num_rows && col_idx < num_cols && cost_matrix[[row_idx, col_idx]] <= thresh
        })
        .map(|(row_idx, &col_idx)| (row_idx, col_idx))
        .collect();

    Ok(AssignmentResult::from_matches(matches, num_rows, num_cols))
}
