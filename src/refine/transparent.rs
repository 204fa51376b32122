//! Candidate transparent or reflective objects from depth dropout regions.

use serde::{Deserialize, Serialize};

use crate::raster::{DepthSample, Point2};
use crate::refine::morphology::connected_components;
use crate::tracker::Rect;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransparentConfig {
    pub enabled: bool,
    /// Smallest dropout region (pixels) worth reporting.
    pub min_area: usize,
    /// Regions larger than this share of the frame are sensor dropout, not objects.
    pub max_area_fraction: f32,
    /// A region is already explained when a color box covers this much of its bounds.
    pub coverage_thresh: f32,
}

impl Default for TransparentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_area: 200,
            max_area_fraction: 0.25,
            coverage_thresh: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransparentCandidate {
    pub bbox: Rect,
    pub centroid: Point2,
    pub area: usize,
}

/// 8-connected regions of invalid depth (no return, or outside
/// `[min_depth, max_depth]` metres) not covered by any color detection.
pub fn find_transparent_candidates(
    depth: &DepthSample,
    detected: &[Rect],
    min_depth: f32,
    max_depth: f32,
    config: &TransparentConfig,
) -> Vec<TransparentCandidate> {
    if !config.enabled {
        return Vec::new();
    }
    let max_area = (depth.size().area() as f32 * config.max_area_fraction) as usize;

    connected_components(&depth.to_metres(min_depth, max_depth), |&m| m == 0.0)
        .into_iter()
        .filter(|c| c.area >= config.min_area && c.area <= max_area)
        .filter(|c| {
            !detected
                .iter()
                .any(|d| c.bbox.coverage_by(d) > config.coverage_thresh)
        })
        .map(|c| TransparentCandidate {
            bbox: c.bbox,
            centroid: Point2::new(c.centroid.0, c.centroid.1),
            area: c.area,
        })
        .collect()
}
