//! Depth-discontinuity validation of color segmentation boundaries.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::raster::{
    Contour, DepthSample, EdgeMap, FrameSize, Point2, foreground_count, rasterize_outline, rect_contour,
};
use crate::refine::morphology::{StructuringElement, dilate};
use crate::tracker::Rect;

/// Configuration for depth boundary validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthValidationConfig {
    /// When false every object scores 1.0 and the edge map stays empty.
    pub enabled: bool,
    /// Closest valid depth (metres).
    pub min_depth: f32,
    /// Farthest valid depth (metres).
    pub max_depth: f32,
    pub use_bilateral: bool,
    /// Bilateral window size (pixels, odd).
    pub bilateral_diameter: usize,
    pub bilateral_sigma_space: f32,
    /// Range sigma in metres.
    pub bilateral_sigma_range: f32,
    /// Gradient magnitude (metres per pixel) above which a pixel is an edge.
    pub discontinuity_threshold: f32,
    /// 3x3 dilations applied to the edge map.
    pub edge_dilation: usize,
    /// Score given to an object whose outline meets no depth edge.
    pub min_confidence: f32,
}

impl Default for DepthValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_depth: 0.1,
            max_depth: 3.0,
            use_bilateral: true,
            bilateral_diameter: 5,
            bilateral_sigma_space: 2.0,
            bilateral_sigma_range: 0.03,
            discontinuity_threshold: 0.05,
            edge_dilation: 1,
            min_confidence: 0.3,
        }
    }
}

/// Per-object boundary scores plus the edge raster they were scored against.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryValidation {
    pub confidences: Vec<f32>,
    pub edge_map: EdgeMap,
}

#[derive(Debug, Clone)]
pub struct DepthBoundaryValidator {
    config: DepthValidationConfig,
}

impl DepthBoundaryValidator {
    pub fn new(config: DepthValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DepthValidationConfig {
        &self.config
    }

    /// Score each object's outline against depth discontinuities.
    ///
    /// `contours[i]` belongs to `boxes[i]`; an empty contour falls back to the
    /// box outline. Never fails: a disabled validator returns full confidence.
    pub fn validate(&self, depth: &DepthSample, boxes: &[Rect], contours: &[Contour]) -> BoundaryValidation {
        let size = depth.size();
        if !self.config.enabled {
            return BoundaryValidation {
                confidences: vec![1.0; boxes.len()],
                edge_map: EdgeMap::zeros(size.shape()),
            };
        }

        let edge_map = self.edge_map(depth);
        let confidences = boxes
            .iter()
            .enumerate()
            .map(|(i, bbox)| match contours.get(i) {
                Some(contour) if !contour.is_empty() => self.score_outline(contour, &edge_map, size),
                _ => self.score_outline(&rect_contour(bbox), &edge_map, size),
            })
            .collect();

        BoundaryValidation {
            confidences,
            edge_map,
        }
    }

    /// Binary depth-edge map for the frame.
    pub fn edge_map(&self, depth: &DepthSample) -> EdgeMap {
        let metric = depth.to_metres(self.config.min_depth, self.config.max_depth);
        let filtered = if self.config.use_bilateral {
            bilateral_filter(
                &metric,
                self.config.bilateral_diameter,
                self.config.bilateral_sigma_space,
                self.config.bilateral_sigma_range,
            )
        } else {
            metric
        };

        let threshold = self.config.discontinuity_threshold;
        let edges = gradient_magnitude(&filtered).mapv(|g| u8::from(g > threshold));
        if self.config.edge_dilation > 0 && foreground_count(&edges) > 0 {
            dilate(&edges, &StructuringElement::square(3), self.config.edge_dilation)
        } else {
            edges
        }
    }

    /// `min + ratio * (1 - min)` where `ratio` is the share of outline pixels on an edge.
    pub fn score_outline(&self, contour: &[Point2], edge_map: &EdgeMap, size: FrameSize) -> f32 {
        let min_confidence = self.config.min_confidence;
        let outline = rasterize_outline(contour, size);
        let total = foreground_count(&outline);
        if total == 0 {
            return min_confidence;
        }
        let aligned = outline
            .iter()
            .zip(edge_map.iter())
            .filter(|(o, e)| **o != 0 && **e != 0)
            .count();
        let ratio = aligned as f32 / total as f32;
        (min_confidence + ratio * (1.0 - min_confidence)).clamp(min_confidence, 1.0)
    }
}

impl Default for DepthBoundaryValidator {
    fn default() -> Self {
        Self::new(DepthValidationConfig::default())
    }
}

/// Edge-preserving smoothing; zero (invalid) samples neither contribute nor get filled.
pub fn bilateral_filter(depth: &Array2<f32>, diameter: usize, sigma_space: f32, sigma_range: f32) -> Array2<f32> {
    let (rows, cols) = depth.dim();
    let radius = (diameter / 2) as isize;
    if radius == 0 || sigma_space <= 0.0 || sigma_range <= 0.0 {
        return depth.clone();
    }
    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let range_coeff = -0.5 / (sigma_range * sigma_range);

    let mut spatial = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let d2 = (dx * dx + dy * dy) as f32;
            if d2 <= (radius * radius) as f32 {
                spatial.push((dy, dx, (d2 * space_coeff).exp()));
            }
        }
    }

    let mut out = Array2::<f32>::zeros((rows, cols));
    for ((r, c), &center) in depth.indexed_iter() {
        if center <= 0.0 {
            continue;
        }
        let (mut acc, mut norm) = (0.0f32, 0.0f32);
        for &(dy, dx, ws) in &spatial {
            let rr = r as isize + dy;
            let cc = c as isize + dx;
            if rr < 0 || cc < 0 || rr >= rows as isize || cc >= cols as isize {
                continue;
            }
            let v = depth[[rr as usize, cc as usize]];
            if v <= 0.0 {
                continue;
            }
            let diff = v - center;
            let w = ws * (diff * diff * range_coeff).exp();
            acc += w * v;
            norm += w;
        }
        out[[r, c]] = if norm > 0.0 { acc / norm } else { center };
    }
    out
}

/// Sobel gradient magnitude scaled by 1/8, border pixels replicated.
pub fn gradient_magnitude(depth: &Array2<f32>) -> Array2<f32> {
    let (rows, cols) = depth.dim();
    let mut out = Array2::<f32>::zeros((rows, cols));
    if rows == 0 || cols == 0 {
        return out;
    }
    let at = |r: isize, c: isize| -> f32 {
        let r = r.clamp(0, rows as isize - 1) as usize;
        let c = c.clamp(0, cols as isize - 1) as usize;
        depth[[r, c]]
    };
    for r in 0..rows as isize {
        for c in 0..cols as isize {
            let gx = (at(r - 1, c + 1) + 2.0 * at(r, c + 1) + at(r + 1, c + 1))
                - (at(r - 1, c - 1) + 2.0 * at(r, c - 1) + at(r + 1, c - 1));
            let gy = (at(r + 1, c - 1) + 2.0 * at(r + 1, c) + at(r + 1, c + 1))
                - (at(r - 1, c - 1) + 2.0 * at(r - 1, c) + at(r - 1, c + 1));
            out[[r as usize, c as usize]] = (gx * gx + gy * gy).sqrt() / 8.0;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1.0 m background with a 0.5 m block at rows/cols 20..40.
    fn block_scene() -> DepthSample {
        let mut mm = Array2::<u16>::from_elem((60, 60), 1000);
        for r in 20..40 {
            for c in 20..40 {
                mm[[r, c]] = 500;
            }
        }
        DepthSample::new(mm)
    }

    fn square(x0: f32, y0: f32, x1: f32, y1: f32) -> Contour {
        vec![
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
        ]
    }

    #[test]
    fn test_gradient_flat_is_zero() {
        let flat = Array2::<f32>::from_elem((10, 10), 0.8);
        assert!(gradient_magnitude(&flat).iter().all(|&g| g.abs() < 1e-6));
    }

    #[test]
    fn test_bilateral_preserves_step() {
        let mut d = Array2::<f32>::from_elem((10, 10), 1.0);
        for r in 0..10 {
            for c in 5..10 {
                d[[r, c]] = 0.5;
            }
        }
        d[[0, 0]] = 0.0;
        let f = bilateral_filter(&d, 5, 2.0, 0.03);
        assert!((f[[5, 4]] - 1.0).abs() < 1e-3);
        assert!((f[[5, 5]] - 0.5).abs() < 1e-3);
        assert_eq!(f[[0, 0]], 0.0);
    }

    #[test]
    fn test_aligned_outline_scores_high() {
        let validator = DepthBoundaryValidator::default();
        let bbox = Rect::new(20.0, 20.0, 20.0, 20.0);
        let result = validator.validate(&block_scene(), &[bbox], &[square(20.0, 20.0, 39.0, 39.0)]);
        assert_eq!(result.confidences.len(), 1);
        assert!((result.confidences[0] - 1.0).abs() < 1e-6);
        assert_eq!(result.edge_map.dim(), (60, 60));
        assert_eq!(result.edge_map[[30, 30]], 0);
    }

    #[test]
    fn test_misaligned_outline_scores_min() {
        let validator = DepthBoundaryValidator::default();
        let bbox = Rect::new(45.0, 45.0, 10.0, 10.0);
        let result = validator.validate(&block_scene(), &[bbox], &[square(45.0, 45.0, 54.0, 54.0)]);
        assert!((result.confidences[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_stays_in_range() {
        let validator = DepthBoundaryValidator::default();
        // Half the outline on the block edge, half in flat background
        let contour = square(20.0, 20.0, 39.0, 55.0);
        let result = validator.validate(&block_scene(), &[Rect::new(20.0, 20.0, 20.0, 36.0)], &[contour]);
        let c = result.confidences[0];
        assert!(c > 0.3 && c < 1.0);
    }

    #[test]
    fn test_empty_contour_outside_frame_gets_min_confidence() {
        let validator = DepthBoundaryValidator::default();
        let bbox = Rect::new(500.0, 500.0, 10.0, 10.0);
        let result = validator.validate(&block_scene(), &[bbox], &[Vec::new()]);
        assert_eq!(result.confidences, vec![0.3]);
    }

    #[test]
    fn test_disabled_is_pass_through() {
        let validator = DepthBoundaryValidator::new(DepthValidationConfig {
            enabled: false,
            ..Default::default()
        });
        let boxes = [Rect::new(20.0, 20.0, 20.0, 20.0), Rect::new(0.0, 0.0, 5.0, 5.0)];
        let result = validator.validate(&block_scene(), &boxes, &[Vec::new(), Vec::new()]);
        assert_eq!(result.confidences, vec![1.0, 1.0]);
        assert!(result.edge_map.iter().all(|&v| v == 0));
    }
}
