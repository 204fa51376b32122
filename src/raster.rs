//! Raster and polygon primitives shared by the refinement stages.

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::tracker::Rect;

/// Binary mask indexed `[row, col]`; any non-zero value is foreground.
pub type Mask = Array2<u8>;

/// Binary depth-discontinuity map, 1 on an edge.
pub type EdgeMap = Array2<u8>;

/// Interleaved RGB frame of shape (height, width, 3).
pub type RgbImage = Array3<u8>;

/// Polygon outline in pixel coordinates.
pub type Contour = Vec<Point2>;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: usize,
    pub height: usize,
}

impl FrameSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Size of a raster indexed `[row, col]`.
    pub fn of_raster<T>(raster: &Array2<T>) -> Self {
        let (rows, cols) = raster.dim();
        Self::new(cols, rows)
    }

    pub fn of_image(image: &RgbImage) -> Self {
        let (rows, cols, _) = image.dim();
        Self::new(cols, rows)
    }

    /// (rows, cols) shape for allocating rasters of this size.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

/// Aligned depth raster in millimetres; zero means no return from the sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSample {
    pub millimetres: Array2<u16>,
}

impl DepthSample {
    pub fn new(millimetres: Array2<u16>) -> Self {
        Self { millimetres }
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::of_raster(&self.millimetres)
    }

    /// Metric depth with samples outside `[min_depth, max_depth]` set to zero.
    pub fn to_metres(&self, min_depth: f32, max_depth: f32) -> Array2<f32> {
        self.millimetres.mapv(|mm| {
            let m = mm as f32 / 1000.0;
            if m >= min_depth && m <= max_depth { m } else { 0.0 }
        })
    }

    /// Median of valid metric samples in a square window around `center`.
    pub fn depth_at(
        &self,
        center: Point2,
        radius: usize,
        min_depth: f32,
        max_depth: f32,
    ) -> Option<f32> {
        let (rows, cols) = self.millimetres.dim();
        if rows == 0 || cols == 0 || !center.x.is_finite() || !center.y.is_finite() {
            return None;
        }
        let cx = center.x.round();
        let cy = center.y.round();
        if cx < 0.0 || cy < 0.0 || cx >= cols as f32 || cy >= rows as f32 {
            return None;
        }
        let (cx, cy) = (cx as usize, cy as usize);

        let mut samples: Vec<f32> = Vec::new();
        for r in cy.saturating_sub(radius)..=(cy + radius).min(rows - 1) {
            for c in cx.saturating_sub(radius)..=(cx + radius).min(cols - 1) {
                let m = self.millimetres[[r, c]] as f32 / 1000.0;
                if m > 0.0 && m >= min_depth && m <= max_depth {
                    samples.push(m);
                }
            }
        }
        if samples.is_empty() {
            return None;
        }
        samples.sort_by(|a, b| a.total_cmp(b));
        Some(samples[samples.len() / 2])
    }
}

pub fn foreground_count(mask: &Mask) -> usize {
    mask.iter().filter(|&&v| v != 0).count()
}

/// Rasterize a closed polygon as a one-pixel outline clipped to `size`.
pub fn rasterize_outline(contour: &[Point2], size: FrameSize) -> Mask {
    let mut out = Mask::zeros(size.shape());
    if contour.is_empty() || size.area() == 0 {
        return out;
    }
    if contour.len() == 1 {
        plot(&mut out, contour[0].x.round() as i64, contour[0].y.round() as i64);
        return out;
    }
    for i in 0..contour.len() {
        let a = contour[i];
        let b = contour[(i + 1) % contour.len()];
        draw_line(&mut out, a, b);
    }
    out
}

fn draw_line(out: &mut Mask, a: Point2, b: Point2) {
    if !(a.x.is_finite() && a.y.is_finite() && b.x.is_finite() && b.y.is_finite()) {
        return;
    }
    let (mut x0, mut y0) = (a.x.round() as i64, a.y.round() as i64);
    let (x1, y1) = (b.x.round() as i64, b.y.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        plot(out, x0, y0);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[inline]
fn plot(out: &mut Mask, x: i64, y: i64) {
    let (rows, cols) = out.dim();
    if x >= 0 && y >= 0 && (x as usize) < cols && (y as usize) < rows {
        out[[y as usize, x as usize]] = 1;
    }
}

/// Closed rectangle outline used when a detector supplies no contour.
pub fn rect_contour(rect: &Rect) -> Contour {
    let [x1, y1, x2, y2] = rect.to_tlbr();
    let (x2, y2) = ((x2 - 1.0).max(x1), (y2 - 1.0).max(y1));
    vec![
        Point2::new(x1, y1),
        Point2::new(x2, y1),
        Point2::new(x2, y2),
        Point2::new(x1, y2),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_metres_clips_range() {
        let depth = DepthSample::new(Array2::from_shape_vec((1, 4), vec![0, 150, 800, 4000]).unwrap());
        let m = depth.to_metres(0.2, 2.0);
        assert_eq!(m[[0, 0]], 0.0);
        assert_eq!(m[[0, 1]], 0.0);
        assert!((m[[0, 2]] - 0.8).abs() < 1e-6);
        assert_eq!(m[[0, 3]], 0.0);
    }

    #[test]
    fn test_depth_at_median_ignores_invalid() {
        let mut mm = Array2::<u16>::zeros((5, 5));
        mm[[2, 2]] = 500;
        mm[[2, 3]] = 600;
        mm[[1, 2]] = 700;
        let depth = DepthSample::new(mm);
        let d = depth.depth_at(Point2::new(2.0, 2.0), 1, 0.1, 3.0).unwrap();
        assert!((d - 0.6).abs() < 1e-6);

        let empty = DepthSample::new(Array2::zeros((5, 5)));
        assert!(empty.depth_at(Point2::new(2.0, 2.0), 1, 0.1, 3.0).is_none());
        assert!(depth.depth_at(Point2::new(-3.0, 2.0), 1, 0.1, 3.0).is_none());
    }

    #[test]
    fn test_rasterize_square_outline() {
        let contour = vec![
            Point2::new(2.0, 2.0),
            Point2::new(6.0, 2.0),
            Point2::new(6.0, 6.0),
            Point2::new(2.0, 6.0),
        ];
        let outline = rasterize_outline(&contour, FrameSize::new(10, 10));
        // 4 sides of 5 pixels sharing 4 corners
        assert_eq!(foreground_count(&outline), 16);
        assert_eq!(outline[[2, 4]], 1);
        assert_eq!(outline[[4, 4]], 0);
    }

    #[test]
    fn test_rasterize_clips_to_frame() {
        let contour = vec![Point2::new(-5.0, 1.0), Point2::new(20.0, 1.0)];
        let outline = rasterize_outline(&contour, FrameSize::new(8, 4));
        assert_eq!(foreground_count(&outline), 8);
    }
}
