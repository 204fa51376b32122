//! Binary morphology and connected-component labelling on `ndarray` rasters.

use std::collections::VecDeque;

use ndarray::Array2;

use crate::raster::Mask;
use crate::tracker::Rect;

/// Disc- or square-shaped neighbourhood given as (row, col) offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    offsets: Vec<(isize, isize)>,
}

impl StructuringElement {
    /// Disc inscribed in a `size x size` square; even sizes are rounded up.
    pub fn ellipse(size: usize) -> Self {
        let r = (size.max(1) / 2) as isize;
        let mut offsets = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    offsets.push((dy, dx));
                }
            }
        }
        Self { offsets }
    }

    pub fn square(size: usize) -> Self {
        let r = (size.max(1) / 2) as isize;
        let offsets = (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dy, dx)))
            .collect();
        Self { offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

#[inline]
fn neighbour(r: usize, c: usize, dy: isize, dx: isize, rows: usize, cols: usize) -> Option<(usize, usize)> {
    let rr = r as isize + dy;
    let cc = c as isize + dx;
    if rr < 0 || cc < 0 || rr >= rows as isize || cc >= cols as isize {
        None
    } else {
        Some((rr as usize, cc as usize))
    }
}

fn dilate_once(mask: &Mask, se: &StructuringElement, fg: u8) -> Mask {
    let (rows, cols) = mask.dim();
    let mut out = Mask::zeros((rows, cols));
    for ((r, c), &v) in mask.indexed_iter() {
        if v == 0 {
            continue;
        }
        for &(dy, dx) in &se.offsets {
            if let Some(p) = neighbour(r, c, dy, dx, rows, cols) {
                out[p] = fg;
            }
        }
    }
    out
}

fn erode_once(mask: &Mask, se: &StructuringElement, fg: u8) -> Mask {
    let (rows, cols) = mask.dim();
    let mut out = Mask::zeros((rows, cols));
    for ((r, c), &v) in mask.indexed_iter() {
        if v == 0 {
            continue;
        }
        // Out-of-frame neighbours do not erode.
        let keep = se.offsets.iter().all(|&(dy, dx)| {
            neighbour(r, c, dy, dx, rows, cols).is_none_or(|p| mask[p] != 0)
        });
        if keep {
            out[[r, c]] = fg;
        }
    }
    out
}

fn foreground_value(mask: &Mask) -> u8 {
    mask.iter().copied().max().unwrap_or(1).max(1)
}

pub fn dilate(mask: &Mask, se: &StructuringElement, iterations: usize) -> Mask {
    let fg = foreground_value(mask);
    let mut out = mask.mapv(|v| if v != 0 { fg } else { 0 });
    for _ in 0..iterations {
        out = dilate_once(&out, se, fg);
    }
    out
}

pub fn erode(mask: &Mask, se: &StructuringElement, iterations: usize) -> Mask {
    let fg = foreground_value(mask);
    let mut out = mask.mapv(|v| if v != 0 { fg } else { 0 });
    for _ in 0..iterations {
        out = erode_once(&out, se, fg);
    }
    out
}

/// Dilate then erode: fills holes and gaps narrower than the element.
pub fn close(mask: &Mask, se: &StructuringElement, iterations: usize) -> Mask {
    erode(&dilate(mask, se, iterations), se, iterations)
}

/// Erode then dilate: removes specks smaller than the element.
pub fn open(mask: &Mask, se: &StructuringElement, iterations: usize) -> Mask {
    dilate(&erode(mask, se, iterations), se, iterations)
}

/// One 8-connected foreground region.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub area: usize,
    pub bbox: Rect,
    pub centroid: (f32, f32),
}

/// Label 8-connected regions where `predicate` holds, in raster scan order.
pub fn connected_components<T, F>(raster: &Array2<T>, predicate: F) -> Vec<Component>
where
    F: Fn(&T) -> bool,
{
    let (rows, cols) = raster.dim();
    let mut visited = Array2::<bool>::from_elem((rows, cols), false);
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for r in 0..rows {
        for c in 0..cols {
            if visited[[r, c]] || !predicate(&raster[[r, c]]) {
                continue;
            }
            visited[[r, c]] = true;
            queue.push_back((r, c));

            let (mut area, mut sum_x, mut sum_y) = (0usize, 0f64, 0f64);
            let (mut min_r, mut max_r, mut min_c, mut max_c) = (r, r, c, c);
            while let Some((pr, pc)) = queue.pop_front() {
                area += 1;
                sum_x += pc as f64;
                sum_y += pr as f64;
                min_r = min_r.min(pr);
                max_r = max_r.max(pr);
                min_c = min_c.min(pc);
                max_c = max_c.max(pc);
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        if let Some(p) = neighbour(pr, pc, dy, dx, rows, cols) {
                            if !visited[p] && predicate(&raster[p]) {
                                visited[p] = true;
                                queue.push_back(p);
                            }
                        }
                    }
                }
            }

            components.push(Component {
                area,
                bbox: Rect::new(
                    min_c as f32,
                    min_r as f32,
                    (max_c - min_c + 1) as f32,
                    (max_r - min_r + 1) as f32,
                ),
                centroid: ((sum_x / area as f64) as f32, (sum_y / area as f64) as f32),
            });
        }
    }
    components
}
