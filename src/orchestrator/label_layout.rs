//! Force-directed placement of text labels near their anchors.

use serde::{Deserialize, Serialize};

use crate::raster::{FrameSize, Point2};
use crate::tracker::Rect;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelLayoutConfig {
    pub iterations: usize,
    /// Share of an overlap resolved per iteration.
    pub repulsion: f32,
    /// Pull back toward the rest position per iteration.
    pub spring: f32,
    /// Gap kept between labels and to the frame edge.
    pub margin: f32,
    /// Rest position sits this far above the anchor.
    pub anchor_offset: f32,
    /// Estimated glyph width for sizing label boxes.
    pub char_width: f32,
    pub line_height: f32,
}

impl Default for LabelLayoutConfig {
    fn default() -> Self {
        Self {
            iterations: 40,
            repulsion: 0.5,
            spring: 0.1,
            margin: 2.0,
            anchor_offset: 12.0,
            char_width: 7.0,
            line_height: 14.0,
        }
    }
}

/// One placed label: `rect` is where the text box ends up.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLabel {
    pub text: String,
    pub anchor: Point2,
    pub rect: Rect,
}

impl LabelLayoutConfig {
    pub fn label_size(&self, text: &str) -> (f32, f32) {
        (text.chars().count() as f32 * self.char_width + 2.0 * self.margin, self.line_height)
    }

    fn rest_rect(&self, anchor: Point2, width: f32, height: f32) -> Rect {
        Rect::new(anchor.x - width / 2.0, anchor.y - self.anchor_offset - height, width, height)
    }
}

/// Place labels so they overlap as little as possible while staying near their anchors.
///
/// Output order follows input order. Every label box stays inside the frame.
pub fn layout_labels(
    labels: &[(String, Point2)],
    frame: FrameSize,
    config: &LabelLayoutConfig,
) -> Vec<PlacedLabel> {
    let rests: Vec<Rect> = labels
        .iter()
        .map(|(text, anchor)| {
            let (w, h) = config.label_size(text);
            clamp_inside(config.rest_rect(*anchor, w, h), frame, config.margin)
        })
        .collect();
    let mut rects = rests.clone();

    for _ in 0..config.iterations {
        let mut shifts = vec![(0.0f32, 0.0f32); rects.len()];
        let mut moved = false;

        for i in 0..rects.len() {
            for j in (i + 1)..rects.len() {
                let Some((dx, dy)) = separation(&rects[i], &rects[j], config.margin) else {
                    continue;
                };
                let (sx, sy) = (dx * config.repulsion / 2.0, dy * config.repulsion / 2.0);
                shifts[i].0 -= sx;
                shifts[i].1 -= sy;
                shifts[j].0 += sx;
                shifts[j].1 += sy;
                moved = true;
            }
        }

        for (i, rect) in rects.iter_mut().enumerate() {
            let rest = &rests[i];
            let spring_x = (rest.x - rect.x) * config.spring;
            let spring_y = (rest.y - rect.y) * config.spring;
            rect.x += shifts[i].0 + spring_x;
            rect.y += shifts[i].1 + spring_y;
            *rect = clamp_inside(*rect, frame, config.margin);
        }

        if !moved {
            break;
        }
    }

    labels
        .iter()
        .zip(rects)
        .map(|((text, anchor), rect)| PlacedLabel {
            text: text.clone(),
            anchor: *anchor,
            rect,
        })
        .collect()
}

/// Push vector that separates `b` from `a` along the axis of least overlap.
fn separation(a: &Rect, b: &Rect, margin: f32) -> Option<(f32, f32)> {
    let [ax1, ay1, ax2, ay2] = a.to_tlbr();
    let [bx1, by1, bx2, by2] = b.to_tlbr();
    let overlap_x = (ax2 + margin).min(bx2 + margin) - ax1.max(bx1);
    let overlap_y = (ay2 + margin).min(by2 + margin) - ay1.max(by1);
    if overlap_x <= 0.0 || overlap_y <= 0.0 {
        return None;
    }

    let (ca, cb) = (a.center(), b.center());
    if overlap_y <= overlap_x {
        let dir = if cb.y >= ca.y { 1.0 } else { -1.0 };
        Some((0.0, dir * overlap_y))
    } else {
        let dir = if cb.x >= ca.x { 1.0 } else { -1.0 };
        Some((dir * overlap_x, 0.0))
    }
}

/// Labels larger than the frame are truncated to it.
fn clamp_inside(rect: Rect, frame: FrameSize, margin: f32) -> Rect {
    let (fw, fh) = (frame.width as f32, frame.height as f32);
    let width = rect.width.min(fw);
    let height = rect.height.min(fh);
    let max_x = (fw - width - margin).max(0.0);
    let max_y = (fh - height - margin).max(0.0);
    Rect::new(
        rect.x.clamp(margin.min(max_x), max_x),
        rect.y.clamp(margin.min(max_y), max_y),
        width,
        height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inside(rect: &Rect, frame: FrameSize) -> bool {
        rect.x >= 0.0
            && rect.y >= 0.0
            && rect.x + rect.width <= frame.width as f32
            && rect.y + rect.height <= frame.height as f32
    }

    #[test]
    fn test_single_label_rests_above_anchor() {
        let frame = FrameSize::new(640, 480);
        let config = LabelLayoutConfig::default();
        let placed = layout_labels(&[("cup".to_string(), Point2::new(320.0, 240.0))], frame, &config);
        let rect = placed[0].rect;
        assert!(rect.y + rect.height <= 240.0);
        assert!((rect.center().x - 320.0).abs() < 1e-3);
    }

    #[test]
    fn test_overlapping_labels_pushed_apart() {
        let frame = FrameSize::new(640, 480);
        let config = LabelLayoutConfig::default();
        let labels = vec![
            ("cup #1 0.90".to_string(), Point2::new(300.0, 200.0)),
            ("cup #2 0.85".to_string(), Point2::new(305.0, 203.0)),
        ];
        let placed = layout_labels(&labels, frame, &config);
        let before = {
            let (w, h) = config.label_size(&labels[0].0);
            config
                .rest_rect(labels[0].1, w, h)
                .intersection_area(&config.rest_rect(labels[1].1, w, h))
        };
        let after = placed[0].rect.intersection_area(&placed[1].rect);
        assert!(after < before * 0.5, "overlap {after} not reduced from {before}");
    }

    #[test]
    fn test_labels_stay_in_frame() {
        let frame = FrameSize::new(200, 100);
        let config = LabelLayoutConfig::default();
        let labels = vec![
            ("bottle #3 0.77".to_string(), Point2::new(2.0, 2.0)),
            ("bottle #4 0.71".to_string(), Point2::new(198.0, 98.0)),
            ("bottle #5 0.70".to_string(), Point2::new(4.0, 4.0)),
        ];
        for label in layout_labels(&labels, frame, &config) {
            assert!(inside(&label.rect, frame), "{:?}", label.rect);
        }
    }

    #[test]
    fn test_label_larger_than_frame_is_truncated() {
        let frame = FrameSize::new(40, 10);
        let config = LabelLayoutConfig::default();
        let labels = vec![("refrigerator #12 0.93".to_string(), Point2::new(20.0, 5.0))];
        let placed = layout_labels(&labels, frame, &config);
        let rect = placed[0].rect;
        assert!(inside(&rect, frame), "{rect:?}");
        assert_eq!(rect.width, 40.0);
        assert_eq!(rect.height, 10.0);
    }
}
