//! Render-ready description of a stabilized frame and a simple rasteriser for it.

use serde::{Deserialize, Serialize};

use crate::detection::RawDetection;
use crate::orchestrator::FaceLandmarks;
use crate::orchestrator::label_layout::{LabelLayoutConfig, PlacedLabel, layout_labels};
use crate::raster::{FrameSize, Mask, Point2, RgbImage};
use crate::tracker::{Rect, TrackedObject};

const TRACK_PALETTE: [[u8; 3]; 8] = [
    [230, 25, 75],
    [60, 180, 75],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
    [70, 240, 240],
    [240, 50, 230],
    [210, 245, 60],
];

const UNTRACKED_COLOR: [u8; 3] = [200, 200, 200];
const FACE_COLOR: [u8; 3] = [255, 255, 255];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub draw_masks: bool,
    /// Opacity of the mask tint in [0, 1].
    pub mask_alpha: f32,
    pub marker_radius: usize,
    pub show_confidence: bool,
    /// Confidence at or above which a label reads as high.
    pub high_confidence: f32,
    /// Confidence at or above which a label reads as medium.
    pub medium_confidence: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            draw_masks: true,
            mask_alpha: 0.4,
            marker_radius: 4,
            show_confidence: true,
            high_confidence: 0.7,
            medium_confidence: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn of(confidence: f32, config: &RenderConfig) -> Self {
        if confidence >= config.high_confidence {
            Self::High
        } else if confidence >= config.medium_confidence {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn color(self) -> [u8; 3] {
        match self {
            Self::High => [0, 200, 0],
            Self::Medium => [230, 200, 0],
            Self::Low => [220, 0, 0],
        }
    }
}

/// One object as it should be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayItem {
    pub track_id: i64,
    pub color: [u8; 3],
    pub bbox: Rect,
    pub center: Point2,
    pub level: ConfidenceLevel,
    pub mask: Option<Mask>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    pub items: Vec<OverlayItem>,
    /// Label `i` belongs to `items[i]`.
    pub labels: Vec<PlacedLabel>,
    pub face_points: Vec<Point2>,
}

pub fn track_color(track_id: i64) -> [u8; 3] {
    if track_id < 0 {
        return UNTRACKED_COLOR;
    }
    TRACK_PALETTE[(track_id as usize) % TRACK_PALETTE.len()]
}

pub fn label_text(object: &TrackedObject, config: &RenderConfig) -> String {
    let mut text = object.class_label.clone();
    if object.is_tracked() {
        text.push_str(&format!(" #{}", object.track_id));
    }
    if config.show_confidence {
        text.push_str(&format!(" {:.2}", object.confidence));
    }
    text
}

/// Describe masks, markers and labels for the shown objects.
///
/// Masks come from the detection each object matched this frame; objects
/// coasting through a miss are drawn without one.
pub fn build_overlay(
    objects: &[TrackedObject],
    detections: &[RawDetection],
    faces: &[FaceLandmarks],
    frame: FrameSize,
    render: &RenderConfig,
    layout: &LabelLayoutConfig,
) -> Overlay {
    let items: Vec<OverlayItem> = objects
        .iter()
        .map(|o| OverlayItem {
            track_id: o.track_id,
            color: track_color(o.track_id),
            bbox: o.bbox,
            center: o.center,
            level: ConfidenceLevel::of(o.confidence, render),
            mask: o
                .detection_index
                .and_then(|i| detections.get(i))
                .and_then(|d| d.mask.clone()),
        })
        .collect();

    let label_inputs: Vec<(String, Point2)> = objects
        .iter()
        .map(|o| (label_text(o, render), o.center))
        .collect();

    Overlay {
        items,
        labels: layout_labels(&label_inputs, frame, layout),
        face_points: faces.iter().flat_map(|f| f.points.iter().copied()).collect(),
    }
}

/// Rasterise the overlay onto `image` in place.
pub fn draw_overlay(image: &mut RgbImage, overlay: &Overlay, config: &RenderConfig) {
    let frame = FrameSize::of_image(image);
    let alpha = config.mask_alpha.clamp(0.0, 1.0);

    if config.draw_masks {
        for item in &overlay.items {
            let Some(mask) = &item.mask else { continue };
            if FrameSize::of_raster(mask) != frame {
                continue;
            }
            for ((r, c), &v) in mask.indexed_iter() {
                if v == 0 {
                    continue;
                }
                for ch in 0..3 {
                    let base = image[[r, c, ch]] as f32;
                    image[[r, c, ch]] = (base * (1.0 - alpha) + item.color[ch] as f32 * alpha).round() as u8;
                }
            }
        }
    }

    for item in &overlay.items {
        fill_disc(image, item.center, config.marker_radius, item.color);
    }
    for (label, item) in overlay.labels.iter().zip(&overlay.items) {
        fill_rect(image, &label.rect, item.level.color());
    }
    for point in &overlay.face_points {
        fill_disc(image, *point, 1, FACE_COLOR);
    }
}

fn put(image: &mut RgbImage, x: i64, y: i64, color: [u8; 3]) {
    let (rows, cols, _) = image.dim();
    if x < 0 || y < 0 || x as usize >= cols || y as usize >= rows {
        return;
    }
    for ch in 0..3 {
        image[[y as usize, x as usize, ch]] = color[ch];
    }
}

fn fill_disc(image: &mut RgbImage, center: Point2, radius: usize, color: [u8; 3]) {
    let (cx, cy) = (center.x.round() as i64, center.y.round() as i64);
    let r = radius as i64;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                put(image, cx + dx, cy + dy, color);
            }
        }
    }
}

fn fill_rect(image: &mut RgbImage, rect: &Rect, color: [u8; 3]) {
    let [x1, y1, x2, y2] = rect.to_tlbr();
    for y in (y1.floor() as i64)..(y2.ceil() as i64) {
        for x in (x1.floor() as i64)..(x2.ceil() as i64) {
            put(image, x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Detection;
    use ndarray::Array3;

    fn object(id: i64, confidence: f32) -> TrackedObject {
        let det = Detection::new("cup", Rect::new(40.0, 40.0, 20.0, 20.0), confidence);
        let mut obj = TrackedObject::activate(&det, id, None, 1);
        obj.detection_index = Some(0);
        obj
    }

    #[test]
    fn test_label_text() {
        let config = RenderConfig::default();
        assert_eq!(label_text(&object(7, 0.8), &config), "cup #7 0.80");
        assert_eq!(label_text(&object(-1, 0.5), &config), "cup 0.50");
    }

    #[test]
    fn test_confidence_levels() {
        let config = RenderConfig::default();
        assert_eq!(ConfidenceLevel::of(0.9, &config), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::of(0.5, &config), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::of(0.1, &config), ConfidenceLevel::Low);
    }

    #[test]
    fn test_draw_overlay_tints_mask_and_marks_center() {
        let frame = FrameSize::new(100, 100);
        let mut mask = Mask::zeros(frame.shape());
        mask[[10, 10]] = 1;
        let raw = RawDetection {
            mask: Some(mask),
            ..RawDetection::new("cup", Rect::new(40.0, 40.0, 20.0, 20.0), 0.9)
        };
        let render = RenderConfig::default();
        let overlay = build_overlay(
            &[object(1, 0.9)],
            &[raw],
            &[],
            frame,
            &render,
            &LabelLayoutConfig::default(),
        );
        assert!(overlay.items[0].mask.is_some());

        let mut image = Array3::<u8>::zeros((100, 100, 3));
        draw_overlay(&mut image, &overlay, &render);
        assert_ne!(image[[10, 10, 0]], 0);
        assert_eq!(image[[11, 11, 0]], 0);
        let color = track_color(1);
        assert_eq!(image[[50, 50, 0]], color[0]);
    }
}
