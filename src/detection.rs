//! Per-frame detector output and a builder for it.

use serde::{Deserialize, Serialize};

use crate::raster::{Contour, Mask, Point2, rect_contour};
use crate::tracker::Rect;

/// One object reported by the external detection/segmentation model for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_label: String,
    /// Bounding box in TLWH format
    pub bbox: Rect,
    /// Segmentation outline in pixel coordinates
    #[serde(default)]
    pub contour: Contour,
    pub center: Point2,
    /// Detector confidence in [0, 1]
    pub confidence: f32,
    /// Binary segmentation raster, frame-sized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Mask>,
}

impl RawDetection {
    pub fn new(class_label: impl Into<String>, bbox: Rect, confidence: f32) -> Self {
        Self {
            class_label: class_label.into(),
            bbox,
            contour: rect_contour(&bbox),
            center: bbox.center(),
            confidence,
            mask: None,
        }
    }
}

/// Builder for creating `RawDetection` objects from various input formats.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    class_label: String,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    confidence: f32,
    center: Option<Point2>,
    contour: Option<Contour>,
    mask: Option<Mask>,
}

impl DetectionBuilder {
    /// Create a new detection builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class_label(mut self, label: impl Into<String>) -> Self {
        self.class_label = label.into();
        self
    }

    /// Set bounding box in TLBR format (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.x1 = x1;
        self.y1 = y1;
        self.x2 = x2;
        self.y2 = y2;
        self
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.x1 = cx - w / 2.0;
        self.y1 = cy - h / 2.0;
        self.x2 = cx + w / 2.0;
        self.y2 = cy + h / 2.0;
        self
    }

    /// Set bounding box in TLWH format (left, top, width, height).
    pub fn tlwh(mut self, x: f32, y: f32, w: f32, h: f32) -> Self {
        self.x1 = x;
        self.y1 = y;
        self.x2 = x + w;
        self.y2 = y + h;
        self
    }

    /// Set the confidence score.
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Override the object center (defaults to the box center).
    pub fn center(mut self, cx: f32, cy: f32) -> Self {
        self.center = Some(Point2::new(cx, cy));
        self
    }

    pub fn contour(mut self, contour: Contour) -> Self {
        self.contour = Some(contour);
        self
    }

    pub fn mask(mut self, mask: Mask) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Build the final `RawDetection`.
    pub fn build(self) -> RawDetection {
        let bbox = Rect::from_tlbr(self.x1, self.y1, self.x2, self.y2);
        RawDetection {
            class_label: self.class_label,
            bbox,
            contour: self.contour.unwrap_or_else(|| rect_contour(&bbox)),
            center: self.center.unwrap_or_else(|| bbox.center()),
            confidence: self.confidence,
            mask: self.mask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_builder() {
        let det = DetectionBuilder::new()
            .class_label("cup")
            .tlbr(10.0, 20.0, 50.0, 80.0)
            .confidence(0.95)
            .build();

        assert_eq!(det.confidence, 0.95);
        assert_eq!(det.class_label, "cup");
        assert_eq!(det.bbox.to_tlwh(), [10.0, 20.0, 40.0, 60.0]);
        assert_eq!(det.center, Point2::new(30.0, 50.0));
        assert_eq!(det.contour.len(), 4);
        assert!(det.mask.is_none());
    }

    #[test]
    fn test_builder_explicit_center() {
        let det = DetectionBuilder::new()
            .xywh(100.0, 100.0, 20.0, 20.0)
            .center(95.0, 104.0)
            .build();
        assert_eq!(det.center, Point2::new(95.0, 104.0));
        assert_eq!(det.bbox.to_tlbr(), [90.0, 90.0, 110.0, 110.0]);
    }

    #[test]
    fn test_serde_roundtrip_without_mask() {
        let det = RawDetection::new("box", Rect::new(1.0, 2.0, 3.0, 4.0), 0.5);
        let json = serde_json::to_string(&det).unwrap();
        assert!(!json.contains("mask"));
        let back: RawDetection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, det);
    }
}
