//! Test-time augmentation: keep only detections the model repeats on the mirrored frame.

use ndarray::{Axis, s};
use serde::{Deserialize, Serialize};

use crate::detection::RawDetection;
use crate::error::PipelineError;
use crate::integration::DetectionSource;
use crate::raster::{Point2, RgbImage};
use crate::tracker::Rect;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtaConfig {
    pub enabled: bool,
    /// IoU a mirrored detection needs with the original to confirm it.
    pub consistency_iou: f32,
}

impl Default for TtaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            consistency_iou: 0.5,
        }
    }
}

/// Runs the inner detector twice per frame, on the image and its horizontal mirror.
pub struct TtaDetector<D: DetectionSource> {
    inner: D,
    config: TtaConfig,
}

impl<D: DetectionSource> TtaDetector<D> {
    pub fn new(inner: D, config: TtaConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: DetectionSource> DetectionSource for TtaDetector<D> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, PipelineError> {
        let width = image.len_of(Axis(1)) as f32;
        let original = self.inner.detect(image)?;
        let flipped = image.slice(s![.., ..;-1, ..]).to_owned();
        let mirrored: Vec<RawDetection> = self
            .inner
            .detect(&flipped)?
            .into_iter()
            .map(|d| unmirror(d, width))
            .collect();
        Ok(consistent(original, &mirrored, self.config.consistency_iou))
    }

    fn name(&self) -> &str {
        "tta"
    }
}

/// Map a detection found on the mirrored frame back to original coordinates.
fn unmirror(mut det: RawDetection, width: f32) -> RawDetection {
    det.bbox = Rect::new(width - det.bbox.x - det.bbox.width, det.bbox.y, det.bbox.width, det.bbox.height);
    det.center = Point2::new(width - det.center.x, det.center.y);
    for p in det.contour.iter_mut() {
        p.x = width - p.x;
    }
    if let Some(mask) = det.mask.take() {
        det.mask = Some(mask.slice(s![.., ..;-1]).to_owned());
    }
    det
}

/// Originals confirmed by a same-class mirrored detection, with averaged confidence.
///
/// Each mirrored detection confirms at most one original, best overlap first.
fn consistent(original: Vec<RawDetection>, mirrored: &[RawDetection], min_iou: f32) -> Vec<RawDetection> {
    let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
    for (i, o) in original.iter().enumerate() {
        for (j, m) in mirrored.iter().enumerate() {
            if o.class_label != m.class_label {
                continue;
            }
            let iou = o.bbox.iou(&m.bbox);
            if iou >= min_iou {
                pairs.push((i, j, iou));
            }
        }
    }
    pairs.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.cmp(&b.0)).then_with(|| a.1.cmp(&b.1)));

    let mut partner: Vec<Option<usize>> = vec![None; original.len()];
    let mut used = vec![false; mirrored.len()];
    for (i, j, _) in pairs {
        if partner[i].is_some() || used[j] {
            continue;
        }
        partner[i] = Some(j);
        used[j] = true;
    }

    original
        .into_iter()
        .zip(partner)
        .filter_map(|(mut det, j)| {
            let j = j?;
            det.confidence = (det.confidence + mirrored[j].confidence) / 2.0;
            Some(det)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    /// Reports a box around the brightest column so mirroring moves it.
    struct BrightColumnDetector {
        ghost_on_original: bool,
    }

    impl DetectionSource for BrightColumnDetector {
        fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, PipelineError> {
            let width = image.len_of(Axis(1));
            let col = (0..width)
                .max_by_key(|&c| image[[0, c, 0]])
                .unwrap_or(0) as f32;
            let mut out = vec![RawDetection::new("cup", Rect::new(col - 5.0, 0.0, 11.0, 10.0), 0.8)];
            let is_original = image[[0, 0, 1]] == 1;
            if self.ghost_on_original && is_original {
                out.push(RawDetection::new("cup", Rect::new(80.0, 50.0, 10.0, 10.0), 0.9));
            }
            Ok(out)
        }
    }

    fn frame() -> RgbImage {
        let mut image = Array3::<u8>::zeros((60, 100, 3));
        image[[0, 20, 0]] = 255;
        image[[0, 0, 1]] = 1;
        image
    }

    #[test]
    fn test_consistent_detection_kept() {
        let mut tta = TtaDetector::new(
            BrightColumnDetector {
                ghost_on_original: false,
            },
            TtaConfig::default(),
        );
        let out = tta.detect(&frame()).unwrap();
        assert_eq!(out.len(), 1);
        assert!((out[0].bbox.x - 15.0).abs() < 1.5);
    }

    #[test]
    fn test_one_sided_detection_dropped() {
        let mut tta = TtaDetector::new(
            BrightColumnDetector {
                ghost_on_original: true,
            },
            TtaConfig::default(),
        );
        let out = tta.detect(&frame()).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].bbox.y < 1.0);
    }

    #[test]
    fn test_unmirror_box() {
        let det = RawDetection::new("cup", Rect::new(10.0, 5.0, 20.0, 8.0), 0.5);
        let back = unmirror(det, 100.0);
        assert_eq!(back.bbox, Rect::new(70.0, 5.0, 20.0, 8.0));
        assert_eq!(back.center, Point2::new(80.0, 9.0));
    }
}
