//! Morphological boundary smoothing for segmentation masks.

use serde::{Deserialize, Serialize};

use crate::raster::{FrameSize, Mask, foreground_count};
use crate::refine::morphology::{StructuringElement, close, open};

/// Configuration for the mask boundary smoother.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskSmootherConfig {
    /// When false the smoother returns masks untouched.
    pub enabled: bool,
    /// Kernel size for masks covering less than `small_area_fraction` of the frame.
    pub small_kernel: usize,
    /// Kernel size between the two thresholds.
    pub medium_kernel: usize,
    /// Kernel size for masks covering more than `large_area_fraction` of the frame.
    pub large_kernel: usize,
    pub small_area_fraction: f32,
    pub large_area_fraction: f32,
    /// Closing iterations; opening runs one fewer.
    pub iterations: usize,
}

impl Default for MaskSmootherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            small_kernel: 3,
            medium_kernel: 5,
            large_kernel: 7,
            small_area_fraction: 0.01,
            large_area_fraction: 0.10,
            iterations: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelTier {
    Small,
    Medium,
    Large,
}

/// Stateless close-then-open filter with an area-dependent kernel.
#[derive(Debug, Clone)]
pub struct MaskSmoother {
    config: MaskSmootherConfig,
}

impl MaskSmoother {
    pub fn new(config: MaskSmootherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MaskSmootherConfig {
        &self.config
    }

    pub fn tier_for(&self, area_fraction: f32) -> KernelTier {
        if area_fraction < self.config.small_area_fraction {
            KernelTier::Small
        } else if area_fraction <= self.config.large_area_fraction {
            KernelTier::Medium
        } else {
            KernelTier::Large
        }
    }

    pub fn kernel_size(&self, tier: KernelTier) -> usize {
        match tier {
            KernelTier::Small => self.config.small_kernel,
            KernelTier::Medium => self.config.medium_kernel,
            KernelTier::Large => self.config.large_kernel,
        }
    }

    /// Smooth `mask`, using `frame` to decide how large the object is.
    ///
    /// The result always has the same shape as the input. Empty masks and a
    /// disabled smoother return the input unchanged.
    pub fn smooth(&self, mask: &Mask, frame: FrameSize) -> Mask {
        if !self.config.enabled {
            return mask.clone();
        }
        let fg = foreground_count(mask);
        if fg == 0 {
            return mask.clone();
        }

        let frame_area = if frame.area() > 0 {
            frame.area()
        } else {
            FrameSize::of_raster(mask).area()
        };
        let fraction = fg as f32 / frame_area.max(1) as f32;
        let se = StructuringElement::ellipse(self.kernel_size(self.tier_for(fraction)));

        let iterations = self.config.iterations.max(1);
        let closed = close(mask, &se, iterations);
        if iterations > 1 {
            open(&closed, &se, iterations - 1)
        } else {
            closed
        }
    }
}

impl Default for MaskSmoother {
    fn default() -> Self {
        Self::new(MaskSmootherConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed_pixels(a: &Mask, b: &Mask) -> usize {
        a.iter()
            .zip(b.iter())
            .filter(|(x, y)| (**x != 0) != (**y != 0))
            .count()
    }

    fn jagged_mask() -> Mask {
        let mut m = Mask::zeros((80, 80));
        for r in 20..60 {
            for c in 20..60 {
                m[[r, c]] = 1;
            }
        }
        // notches along the top edge
        for c in (22..58).step_by(4) {
            m[[20, c]] = 0;
            m[[21, c]] = 0;
        }
        // interior pinholes
        m[[40, 40]] = 0;
        m[[35, 47]] = 0;
        // isolated specks
        m[[8, 8]] = 1;
        m[[70, 70]] = 1;
        m
    }

    #[test]
    fn test_tier_selection() {
        let smoother = MaskSmoother::default();
        assert_eq!(smoother.tier_for(0.005), KernelTier::Small);
        assert_eq!(smoother.tier_for(0.05), KernelTier::Medium);
        assert_eq!(smoother.tier_for(0.5), KernelTier::Large);
        assert_eq!(smoother.kernel_size(KernelTier::Large), 7);
    }

    #[test]
    fn test_empty_mask_unchanged() {
        let smoother = MaskSmoother::default();
        let m = Mask::zeros((30, 40));
        assert_eq!(smoother.smooth(&m, FrameSize::new(40, 30)), m);
    }

    #[test]
    fn test_disabled_is_exact_pass_through() {
        let smoother = MaskSmoother::new(MaskSmootherConfig {
            enabled: false,
            ..Default::default()
        });
        let m = jagged_mask();
        assert_eq!(smoother.smooth(&m, FrameSize::new(80, 80)), m);
    }

    #[test]
    fn test_smoothing_fills_holes_and_drops_specks() {
        let smoother = MaskSmoother::default();
        let out = smoother.smooth(&jagged_mask(), FrameSize::new(80, 80));
        assert_eq!(out.dim(), (80, 80));
        assert_eq!(out[[40, 40]], 1);
        assert_eq!(out[[35, 47]], 1);
        assert_eq!(out[[8, 8]], 0);
        assert_eq!(out[[70, 70]], 0);
    }

    #[test]
    fn test_second_pass_is_near_fixed_point() {
        let smoother = MaskSmoother::default();
        let frame = FrameSize::new(80, 80);
        let original = jagged_mask();
        let once = smoother.smooth(&original, frame);
        let twice = smoother.smooth(&once, frame);

        let first_delta = changed_pixels(&original, &once);
        let second_delta = changed_pixels(&once, &twice);
        assert!(first_delta > 0);
        assert!(second_delta <= first_delta);
        assert!(second_delta * 20 <= foreground_count(&once));
    }
}
