//! Per-frame, stateless refinement of detector output.

mod depth_boundary;
mod mask_smoother;
pub mod morphology;
mod transparent;

pub use depth_boundary::{
    BoundaryValidation, DepthBoundaryValidator, DepthValidationConfig, bilateral_filter,
    gradient_magnitude,
};
pub use mask_smoother::{KernelTier, MaskSmoother, MaskSmootherConfig};
pub use transparent::{TransparentCandidate, TransparentConfig, find_transparent_candidates};
