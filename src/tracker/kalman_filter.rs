//! Constant-velocity Kalman filter over object centers using ndarray and a nalgebra-based inverse.
//!
//! State is `[x, y, vx, vy]`, measurement is `[x, y]`.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Noise variances for the motion model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionNoise {
    /// Process variance on position (px^2 per frame).
    pub position: f64,
    /// Process variance on velocity; larger than position so velocity can relax.
    pub velocity: f64,
    /// Detector measurement variance (px^2).
    pub measurement: f64,
    /// Initial velocity variance for a new track.
    pub initial_velocity: f64,
}

impl Default for MotionNoise {
    fn default() -> Self {
        Self {
            position: 1e-2,
            velocity: 1e-1,
            measurement: 1e-1,
            initial_velocity: 1e2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: Array2<f64>,
    update_mat: Array2<f64>,
    process_cov: Array2<f64>,
    measurement_cov: Array2<f64>,
    noise: MotionNoise,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new(MotionNoise::default())
    }
}

impl KalmanFilter {
    pub fn new(noise: MotionNoise) -> Self {
        let ndim = 2;
        let mut motion_mat = Array2::eye(2 * ndim);
        for i in 0..ndim {
            motion_mat[[i, ndim + i]] = 1.0;
        }

        let mut update_mat = Array2::zeros((ndim, 2 * ndim));
        for i in 0..ndim {
            update_mat[[i, i]] = 1.0;
        }

        let process_cov = Array2::from_diag(&Array1::from_vec(vec![
            noise.position,
            noise.position,
            noise.velocity,
            noise.velocity,
        ]));
        let measurement_cov = Array2::eye(ndim) * noise.measurement;

        Self {
            motion_mat,
            update_mat,
            process_cov,
            measurement_cov,
            noise,
        }
    }

    pub fn initiate(&self, measurement: [f64; 2]) -> (Array1<f64>, Array2<f64>) {
        let mean = Array1::from_vec(vec![measurement[0], measurement[1], 0.0, 0.0]);
        let cov = Array2::from_diag(&Array1::from_vec(vec![
            self.noise.measurement,
            self.noise.measurement,
            self.noise.initial_velocity,
            self.noise.initial_velocity,
        ]));
        (mean, cov)
    }

    pub fn predict(&self, mean: &Array1<f64>, covariance: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
        let new_mean = self.motion_mat.dot(mean);
        let new_covariance =
            self.motion_mat.dot(covariance).dot(&self.motion_mat.t()) + &self.process_cov;
        (new_mean, new_covariance)
    }

    pub fn project(&self, mean: &Array1<f64>, covariance: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
        let mean_proj = self.update_mat.dot(mean);
        let covariance_proj =
            self.update_mat.dot(covariance).dot(&self.update_mat.t()) + &self.measurement_cov;
        (mean_proj, covariance_proj)
    }

    pub fn update(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
        measurement: [f64; 2],
    ) -> Result<(Array1<f64>, Array2<f64>), PipelineError> {
        if !measurement.iter().all(|v| v.is_finite()) {
            return Err(PipelineError::SingularMatrix("non-finite measurement"));
        }
        let (projected_mean, projected_cov) = self.project(mean, covariance);
        let innovation = Array1::from_vec(measurement.to_vec()) - projected_mean;

        // K = P * H^T * S^-1
        let s_inv = invert_2x2(&projected_cov)?;
        let pht = covariance.dot(&self.update_mat.t()); // 4x2
        let kalman_gain = pht.dot(&s_inv); // 4x2

        let new_mean = mean + &kalman_gain.dot(&innovation);
        let new_covariance = covariance - &kalman_gain.dot(&projected_cov).dot(&kalman_gain.t());

        Ok((new_mean, new_covariance))
    }
}

/// Invert a 2x2 innovation covariance using nalgebra (pure Rust).
fn invert_2x2(m: &Array2<f64>) -> Result<Array2<f64>, PipelineError> {
    let nm = nalgebra::Matrix2::new(m[[0, 0]], m[[0, 1]], m[[1, 0]], m[[1, 1]]);
    let inv = nm
        .try_inverse()
        .ok_or(PipelineError::SingularMatrix("innovation covariance"))?;
    let mut res = Array2::zeros((2, 2));
    for i in 0..2 {
        for j in 0..2 {
            res[[i, j]] = inv[(i, j)];
        }
    }
    Ok(res)
}
