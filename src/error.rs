//! Error types for the stabilization pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Raster dimension mismatch: expected {expected:?}, got {got:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Singular matrix in {0}")]
    SingularMatrix(&'static str),

    #[error("Assignment error: {0}")]
    Assignment(String),

    #[error("Detector error: {0}")]
    Detector(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::Config("alpha out of range".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("alpha out of range"));

        let err = PipelineError::DimensionMismatch {
            expected: (480, 640),
            got: (240, 320),
        };
        assert!(err.to_string().contains("(480, 640)"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PipelineError = io_err.into();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
