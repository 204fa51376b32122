//! Detector that plays back recorded detections.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::detection::RawDetection;
use crate::error::PipelineError;
use crate::integration::DetectionSource;
use crate::raster::RgbImage;

/// Yields one recorded frame of detections per call, then empty frames.
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    frames: VecDeque<Vec<RawDetection>>,
}

impl ReplayDetector {
    pub fn new(frames: Vec<Vec<RawDetection>>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    /// Load a JSON-lines file holding one array of detections per line.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut frames = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            frames.push(serde_json::from_str(&line)?);
        }
        tracing::info!(path = %path.display(), frames = frames.len(), "loaded detection replay");
        Ok(Self::new(frames))
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl DetectionSource for ReplayDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<RawDetection>, PipelineError> {
        Ok(self.frames.pop_front().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "replay"
    }
}
