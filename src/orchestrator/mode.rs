//! Detection modes and the cycling order between them.

use serde::{Deserialize, Serialize};

/// Which processing runs on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    Face,
    #[default]
    Objects,
    Combined,
    /// Raw frames, no processing
    Camera,
}

impl DetectionMode {
    /// Mode reached by one press of the cycle control.
    ///
    /// With an object model: objects, combined, face, camera, objects.
    /// Without one only face and camera alternate.
    pub fn next(self, has_object_model: bool) -> Self {
        if has_object_model {
            match self {
                Self::Objects => Self::Combined,
                Self::Combined => Self::Face,
                Self::Face => Self::Camera,
                Self::Camera => Self::Objects,
            }
        } else {
            match self {
                Self::Face => Self::Camera,
                _ => Self::Face,
            }
        }
    }

    pub fn runs_objects(self) -> bool {
        matches!(self, Self::Objects | Self::Combined)
    }

    pub fn runs_faces(self) -> bool {
        matches!(self, Self::Face | Self::Combined)
    }

    /// Closest mode usable without an object model.
    pub fn available(self, has_object_model: bool) -> Self {
        if self.runs_objects() && !has_object_model {
            Self::Face
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Face => "face",
            Self::Objects => "objects",
            Self::Combined => "combined",
            Self::Camera => "camera",
        }
    }
}

impl std::fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_with_object_model() {
        let mut mode = DetectionMode::Objects;
        let mut seen = Vec::new();
        for _ in 0..4 {
            mode = mode.next(true);
            seen.push(mode);
        }
        assert_eq!(
            seen,
            vec![
                DetectionMode::Combined,
                DetectionMode::Face,
                DetectionMode::Camera,
                DetectionMode::Objects
            ]
        );
    }

    #[test]
    fn test_cycle_without_object_model() {
        assert_eq!(DetectionMode::Face.next(false), DetectionMode::Camera);
        assert_eq!(DetectionMode::Camera.next(false), DetectionMode::Face);
        assert_eq!(DetectionMode::Objects.next(false), DetectionMode::Face);
    }

    #[test]
    fn test_stage_flags() {
        assert!(DetectionMode::Combined.runs_objects() && DetectionMode::Combined.runs_faces());
        assert!(!DetectionMode::Camera.runs_objects() && !DetectionMode::Camera.runs_faces());
        assert_eq!(DetectionMode::Objects.available(false), DetectionMode::Face);
    }
}
