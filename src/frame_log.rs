//! Per-frame JSON-lines log of raw vs tracked objects, and offline analysis over it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::detection::RawDetection;
use crate::error::PipelineError;
use crate::orchestrator::DetectionMode;
use crate::raster::Point2;
use crate::tracker::{Rect, TrackedObject};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<i64>,
    pub class_label: String,
    pub center: Point2,
    pub bbox: Rect,
    pub confidence: f32,
}

/// Self-contained record of one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameLogRecord {
    pub frame_index: u64,
    pub mode: DetectionMode,
    pub raw: Vec<LoggedObject>,
    pub tracked: Vec<LoggedObject>,
}

impl FrameLogRecord {
    pub fn new(
        frame_index: u64,
        mode: DetectionMode,
        raw: &[RawDetection],
        tracked: &[TrackedObject],
    ) -> Self {
        Self {
            frame_index,
            mode,
            raw: raw
                .iter()
                .map(|d| LoggedObject {
                    track_id: None,
                    class_label: d.class_label.clone(),
                    center: d.center,
                    bbox: d.bbox,
                    confidence: d.confidence,
                })
                .collect(),
            tracked: tracked
                .iter()
                .map(|t| LoggedObject {
                    track_id: Some(t.track_id),
                    class_label: t.class_label.clone(),
                    center: t.center,
                    bbox: t.bbox,
                    confidence: t.confidence,
                })
                .collect(),
        }
    }
}

/// Appends one JSON object per line.
pub struct FrameLogger {
    writer: BufWriter<File>,
}

impl FrameLogger {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn log(&mut self, record: &FrameLogRecord) -> Result<(), PipelineError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), PipelineError> {
        self.writer.flush()?;
        Ok(())
    }
}

pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<FrameLogRecord>, PipelineError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    pub frames: usize,
    /// Mean positional std-dev of raw detections, grouped by the track they fed.
    pub raw_jitter: f32,
    /// Mean positional std-dev of tracked centers per track.
    pub tracked_jitter: f32,
    /// Distinct track ids seen.
    pub track_count: usize,
    /// Tracks that vanished and were replaced nearby by a new id of the same class.
    pub identity_switches: usize,
}

/// Summarise a logged session without rerunning the pipeline.
///
/// Raw detections are attributed to the nearest same-class tracked object in
/// their frame. A new id appearing within `switch_radius` pixels of a track
/// that disappeared in the same frame counts as an identity switch.
pub fn stability_report(records: &[FrameLogRecord], switch_radius: f32) -> StabilityReport {
    let mut tracked_by_id: BTreeMap<i64, Vec<Point2>> = BTreeMap::new();
    let mut raw_by_id: BTreeMap<i64, Vec<Point2>> = BTreeMap::new();

    for record in records {
        for t in &record.tracked {
            if let Some(id) = t.track_id.filter(|id| *id >= 0) {
                tracked_by_id.entry(id).or_default().push(t.center);
            }
        }
        for r in &record.raw {
            let nearest = record
                .tracked
                .iter()
                .filter(|t| t.class_label == r.class_label && t.track_id.is_some_and(|id| id >= 0))
                .min_by(|a, b| r.center.distance(&a.center).total_cmp(&r.center.distance(&b.center)));
            if let Some(id) = nearest.and_then(|t| t.track_id) {
                raw_by_id.entry(id).or_default().push(r.center);
            }
        }
    }

    StabilityReport {
        frames: records.len(),
        raw_jitter: mean_spread(raw_by_id.values()),
        tracked_jitter: mean_spread(tracked_by_id.values()),
        track_count: tracked_by_id.len(),
        identity_switches: count_identity_switches(records, switch_radius),
    }
}

fn mean_spread<'a>(groups: impl Iterator<Item = &'a Vec<Point2>>) -> f32 {
    let spreads: Vec<f32> = groups.filter(|g| g.len() > 1).map(|g| spread(g)).collect();
    if spreads.is_empty() {
        return 0.0;
    }
    spreads.iter().sum::<f32>() / spreads.len() as f32
}

/// Root-mean-square distance from the centroid.
pub fn spread(points: &[Point2]) -> f32 {
    if points.is_empty() {
        return 0.0;
    }
    let n = points.len() as f32;
    let mean = Point2::new(
        points.iter().map(|p| p.x).sum::<f32>() / n,
        points.iter().map(|p| p.y).sum::<f32>() / n,
    );
    (points.iter().map(|p| p.distance(&mean).powi(2)).sum::<f32>() / n).sqrt()
}

fn count_identity_switches(records: &[FrameLogRecord], switch_radius: f32) -> usize {
    let mut switches = 0;
    for pair in records.windows(2) {
        let ids = |r: &FrameLogRecord| -> HashMap<i64, (String, Point2)> {
            r.tracked
                .iter()
                .filter_map(|t| t.track_id.filter(|id| *id >= 0).map(|id| (id, (t.class_label.clone(), t.center))))
                .collect()
        };
        let before = ids(&pair[0]);
        let after = ids(&pair[1]);

        let mut consumed: HashSet<i64> = HashSet::new();
        for (new_id, (label, center)) in after.iter().filter(|(id, _)| !before.contains_key(*id)) {
            let replaced = before.iter().find(|(old_id, (old_label, old_center))| {
                !after.contains_key(*old_id)
                    && !consumed.contains(*old_id)
                    && old_label == label
                    && old_center.distance(center) <= switch_radius
            });
            if let Some((old_id, _)) = replaced {
                tracing::debug!(old_id, new_id, "identity switch");
                consumed.insert(*old_id);
                switches += 1;
            }
        }
    }
    switches
}
