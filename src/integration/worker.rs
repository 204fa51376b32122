//! Dedicated pipeline thread fed by a frame source.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::orchestrator::{DetectionMode, FrameInput, FrameOutput, Orchestrator};

/// How long a blocked send waits before rechecking the active flag.
const SEND_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Completed frames buffered for the consumer.
    pub channel_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { channel_capacity: 4 }
    }
}

/// Result of asking the camera for the next frame.
pub enum FrameTick {
    Frame(FrameInput),
    /// Frame late or dropped; nothing to process this tick.
    Skip,
    EndOfStream,
}

/// Camera-side collaborator; owns its own timeout and retry policy.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> FrameTick;
}

/// Snapshot of worker progress for other threads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub mode: DetectionMode,
    pub shown_objects: usize,
    pub live_tracks: usize,
    pub degraded: bool,
    pub last_frame_ms: f32,
}

/// State shared between the worker and everyone else. Never exposes tracker internals.
#[derive(Debug, Default)]
pub struct SharedControl {
    active: AtomicBool,
    cycle_requests: AtomicUsize,
    mode_request: Mutex<Option<DetectionMode>>,
    stats: RwLock<PipelineStats>,
}

impl SharedControl {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Ask the worker to exit after the frame in flight.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn request_mode(&self, mode: DetectionMode) {
        *self.mode_request.lock() = Some(mode);
    }

    /// Advance the mode cycle once more at the next frame.
    pub fn request_cycle(&self) {
        self.cycle_requests.fetch_add(1, Ordering::AcqRel);
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.read().clone()
    }

    fn apply_requests(&self, orchestrator: &mut Orchestrator) {
        if let Some(mode) = self.mode_request.lock().take() {
            orchestrator.request_mode(mode);
        }
        for _ in 0..self.cycle_requests.swap(0, Ordering::AcqRel) {
            orchestrator.cycle_mode();
        }
    }
}

pub struct WorkerHandle {
    control: Arc<SharedControl>,
    frames: Receiver<FrameOutput>,
    join: JoinHandle<Orchestrator>,
}

impl WorkerHandle {
    pub fn control(&self) -> &Arc<SharedControl> {
        &self.control
    }

    /// Completed frames, in order.
    pub fn frames(&self) -> &Receiver<FrameOutput> {
        &self.frames
    }

    /// Stop the worker and hand back the orchestrator.
    pub fn stop(self) -> Result<Orchestrator, PipelineError> {
        self.control.stop();
        let WorkerHandle { frames, join, .. } = self;
        drop(frames);
        join.join()
            .map_err(|_| PipelineError::Io(std::io::Error::other("pipeline worker panicked")))
    }
}

/// Run the pipeline on its own thread until the source ends or `stop` is called.
pub fn spawn_worker(
    mut orchestrator: Orchestrator,
    mut source: Box<dyn FrameSource>,
    config: &WorkerConfig,
) -> Result<WorkerHandle, PipelineError> {
    let control = Arc::new(SharedControl::new());
    let (tx, rx) = bounded(config.channel_capacity.max(1));
    let shared = Arc::clone(&control);

    let join = thread::Builder::new()
        .name("stabletrack-worker".into())
        .spawn(move || {
            tracing::info!("pipeline worker started");
            run(&mut orchestrator, source.as_mut(), &shared, &tx);
            orchestrator.finish();
            tracing::info!(
                frames = shared.stats().frames_processed,
                "pipeline worker stopped"
            );
            orchestrator
        })?;

    Ok(WorkerHandle {
        control,
        frames: rx,
        join,
    })
}

fn run(
    orchestrator: &mut Orchestrator,
    source: &mut dyn FrameSource,
    control: &SharedControl,
    tx: &Sender<FrameOutput>,
) {
    while control.is_active() {
        control.apply_requests(orchestrator);
        let input = match source.next_frame() {
            FrameTick::Frame(input) => input,
            FrameTick::Skip => {
                control.stats.write().frames_skipped += 1;
                continue;
            }
            FrameTick::EndOfStream => break,
        };

        let started = Instant::now();
        let output = orchestrator.process_frame(input);
        {
            let mut stats = control.stats.write();
            stats.frames_processed += 1;
            stats.mode = output.mode;
            stats.shown_objects = output.objects.len();
            stats.live_tracks = output.live_tracks;
            stats.degraded = output.degraded;
            stats.last_frame_ms = started.elapsed().as_secs_f32() * 1000.0;
        }

        let mut pending = output;
        loop {
            match tx.send_timeout(pending, SEND_POLL) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(back)) => {
                    if !control.is_active() {
                        return;
                    }
                    pending = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineConfig;
    use crate::detection::RawDetection;
    use crate::integration::ReplayDetector;
    use crate::tracker::Rect;
    use ndarray::Array3;

    struct CountingSource {
        remaining: usize,
        skip_first: bool,
    }

    impl FrameSource for CountingSource {
        fn next_frame(&mut self) -> FrameTick {
            if self.skip_first {
                self.skip_first = false;
                return FrameTick::Skip;
            }
            if self.remaining == 0 {
                return FrameTick::EndOfStream;
            }
            self.remaining -= 1;
            FrameTick::Frame(FrameInput {
                index: self.remaining as u64,
                image: Array3::zeros((120, 160, 3)),
                depth: None,
            })
        }
    }

    fn orchestrator(frames: usize) -> Orchestrator {
        let cup = RawDetection::new("cup", Rect::new(40.0, 40.0, 30.0, 30.0), 0.9);
        let replay = ReplayDetector::new(vec![vec![cup]; frames]);
        Orchestrator::new(&PipelineConfig::default(), Some(Box::new(replay)))
    }

    #[test]
    fn test_worker_runs_to_end_of_stream() {
        let source = CountingSource {
            remaining: 5,
            skip_first: true,
        };
        let handle = spawn_worker(orchestrator(5), Box::new(source), &WorkerConfig::default()).unwrap();
        let outputs: Vec<FrameOutput> = handle.frames().iter().collect();
        assert_eq!(outputs.len(), 5);
        assert!(outputs[0].objects.is_empty());
        assert_eq!(outputs[4].objects.len(), 1);

        let stats = handle.control().stats();
        assert_eq!(stats.frames_processed, 5);
        assert_eq!(stats.frames_skipped, 1);
        assert_eq!(stats.shown_objects, 1);
        handle.stop().unwrap();
    }

    #[test]
    fn test_stop_while_consumer_idle() {
        let source = CountingSource {
            remaining: usize::MAX,
            skip_first: false,
        };
        let config = WorkerConfig { channel_capacity: 1 };
        let handle = spawn_worker(orchestrator(0), Box::new(source), &config).unwrap();
        assert!(handle.frames().recv().is_ok());
        let orchestrator = handle.stop().unwrap();
        assert_eq!(orchestrator.mode(), DetectionMode::Objects);
    }

    #[test]
    fn test_mode_request_applied_on_next_frame() {
        let control = SharedControl::new();
        let mut orch = orchestrator(0);
        control.request_mode(DetectionMode::Camera);
        control.apply_requests(&mut orch);
        assert_eq!(orch.mode(), DetectionMode::Objects);
        let out = orch.process_frame(FrameInput {
            index: 0,
            image: Array3::zeros((10, 10, 3)),
            depth: None,
        });
        assert_eq!(out.mode, DetectionMode::Camera);
    }
}
