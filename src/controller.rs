//! Line-oriented command loop. At most one capture runs at a time on a
//! dedicated worker thread that owns the camera and the pipeline.

use crate::camera::{CameraBackend, CameraManager};
use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use crate::history::MessagePair;
use crate::pipeline::Coordinator;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Capture from the current camera, or switch to the given index first.
    Capture(Option<u32>),
    Quit,
    Unknown(String),
}

/// `None` for blank lines.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut parts = line.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();
    let cmd = match (head.to_ascii_uppercase().as_str(), rest.as_slice()) {
        ("CAPTURE", []) => Command::Capture(None),
        ("CAPTURE", [idx]) => match idx.parse() {
            Ok(i) => Command::Capture(Some(i)),
            Err(_) => Command::Unknown(line.to_string()),
        },
        ("QUIT", []) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    };
    Some(cmd)
}

/// Drops a command identical to the previous one seen within `window`.
///
/// The controller resets it whenever a capture finishes, so the window only
/// covers repeats of a trigger whose run has not completed yet.
pub struct Debouncer {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn admit(&mut self, key: &str, now: Instant) -> bool {
        if let Some((prev, at)) = &self.last {
            if prev == key && now.saturating_duration_since(*at) < self.window {
                return false;
            }
        }
        self.last = Some((key.to_string(), now));
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[derive(Default)]
struct FlightState {
    busy: AtomicBool,
    finished: AtomicU64,
}

/// Set while a capture is accepted and not yet finished.
#[derive(Clone, Default)]
pub struct InFlight(Arc<FlightState>);

impl InFlight {
    pub fn try_acquire(&self) -> Option<InFlightGuard> {
        self.0
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(self.0.clone()))
    }

    pub fn is_set(&self) -> bool {
        self.0.busy.load(Ordering::Acquire)
    }

    /// Number of jobs released so far.
    pub fn finished(&self) -> u64 {
        self.0.finished.load(Ordering::Acquire)
    }
}

/// Clears the flag on every exit path of a job, panics included.
pub struct InFlightGuard(Arc<FlightState>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.finished.fetch_add(1, Ordering::AcqRel);
        self.0.busy.store(false, Ordering::Release);
    }
}

/// Whatever the worker runs for one accepted CAPTURE.
pub trait CaptureSession {
    fn capture(&mut self, index: Option<u32>) -> Result<MessagePair>;
}

/// Camera plus pipeline; built on the worker thread since camera handles
/// are not always `Send`.
pub struct CameraSession<B: CameraBackend> {
    camera: CameraManager<B>,
    coordinator: Coordinator,
    warmup_frames: u32,
    sample_frames: u32,
}

impl<B: CameraBackend> CameraSession<B> {
    pub fn new(camera: CameraManager<B>, coordinator: Coordinator, warmup_frames: u32, sample_frames: u32) -> Self {
        Self {
            camera,
            coordinator,
            warmup_frames,
            sample_frames,
        }
    }
}

impl<B: CameraBackend> CaptureSession for CameraSession<B> {
    fn capture(&mut self, index: Option<u32>) -> Result<MessagePair> {
        if let Some(i) = index {
            if i != self.camera.index() || !self.camera.is_open() {
                self.camera.retarget(i)?;
            }
        }
        let frame = self
            .camera
            .capture_stabilized(self.warmup_frames, self.sample_frames)?;
        Ok(self.coordinator.run_capture_pipeline(frame))
    }
}

struct Job {
    index: Option<u32>,
    _guard: InFlightGuard,
}

pub struct Controller {
    events: Arc<dyn EventSink>,
    in_flight: InFlight,
    debouncer: Debouncer,
    seen_finished: u64,
    jobs: Option<SyncSender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl Controller {
    /// Starts the worker. `factory` runs on the worker thread, which emits
    /// READY once it succeeds; if it fails, every capture is answered with
    /// an error.
    pub fn spawn<S, F>(events: Arc<dyn EventSink>, debounce: Duration, factory: F) -> Self
    where
        S: CaptureSession,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let (tx, rx) = sync_channel::<Job>(1);
        let worker_events = events.clone();
        let worker = std::thread::spawn(move || {
            let mut session = match factory() {
                Ok(s) => {
                    worker_events.emit(Event::Ready);
                    Some(s)
                }
                Err(e) => {
                    error!("capture session unavailable: {e}");
                    worker_events.emit(Event::Error(e.to_string()));
                    None
                }
            };
            for job in rx {
                debug!(index = ?job.index, "capture job started");
                let result = match session.as_mut() {
                    Some(s) => s.capture(job.index),
                    None => Err(Error::Capture("capture session unavailable".into())),
                };
                if let Err(e) = result {
                    error!("capture failed: {e}");
                    worker_events.emit(Event::Error(e.to_string()));
                }
                drop(job);
            }
            debug!("worker finished");
        });
        Self {
            events,
            in_flight: InFlight::default(),
            debouncer: Debouncer::new(debounce),
            seen_finished: 0,
            jobs: Some(tx),
            worker: Some(worker),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_set()
    }

    /// Handles one input line. Returns `false` once QUIT is seen.
    pub fn handle_line(&mut self, line: &str) -> bool {
        let Some(cmd) = parse_command(line) else {
            return true;
        };
        match cmd {
            Command::Quit => {
                info!("quit requested");
                false
            }
            Command::Unknown(text) => {
                warn!(command = %text, "unknown command ignored");
                true
            }
            Command::Capture(index) => {
                let finished = self.in_flight.finished();
                if finished != self.seen_finished {
                    self.seen_finished = finished;
                    self.debouncer.reset();
                }
                if !self.debouncer.admit(line.trim(), Instant::now()) {
                    info!(command = line.trim(), "capture debounced");
                    self.events.emit(Event::Rejected("debounced".into()));
                    return true;
                }
                self.submit(index);
                true
            }
        }
    }

    fn submit(&mut self, index: Option<u32>) {
        let Some(guard) = self.in_flight.try_acquire() else {
            info!("capture rejected: already in progress");
            self.events.emit(Event::Rejected("busy".into()));
            return;
        };
        let Some(tx) = &self.jobs else {
            self.events.emit(Event::Rejected("shutting down".into()));
            return;
        };
        self.events.emit(Event::StateStart(match index {
            Some(i) => format!("camera {i}"),
            None => "capture".into(),
        }));
        match tx.try_send(Job {
            index,
            _guard: guard,
        }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.events.emit(Event::Rejected("busy".into()));
            }
            Err(TrySendError::Disconnected(_)) => {
                error!("worker is gone");
                self.events.emit(Event::Error("worker stopped".into()));
            }
        }
    }

    /// Reads commands until QUIT or end of input, then shuts down.
    pub fn run<R: BufRead>(mut self, input: R) {
        for line in input.lines() {
            match line {
                Ok(l) => {
                    if !self.handle_line(&l) {
                        break;
                    }
                }
                Err(e) => {
                    error!("failed to read command: {e}");
                    break;
                }
            }
        }
        self.shutdown();
    }

    /// Stops accepting work and waits for the running capture, if any.
    pub fn shutdown(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("worker panicked");
            }
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
