//! Capture Layer
//!
//! Drives a camera session and, while live scanning, classifies one preview
//! frame per timer tick.
//!
//! State machine:
//! - `Idle -> Previewing` on [`CaptureController::initialize`]
//! - `Previewing -> LiveScanning` on [`CaptureController::start_live_scan`]
//! - `LiveScanning -> Previewing` on stop or [`CaptureController::finalize_capture`]
//! - any state `-> Stopped` on [`CaptureController::dispose`]
//!
//! Ticks are classified concurrently and may finish out of order. Each tick
//! gets an increasing sequence number and a result is only published when
//! its number is above the last published one and the scan that produced it
//! is still running.

pub mod camera;
pub mod frame;

pub use camera::{Camera, DirectoryCamera};
pub use frame::{CapturedFrame, FrameQuality};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::{ClassifierClient, ResultRecord};
use crate::config::CaptureSettings;
use crate::shared::{CaptureEvent, ScanStatus};

/// Capture controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Previewing,
    LiveScanning,
    Stopped,
}

/// Errors returned by the capture controller
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        state: CaptureState,
        action: &'static str,
    },
    #[error("camera error: {0:#}")]
    Camera(anyhow::Error),
    #[error("capture controller has been disposed")]
    Disposed,
    #[error("live scanning requires a Tokio runtime")]
    NoRuntime,
}

/// Capture controller configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Time between live-scan ticks
    pub scan_interval: Duration,
    /// Directory for per-frame scratch files (system temp dir if unset)
    pub scratch_dir: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::from(&CaptureSettings::default())
    }
}

impl From<&CaptureSettings> for CaptureConfig {
    fn from(settings: &CaptureSettings) -> Self {
        Self {
            scan_interval: Duration::from_millis(settings.scan_interval_ms.max(1)),
            scratch_dir: settings.scratch_dir.clone(),
        }
    }
}

struct Inner {
    camera: Mutex<Box<dyn Camera>>,
    classifier: ClassifierClient,
    config: CaptureConfig,
    status: RwLock<ScanStatus>,
    scan_token: Mutex<Option<CancellationToken>>,
    /// Identifies the current live scan; bumped on every start
    generation: AtomicU64,
    next_sequence: AtomicU64,
    last_published: Mutex<u64>,
    subscribers: Mutex<Vec<Sender<CaptureEvent>>>,
}

/// Camera session with periodic live classification
pub struct CaptureController {
    inner: Arc<Inner>,
}

impl CaptureController {
    /// Create a controller in the `Idle` state
    pub fn new(camera: Box<dyn Camera>, classifier: ClassifierClient, config: CaptureConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                camera: Mutex::new(camera),
                classifier,
                config,
                status: RwLock::new(ScanStatus::default()),
                scan_token: Mutex::new(None),
                generation: AtomicU64::new(0),
                next_sequence: AtomicU64::new(0),
                last_published: Mutex::new(0),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> CaptureState {
        self.inner.status.read().state
    }

    /// Snapshot of the scan status
    pub fn status(&self) -> ScanStatus {
        self.inner.status.read().clone()
    }

    /// Last published live-scan result
    pub fn latest_result(&self) -> Option<ResultRecord> {
        self.inner.status.read().latest_result.clone()
    }

    /// Register an observer. The channel closes when the controller is disposed
    pub fn subscribe(&self) -> Receiver<CaptureEvent> {
        let (tx, rx) = unbounded();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Open the camera and start previewing
    pub fn initialize(&self) -> Result<(), CaptureError> {
        self.inner.require(CaptureState::Idle, "initialize")?;

        self.inner
            .camera
            .lock()
            .initialize()
            .map_err(|e| {
                self.inner.status.write().set_error(format!("{:#}", e));
                CaptureError::Camera(e)
            })?;

        self.inner
            .transition(CaptureState::Idle, CaptureState::Previewing, "initialize")?;
        info!("Camera initialized, previewing");
        Ok(())
    }

    /// Take a full-resolution still while previewing
    pub fn capture_still(&self) -> Result<CapturedFrame, CaptureError> {
        self.inner.require(CaptureState::Previewing, "capture a still")?;
        self.inner.capture(FrameQuality::High)
    }

    /// Start classifying a frame every scan interval.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_live_scan(&self) -> Result<(), CaptureError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| CaptureError::NoRuntime)?;

        // The token is installed while the state change is still locked so a
        // concurrent stop or dispose always finds it.
        let token = CancellationToken::new();
        let mut generation = 0;
        self.inner.transition_with(
            CaptureState::Previewing,
            CaptureState::LiveScanning,
            "start live scan",
            |inner| {
                generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(previous) = inner.scan_token.lock().replace(token.clone()) {
                    previous.cancel();
                }
            },
        )?;

        info!(
            "Live scan {} started, interval {:?}",
            generation, self.inner.config.scan_interval
        );
        runtime.spawn(run_scan(self.inner.clone(), token, generation));
        Ok(())
    }

    /// Stop live scanning and return to previewing
    pub fn stop_live_scan(&self) -> Result<(), CaptureError> {
        self.inner.transition(
            CaptureState::LiveScanning,
            CaptureState::Previewing,
            "stop live scan",
        )?;
        self.inner.cancel_scan();
        info!("Live scan stopped");
        Ok(())
    }

    /// End the live scan and take one full-resolution frame for the caller
    pub fn finalize_capture(&self) -> Result<CapturedFrame, CaptureError> {
        self.inner.transition(
            CaptureState::LiveScanning,
            CaptureState::Previewing,
            "finalize capture",
        )?;
        self.inner.cancel_scan();
        info!("Live scan finalized, capturing still");
        self.inner.capture(FrameQuality::High)
    }

    /// Cancel any scan, release the camera and close observer channels.
    ///
    /// Calling it again has no effect.
    pub fn dispose(&self) {
        {
            let mut status = self.inner.status.write();
            if status.state == CaptureState::Stopped {
                return;
            }
            let from = status.state;
            status.state = CaptureState::Stopped;
            self.inner.emit(CaptureEvent::StateChanged {
                from,
                to: CaptureState::Stopped,
            });
        }

        self.inner.cancel_scan();
        self.inner.camera.lock().release();
        self.inner.subscribers.lock().clear();
        info!("Capture controller disposed");
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Inner {
    fn require(&self, expected: CaptureState, action: &'static str) -> Result<(), CaptureError> {
        match self.status.read().state {
            state if state == expected => Ok(()),
            CaptureState::Stopped => Err(CaptureError::Disposed),
            state => Err(CaptureError::InvalidTransition { state, action }),
        }
    }

    fn transition(
        &self,
        from: CaptureState,
        to: CaptureState,
        action: &'static str,
    ) -> Result<(), CaptureError> {
        self.transition_with(from, to, action, |_| {})
    }

    /// Change state and run `on_enter` before the status lock is released.
    ///
    /// The state event is emitted under the same lock, so observers see
    /// state changes and published results in the order they happened.
    fn transition_with(
        &self,
        from: CaptureState,
        to: CaptureState,
        action: &'static str,
        on_enter: impl FnOnce(&Inner),
    ) -> Result<(), CaptureError> {
        let mut status = self.status.write();
        match status.state {
            state if state == from => status.state = to,
            CaptureState::Stopped => return Err(CaptureError::Disposed),
            state => return Err(CaptureError::InvalidTransition { state, action }),
        }

        on_enter(self);
        debug!("Capture state {:?} -> {:?}", from, to);
        self.emit(CaptureEvent::StateChanged { from, to });
        Ok(())
    }

    /// Whether the scan identified by `generation` is still the running one
    fn is_scanning(&self, generation: u64) -> bool {
        self.status.read().state == CaptureState::LiveScanning
            && self.generation.load(Ordering::SeqCst) == generation
    }

    fn cancel_scan(&self) {
        if let Some(token) = self.scan_token.lock().take() {
            token.cancel();
        }
    }

    fn capture(&self, quality: FrameQuality) -> Result<CapturedFrame, CaptureError> {
        let result = self.camera.lock().capture_frame(quality);
        let mut status = self.status.write();
        match result {
            Ok(frame) => {
                status.frames_captured += 1;
                Ok(frame)
            }
            Err(e) => {
                status.set_error(format!("{:#}", e));
                Err(CaptureError::Camera(e))
            }
        }
    }

    fn emit(&self, event: CaptureEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Classify one live-scan frame and publish the result if it is still current
    async fn classify_tick(self: Arc<Self>, frame: CapturedFrame, sequence: u64, generation: u64) {
        self.emit(CaptureEvent::Classifying { sequence });

        let scratch_dir = self.config.scratch_dir.clone();
        let spilled = tokio::task::spawn_blocking(move || {
            let file = frame.to_temp_file(scratch_dir.as_deref());
            (frame, file)
        })
        .await;

        let mut record = match spilled {
            Ok((_, Ok(file))) => {
                let record = self.classifier.classify_file_frame(file.path(), true).await;
                drop(file);
                record
            }
            Ok((frame, Err(e))) => {
                warn!("Could not write scratch frame: {}", e);
                self.classifier.classify_frame(&frame.data, true).await
            }
            Err(e) => ResultRecord::failed(format!("scratch frame task failed: {}", e)),
        };
        // The scratch frame no longer exists
        record.image_path.clear();

        self.publish(sequence, generation, record);
    }

    fn publish(&self, sequence: u64, generation: u64, record: ResultRecord) {
        let mut last = self.last_published.lock();
        {
            let mut status = self.status.write();
            status.pending = status.pending.saturating_sub(1);

            let current = status.state == CaptureState::LiveScanning
                && self.generation.load(Ordering::SeqCst) == generation;
            if !current || sequence <= *last {
                debug!(
                    "Discarding result of tick {} (last published {}, state {:?})",
                    sequence, *last, status.state
                );
                return;
            }

            *last = sequence;
            status.latest_result = Some(record.clone());
            match &record.error {
                Some(error) => status.set_error(error.clone()),
                None => status.clear_error(),
            }

            // Emitted under the status lock so no state change can overtake it
            debug!("Publishing result of tick {}: {}", sequence, record.prediction);
            self.emit(CaptureEvent::ResultPublished { sequence, record });
        }
    }
}

async fn run_scan(inner: Arc<Inner>, token: CancellationToken, generation: u64) {
    let period = inner.config.scan_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !inner.is_scanning(generation) {
            break;
        }

        let capture = {
            let inner = inner.clone();
            tokio::task::spawn_blocking(move || inner.capture(FrameQuality::Preview)).await
        };

        if token.is_cancelled() || !inner.is_scanning(generation) {
            break;
        }

        match capture {
            Ok(Ok(frame)) => {
                let sequence = inner.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
                inner.status.write().pending += 1;
                tokio::spawn(inner.clone().classify_tick(frame, sequence, generation));
            }
            Ok(Err(e)) => {
                warn!("Live scan frame failed: {}", e);
                inner.emit(CaptureEvent::FrameFailed {
                    message: e.to_string(),
                });
            }
            Err(e) => {
                warn!("Live scan capture task failed: {}", e);
                inner.emit(CaptureEvent::FrameFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    debug!("Live scan {} timer stopped", generation);
}
