/// Detector adapter
///
/// Owns the loaded detector and a single inference worker thread, and gives
/// the scheduler a suspending `submit` on top of the detector's blocking call.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::detector::{Detection, Detector, DetectorLoader};
use crate::config::ModelConfig;
use crate::error::{DetectionError, ModelLoadError};
use crate::video::Frame;

pub type ClassifyOutcome = Result<Vec<Detection>, DetectionError>;

struct ClassifyRequest {
    frame: Frame,
    cancelled: Arc<AtomicBool>,
    reply: Sender<ClassifyOutcome>,
}

/// A classification handed to the worker and not yet settled
pub struct PendingClassification {
    frame_index: u64,
    submitted_at: Instant,
    cancelled: Arc<AtomicBool>,
    reply: Receiver<ClassifyOutcome>,
}

impl PendingClassification {
    /// Receiver that yields exactly one outcome; usable in `select!`
    pub fn receiver(&self) -> &Receiver<ClassifyOutcome> {
        &self.reply
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn elapsed(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    /// Abandon the request. A worker that has not picked it up yet skips it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Block until the outcome arrives or `timeout` passes
    pub fn wait(self, timeout: Duration) -> ClassifyOutcome {
        match self.reply.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                self.cancel();
                Err(DetectionError::TimedOut(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(DetectionError::WorkerUnavailable),
        }
    }
}

/// Wraps an external detector behind a stable, order-guaranteeing interface
pub struct DetectorAdapter {
    detector: Arc<dyn Detector>,
    config: ModelConfig,
    request_tx: Mutex<Option<Sender<ClassifyRequest>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    busy: Arc<AtomicBool>,
}

impl DetectorAdapter {
    /// Load the detector and start the inference worker
    pub fn initialize(
        loader: &dyn DetectorLoader,
        config: ModelConfig,
    ) -> Result<Self, ModelLoadError> {
        config.validate().map_err(ModelLoadError::InvalidConfig)?;

        let detector: Arc<dyn Detector> = Arc::from(loader.load(&config)?);
        info!(
            "✓ Detector '{}' loaded (mirror: {}, max detections: {}, overlap: {:.2}, confidence: {:.2})",
            detector.name(),
            config.mirror_input,
            config.max_detections,
            config.overlap_threshold,
            config.confidence_threshold
        );

        // One queued request at most; a hung detector must not pile up frames.
        let (request_tx, request_rx) = bounded::<ClassifyRequest>(1);
        let busy = Arc::new(AtomicBool::new(false));

        let worker_detector = Arc::clone(&detector);
        let worker_busy = Arc::clone(&busy);
        let max_detections = config.max_detections;
        let worker = thread::Builder::new()
            .name("gesture-inference".to_string())
            .spawn(move || {
                debug!("Inference worker started");
                while let Ok(request) = request_rx.recv() {
                    if request.cancelled.load(Ordering::SeqCst) {
                        trace!("Skipping abandoned request for frame {}", request.frame.index);
                        continue;
                    }
                    worker_busy.store(true, Ordering::SeqCst);
                    let outcome =
                        run_classify(worker_detector.as_ref(), &request.frame, max_detections);
                    worker_busy.store(false, Ordering::SeqCst);
                    // Scheduler may have moved on - that's ok
                    let _ = request.reply.send(outcome);
                }
                debug!("Inference worker stopped");
            })
            .map_err(ModelLoadError::WorkerSpawn)?;

        Ok(Self {
            detector,
            config,
            request_tx: Mutex::new(Some(request_tx)),
            worker: Mutex::new(Some(worker)),
            busy,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// Classify on the caller's thread
    pub fn classify(&self, frame: &Frame) -> ClassifyOutcome {
        run_classify(self.detector.as_ref(), frame, self.config.max_detections)
    }

    /// Requests queued for the worker and not yet picked up
    pub fn pending_requests(&self) -> usize {
        self.request_tx.lock().as_ref().map_or(0, |tx| tx.len())
    }

    /// Whether the worker is inside the detector right now
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Hand a frame to the inference worker and return immediately.
    ///
    /// Fails with [`DetectionError::WorkerBusy`] while the worker is still
    /// running (or has queued) an earlier request; the frame is not enqueued.
    pub fn submit(&self, frame: Frame) -> Result<PendingClassification, DetectionError> {
        let guard = self.request_tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(DetectionError::WorkerUnavailable);
        };
        if self.busy.load(Ordering::SeqCst) {
            return Err(DetectionError::WorkerBusy);
        }

        let (reply_tx, reply_rx) = bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let frame_index = frame.index;

        tx.try_send(ClassifyRequest {
            frame,
            cancelled: Arc::clone(&cancelled),
            reply: reply_tx,
        })
        .map_err(|err| match err {
            TrySendError::Full(_) => DetectionError::WorkerBusy,
            TrySendError::Disconnected(_) => DetectionError::WorkerUnavailable,
        })?;

        Ok(PendingClassification {
            frame_index,
            submitted_at: Instant::now(),
            cancelled,
            reply: reply_rx,
        })
    }

    /// Stop the inference worker. Safe to call more than once.
    ///
    /// A worker stuck inside the detector is detached rather than joined.
    pub fn shutdown(&self) {
        // Dropping the sender ends the worker's receive loop.
        drop(self.request_tx.lock().take());
        let Some(handle) = self.worker.lock().take() else {
            return;
        };

        if self.busy.load(Ordering::SeqCst) {
            warn!("Detector still busy at shutdown; detaching inference worker");
            return;
        }
        if handle.join().is_err() {
            warn!("Inference worker panicked");
        }
        info!("Detector '{}' released", self.detector.name());
    }
}

impl Drop for DetectorAdapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_classify(detector: &dyn Detector, frame: &Frame, max_detections: usize) -> ClassifyOutcome {
    if frame.is_empty() {
        return Err(DetectionError::InvalidFrame(format!(
            "frame {} is {}x{}",
            frame.index,
            frame.width(),
            frame.height()
        )));
    }

    let mut detections = detector.detect(frame)?;
    sort_by_confidence(&mut detections);
    detections.truncate(max_detections);
    Ok(detections)
}

/// Descending confidence; NaN sorts last. Stable for equal scores.
fn sort_by_confidence(detections: &mut [Detection]) {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or_else(|| a.confidence.is_nan().cmp(&b.confidence.is_nan()))
    });
}
