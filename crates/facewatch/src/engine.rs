//! The capture-and-recognize loop on its own OS thread.
//!
//! The worker owns the frame source for its whole lifetime: the camera is
//! released when the loop exits, whichever way it exits. Annotated frames
//! travel to the UI over a small bounded channel.

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError};
use facewatch_core::{AnnotatedFrame, FrameProcessor};
use facewatch_hw::{Camera, CameraError};
use image::RgbImage;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Frames buffered between the worker and the UI.
const FRAME_QUEUE_DEPTH: usize = 2;
/// Consecutive read failures between repeated warnings.
const READ_FAILURE_LOG_EVERY: u64 = 30;
/// How long a crash report waits for queue room before rechecking the run flag.
const FAILURE_RETRY: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Anything that yields full-resolution RGB frames.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<RgbImage, CameraError>;
}

impl FrameSource for Camera {
    fn read_frame(&mut self) -> Result<RgbImage, CameraError> {
        Camera::read_frame(self)
    }
}

/// Messages from the capture thread.
#[derive(Debug)]
pub enum CaptureEvent {
    Frame(AnnotatedFrame),
    /// The loop died; the message says why.
    Failed(String),
}

/// Owner-side handle to a running capture loop.
///
/// Dropping the handle stops the loop and waits for it.
pub struct CaptureHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    events: Receiver<CaptureEvent>,
}

impl CaptureHandle {
    /// True until the worker thread has returned.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn events(&self) -> &Receiver<CaptureEvent> {
        &self.events
    }

    /// Clear the run flag and block until the worker has exited.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("capture thread panicked during shutdown");
            }
            tracing::info!("capture loop stopped");
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the capture loop on a dedicated OS thread.
///
/// `frame_interval` is the pacing target per iteration; slower iterations
/// simply run late.
pub fn spawn_capture(
    source: Box<dyn FrameSource>,
    processor: FrameProcessor,
    frame_interval: Duration,
) -> Result<CaptureHandle, EngineError> {
    let (tx, rx) = crossbeam_channel::bounded::<CaptureEvent>(FRAME_QUEUE_DEPTH);
    let running = Arc::new(AtomicBool::new(true));
    let running_worker = running.clone();
    let running_flag = running.clone();

    let thread = thread::Builder::new()
        .name("facewatch-capture".into())
        .spawn(move || {
            tracing::info!("capture loop started");
            let failure_tx = tx.clone();
            let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
                run_loop(source, processor, &running_worker, &tx, frame_interval)
            }));
            if let Err(payload) = outcome {
                let reason = panic_message(payload.as_ref());
                tracing::error!(reason = %reason, "capture loop crashed");
                report_failure(&failure_tx, &running_flag, reason);
            }
        })?;

    Ok(CaptureHandle {
        running,
        thread: Some(thread),
        events: rx,
    })
}

fn run_loop(
    mut source: Box<dyn FrameSource>,
    mut processor: FrameProcessor,
    running: &AtomicBool,
    tx: &Sender<CaptureEvent>,
    frame_interval: Duration,
) {
    let mut read_failures = 0u64;

    while running.load(Ordering::Acquire) {
        let started = Instant::now();

        match source.read_frame() {
            Ok(frame) => {
                if read_failures > 0 {
                    tracing::info!(failures = read_failures, "camera reads recovered");
                    read_failures = 0;
                }
                let annotated = processor.process(frame);
                match tx.try_send(CaptureEvent::Frame(annotated)) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => {
                        tracing::debug!("frame receiver gone; ending capture loop");
                        break;
                    }
                }
            }
            Err(e) => {
                if read_failures % READ_FAILURE_LOG_EVERY == 0 {
                    tracing::warn!(error = %e, "camera read failed; skipping frame");
                }
                read_failures += 1;
            }
        }

        if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }
    // `source` drops here and releases the device.
}

/// Queue a crash report, waiting for the UI to make room while the loop is
/// still wanted. Gives up once the owner clears the run flag, since the owner
/// is then joining and no longer reading.
fn report_failure(tx: &Sender<CaptureEvent>, running: &AtomicBool, reason: String) {
    let mut event = CaptureEvent::Failed(reason);
    loop {
        match tx.send_timeout(event, FAILURE_RETRY) {
            Ok(()) | Err(SendTimeoutError::Disconnected(_)) => return,
            Err(SendTimeoutError::Timeout(unsent)) => {
                if !running.load(Ordering::Acquire) {
                    tracing::debug!("capture loop stopped before the crash report was read");
                    return;
                }
                event = unsent;
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "capture loop panicked".to_string()
    }
}
