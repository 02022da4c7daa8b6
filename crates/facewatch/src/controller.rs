//! Start/stop, enrollment and log viewing behind the window.
//!
//! The controller owns the enrollment store and at most one capture loop.
//! It opens the camera on start and hands it to the loop, which releases it
//! when it exits.

use crate::engine::{self, CaptureEvent, CaptureHandle, EngineError, FrameSource};
use ab_glyph::FontArc;
use facewatch_core::recognition_log::LogError;
use facewatch_core::store::StoreError;
use facewatch_core::{
    enroll_from_image, AnnotatedFrame, Config, EnrollError, EnrollmentStore, FrameProcessor,
    RecognitionLog, SharedAnalyzer,
};
use facewatch_hw::CameraError;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("recognition is already running")]
    AlreadyRunning,
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("enrollment failed: {0}")]
    Enroll(#[from] EnrollError),
    #[error("failed to save enrollments: {0}")]
    Store(#[from] StoreError),
    #[error("failed to read recognition log: {0}")]
    Log(#[from] LogError),
    #[error("a name is required")]
    EmptyName,
    #[error("face analyzer unavailable after a crash")]
    AnalyzerPoisoned,
}

/// Opens the frame source for a new capture run.
pub type SourceOpener = Box<dyn Fn() -> Result<Box<dyn FrameSource>, CameraError>>;

/// What arrived from the capture loop since the last poll.
#[derive(Debug, Default)]
pub struct Poll {
    /// Newest frame; older ones are superseded.
    pub frame: Option<AnnotatedFrame>,
    /// Set when the loop died on its own.
    pub failure: Option<String>,
}

pub struct Controller {
    config: Config,
    store: EnrollmentStore,
    analyzer: SharedAnalyzer,
    log: RecognitionLog,
    font: Option<FontArc>,
    open_source: SourceOpener,
    capture: Option<CaptureHandle>,
}

impl Controller {
    /// Build a controller, loading enrollments from `config.store_path`.
    ///
    /// A missing store is an empty store. An unreadable one is returned
    /// alongside so the caller can report it; the controller then starts empty.
    pub fn new(
        config: Config,
        analyzer: SharedAnalyzer,
        font: Option<FontArc>,
        open_source: SourceOpener,
    ) -> (Self, Option<StoreError>) {
        let (store, load_error) = EnrollmentStore::load_or_empty(&config.store_path);
        let log = RecognitionLog::new(&config.log_dir);
        tracing::info!(
            identities = store.len(),
            store = %store.path().display(),
            log_dir = %log.dir().display(),
            "controller ready"
        );
        (
            Self {
                config,
                store,
                analyzer,
                log,
                font,
                open_source,
                capture: None,
            },
            load_error,
        )
    }

    pub fn is_running(&self) -> bool {
        self.capture.as_ref().is_some_and(CaptureHandle::is_running)
    }

    pub fn store(&self) -> &EnrollmentStore {
        &self.store
    }

    /// Open the camera and launch the capture loop with the current enrollments.
    pub fn start(&mut self) -> Result<(), ControllerError> {
        if self.is_running() {
            return Err(ControllerError::AlreadyRunning);
        }
        // A loop that died on its own still needs joining.
        if let Some(dead) = self.capture.take() {
            dead.stop();
        }

        let source = (self.open_source)()?;
        let processor = FrameProcessor::new(
            self.analyzer.clone(),
            self.store.snapshot(),
            self.config.match_threshold,
        )
        .with_log(self.log.clone())
        .with_font(self.font.clone());

        let handle = engine::spawn_capture(source, processor, self.config.frame_interval())?;
        self.capture = Some(handle);
        tracing::info!(identities = self.store.len(), "recognition started");
        Ok(())
    }

    /// Stop the capture loop and wait for it. Returns false if none was running.
    pub fn stop(&mut self) -> bool {
        match self.capture.take() {
            Some(handle) => {
                handle.stop();
                true
            }
            None => false,
        }
    }

    /// Drain pending events from the capture loop.
    pub fn poll(&mut self) -> Poll {
        let mut poll = Poll::default();
        let Some(handle) = &self.capture else {
            return poll;
        };

        for event in handle.events().try_iter() {
            match event {
                CaptureEvent::Frame(frame) => poll.frame = Some(frame),
                CaptureEvent::Failed(reason) => poll.failure = Some(reason),
            }
        }

        if poll.failure.is_some() {
            self.stop();
        }
        poll
    }

    /// Enroll the first face in `image` under `name` and persist the store.
    ///
    /// Returns the stored name. A running loop keeps its old snapshot until
    /// the next start.
    pub fn add_face(&mut self, image: &Path, name: &str) -> Result<String, ControllerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ControllerError::EmptyName);
        }

        let embedding = {
            let mut analyzer = self
                .analyzer
                .lock()
                .map_err(|_| ControllerError::AnalyzerPoisoned)?;
            enroll_from_image(&mut *analyzer, image)?
        };

        self.store.append_and_persist(name, embedding)?;
        tracing::info!(name, total = self.store.len(), "face enrolled");
        Ok(name.to_string())
    }

    /// Contents of today's recognition log, if it exists.
    pub fn view_logs(&self) -> Result<Option<String>, ControllerError> {
        Ok(self.log.read_today()?)
    }

    /// Stop any running loop; called before the window closes.
    pub fn shutdown(&mut self) {
        if self.stop() {
            tracing::info!("capture loop stopped for shutdown");
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
