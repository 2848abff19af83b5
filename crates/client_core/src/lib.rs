use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, Utc};
use shared::{
    domain::{RequestId, SessionView, Settings, Theme},
    error::TransportError,
};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

pub mod asset_holder;
pub mod download;
pub mod history;
pub mod image_store;
pub mod progress;
pub mod settings;
pub mod transport;
pub mod view;

pub use asset_holder::{AssetHolder, ImageUpload, SourceImage};
pub use download::DownloadError;
pub use history::{HistoryCache, HistoryEntry, HISTORY_CAPACITY};
pub use image_store::{DisplayRef, ImageKey, ImageStore, StoredImage};
pub use progress::{ProgressConfig, ProgressEstimator, PROGRESS_COMPLETE};
pub use settings::{DetachedThemeSink, SettingsStore, ThemeSink};
pub use transport::{
    BackendConfigError, ColorizeBackend, ColorizedImage, HttpColorizeBackend,
    MissingColorizeBackend,
};
pub use view::ViewState;

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct ColorizationRequest {
    pub id: RequestId,
    pub source: SourceImage,
    pub high_quality: bool,
    pub auto_save: bool,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ColorizationResult {
    pub request_id: RequestId,
    pub original: DisplayRef,
    pub colorized: DisplayRef,
    pub high_quality: bool,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Idle,
    Submitting(RequestId),
    Succeeded(RequestId),
    Failed(RequestId),
}

impl PipelinePhase {
    pub fn is_submitting(self) -> bool {
        matches!(self, Self::Submitting(_))
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no image selected")]
    NoSelection,
    #[error("a colorization request is already in flight")]
    Busy,
    #[error("colorization failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SelectionChanged(Option<ImageKey>),
    PhaseChanged(PipelinePhase),
    ResultReady {
        request_id: RequestId,
        colorized: ImageKey,
    },
    SubmissionFailed {
        request_id: RequestId,
        error: TransportError,
    },
    HistoryChanged {
        len: usize,
    },
    SettingsChanged(Settings),
    ThemeChanged(Theme),
    ViewChanged(SessionView),
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub settings: Settings,
    pub view: SessionView,
    pub phase: PipelinePhase,
    pub progress: u8,
    pub preview: Option<DisplayRef>,
    pub result: Option<ColorizationResult>,
    pub history: Vec<HistoryEntry>,
    pub last_failure: Option<TransportError>,
}

pub struct SessionOptions {
    pub settings: Settings,
    pub progress: ProgressConfig,
    pub history_capacity: usize,
    pub theme_sink: Arc<dyn ThemeSink>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            progress: ProgressConfig::default(),
            history_capacity: HISTORY_CAPACITY,
            theme_sink: Arc::new(DetachedThemeSink),
        }
    }
}

struct PipelineSlot {
    phase: PipelinePhase,
    current_result: Option<ColorizationResult>,
    last_failure: Option<TransportError>,
}

pub struct ColorizeSession {
    backend: Arc<dyn ColorizeBackend>,
    images: ImageStore,
    settings: SettingsStore,
    assets: Mutex<AssetHolder>,
    progress: ProgressEstimator,
    pipeline: Mutex<PipelineSlot>,
    history: RwLock<HistoryCache>,
    view: Mutex<ViewState>,
    events: broadcast::Sender<SessionEvent>,
}

/// Keeps the pipeline honest if a submit future is dropped mid-flight: the
/// estimator is stopped and the phase returns to idle.
struct InFlight<'a> {
    session: &'a ColorizeSession,
    request_id: RequestId,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(request_id = %self.request_id, "colorization request abandoned before completion");
        self.session.progress.stop(false);
        self.session.finish(self.request_id);
    }
}

impl ColorizeSession {
    pub fn new(backend: Arc<dyn ColorizeBackend>) -> Arc<Self> {
        Self::new_with_options(backend, SessionOptions::default())
    }

    pub fn new_with_options(backend: Arc<dyn ColorizeBackend>, options: SessionOptions) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            backend,
            images: ImageStore::new(),
            settings: SettingsStore::new(options.settings, options.theme_sink),
            assets: Mutex::new(AssetHolder::new()),
            progress: ProgressEstimator::new(options.progress),
            pipeline: Mutex::new(PipelineSlot {
                phase: PipelinePhase::Idle,
                current_result: None,
                last_failure: None,
            }),
            history: RwLock::new(HistoryCache::with_capacity(options.history_capacity)),
            view: Mutex::new(ViewState::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; the snapshot accessors stay authoritative.
        let _ = self.events.send(event);
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn read_image(&self, reference: &DisplayRef) -> Option<StoredImage> {
        self.images.read(reference)
    }

    // ---- asset holder ----

    pub fn select_image(&self, upload: ImageUpload) -> DisplayRef {
        let file_name = upload.file_name.clone();
        let (preview, previous) = lock(&self.assets).select(&self.images, upload);
        drop(previous);

        let discarded = lock(&self.pipeline).current_result.take();
        drop(discarded);

        info!(file = %file_name, key = %preview.key(), "image selected");
        self.emit(SessionEvent::SelectionChanged(Some(preview.key().clone())));
        preview
    }

    pub fn clear_selection(&self) {
        let previous = lock(&self.assets).clear();
        if previous.is_some() {
            drop(previous);
            self.emit(SessionEvent::SelectionChanged(None));
        }
    }

    pub fn current_preview(&self) -> Option<DisplayRef> {
        lock(&self.assets).current_preview()
    }

    pub fn current_source(&self) -> Option<SourceImage> {
        lock(&self.assets).current().cloned()
    }

    // ---- pipeline ----

    pub fn phase(&self) -> PipelinePhase {
        lock(&self.pipeline).phase
    }

    pub fn progress(&self) -> u8 {
        self.progress.value()
    }

    pub fn is_progress_running(&self) -> bool {
        self.progress.is_running()
    }

    pub fn current_result(&self) -> Option<ColorizationResult> {
        lock(&self.pipeline).current_result.clone()
    }

    pub fn last_failure(&self) -> Option<TransportError> {
        lock(&self.pipeline).last_failure.clone()
    }

    pub async fn submit(&self) -> Result<ColorizationResult, SessionError> {
        let request = self.begin_submission()?;
        let guard = InFlight {
            session: self,
            request_id: request.id,
            armed: true,
        };

        info!(
            request_id = %request.id,
            file = %request.source.file_name,
            high_quality = request.high_quality,
            auto_save = request.auto_save,
            "submitting image for colorization"
        );
        let outcome = self.backend.colorize(&request).await;
        guard.disarm();

        match outcome {
            Ok(image) => Ok(self.complete_success(request, image)),
            Err(err) => Err(self.complete_failure(request, err)),
        }
    }

    fn begin_submission(&self) -> Result<ColorizationRequest, SessionError> {
        let mut pipeline = lock(&self.pipeline);
        if let PipelinePhase::Submitting(in_flight) = pipeline.phase {
            debug!(%in_flight, "submit ignored: a request is already in flight");
            return Err(SessionError::Busy);
        }

        let Some(source) = lock(&self.assets).current().cloned() else {
            debug!("submit refused: no image selected");
            return Err(SessionError::NoSelection);
        };
        let settings = self.settings.snapshot();
        let request = ColorizationRequest {
            id: RequestId::new(),
            source,
            high_quality: settings.high_quality,
            auto_save: settings.auto_save,
            submitted_at: Utc::now(),
        };
        pipeline.phase = PipelinePhase::Submitting(request.id);
        self.progress.start();
        drop(pipeline);

        self.emit(SessionEvent::PhaseChanged(PipelinePhase::Submitting(request.id)));
        Ok(request)
    }

    fn complete_success(
        &self,
        request: ColorizationRequest,
        image: ColorizedImage,
    ) -> ColorizationResult {
        self.progress.stop(true);

        let colorized = self.images.insert(image.bytes, image.mime_type);
        let result = ColorizationResult {
            request_id: request.id,
            original: request.source.preview.clone(),
            colorized,
            high_quality: request.high_quality,
            completed_at: Utc::now(),
        };

        let replaced = {
            let mut pipeline = lock(&self.pipeline);
            pipeline.phase = PipelinePhase::Succeeded(request.id);
            pipeline.last_failure = None;
            pipeline.current_result.replace(result.clone())
        };
        drop(replaced);

        info!(
            request_id = %request.id,
            key = %result.colorized.key(),
            elapsed_ms = (result.completed_at - request.submitted_at).num_milliseconds(),
            "colorization succeeded"
        );
        self.emit(SessionEvent::PhaseChanged(PipelinePhase::Succeeded(request.id)));
        self.emit(SessionEvent::ResultReady {
            request_id: request.id,
            colorized: result.colorized.key().clone(),
        });

        if request.auto_save {
            self.record_history(&result);
        }

        self.finish(request.id);
        result
    }

    fn complete_failure(&self, request: ColorizationRequest, error: TransportError) -> SessionError {
        self.progress.stop(false);
        {
            let mut pipeline = lock(&self.pipeline);
            pipeline.phase = PipelinePhase::Failed(request.id);
            pipeline.last_failure = Some(error.clone());
        }

        warn!(request_id = %request.id, "colorization failed: {error}");
        self.emit(SessionEvent::PhaseChanged(PipelinePhase::Failed(request.id)));
        self.emit(SessionEvent::SubmissionFailed {
            request_id: request.id,
            error: error.clone(),
        });

        self.finish(request.id);
        SessionError::Transport(error)
    }

    fn finish(&self, request_id: RequestId) {
        let reset = {
            let mut pipeline = lock(&self.pipeline);
            let owned = match pipeline.phase {
                PipelinePhase::Submitting(id)
                | PipelinePhase::Succeeded(id)
                | PipelinePhase::Failed(id) => id == request_id,
                PipelinePhase::Idle => false,
            };
            if owned {
                pipeline.phase = PipelinePhase::Idle;
            }
            owned
        };
        if reset {
            self.emit(SessionEvent::PhaseChanged(PipelinePhase::Idle));
        }
    }

    // ---- history ----

    fn record_history(&self, result: &ColorizationResult) {
        let entry = HistoryEntry {
            request_id: result.request_id,
            original: result.original.clone(),
            colorized: result.colorized.clone(),
            timestamp: result.completed_at,
        };
        let (evicted, len) = {
            let mut history = write_lock(&self.history);
            let evicted = history.push(entry);
            (evicted, history.len())
        };
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "history capacity reached; oldest entries evicted");
        }
        drop(evicted);
        self.emit(SessionEvent::HistoryChanged { len });
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        read_lock(&self.history).list()
    }

    pub fn history_entry(&self, index: usize) -> Option<HistoryEntry> {
        read_lock(&self.history).get(index).cloned()
    }

    pub fn history_len(&self) -> usize {
        read_lock(&self.history).len()
    }

    pub fn clear_history(&self) {
        let cleared = write_lock(&self.history).clear();
        if !cleared.is_empty() {
            info!(entries = cleared.len(), "history cleared");
        }
        drop(cleared);
        self.emit(SessionEvent::HistoryChanged { len: 0 });
    }

    // ---- settings ----

    pub fn settings(&self) -> Settings {
        self.settings.snapshot()
    }

    pub fn set_high_quality(&self, enabled: bool) {
        self.settings.set_high_quality(enabled);
        self.emit(SessionEvent::SettingsChanged(self.settings.snapshot()));
    }

    pub fn toggle_high_quality(&self) -> bool {
        let enabled = !self.settings.high_quality();
        self.set_high_quality(enabled);
        enabled
    }

    pub fn set_auto_save(&self, enabled: bool) {
        self.settings.set_auto_save(enabled);
        self.emit(SessionEvent::SettingsChanged(self.settings.snapshot()));
    }

    pub fn toggle_auto_save(&self) -> bool {
        let enabled = !self.settings.auto_save();
        self.set_auto_save(enabled);
        enabled
    }

    pub fn set_dark_mode(&self, enabled: bool) {
        let theme = self.settings.set_dark_mode(enabled);
        self.emit(SessionEvent::SettingsChanged(self.settings.snapshot()));
        self.emit(SessionEvent::ThemeChanged(theme));
    }

    pub fn toggle_dark_mode(&self) -> bool {
        let enabled = !self.settings.dark_mode();
        self.set_dark_mode(enabled);
        enabled
    }

    pub fn theme(&self) -> Theme {
        self.settings.theme()
    }

    // ---- view ----

    pub fn view(&self) -> SessionView {
        lock(&self.view).active()
    }

    pub fn set_view(&self, view: SessionView) {
        let changed = lock(&self.view).show(view);
        if changed {
            debug!(%view, "view changed");
            self.emit(SessionEvent::ViewChanged(view));
        }
    }

    pub fn show_gallery(&self) {
        self.set_view(SessionView::History);
    }

    // ---- presentation boundary ----

    pub fn snapshot(&self) -> SessionSnapshot {
        let (phase, result, last_failure) = {
            let pipeline = lock(&self.pipeline);
            (
                pipeline.phase,
                pipeline.current_result.clone(),
                pipeline.last_failure.clone(),
            )
        };
        SessionSnapshot {
            settings: self.settings.snapshot(),
            view: self.view(),
            phase,
            progress: self.progress.value(),
            preview: self.current_preview(),
            result,
            history: self.history(),
            last_failure,
        }
    }

    pub async fn download_result(
        &self,
        reference: &DisplayRef,
        destination: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let image = self
            .images
            .read(reference)
            .ok_or_else(|| DownloadError::Released(reference.key().clone()))?;
        download::save_image(&image, destination).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
