use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{oneshot, watch, Mutex};
use uuid::Uuid;

use crate::{
    analysis::AnalysisClient,
    bus::{CaptureReply, Delivery, MessageBus, PushMessage, StoreEvents},
    capture::ScreenCapturer,
    db::{
        models::{CaptureResult, HistoryEntry, LastOutcome},
        Database,
    },
    error::{Busy, PipelineError},
    notify::{Notification, Notifier},
    result_cache::ResultCache,
    settings::{Settings, SettingsStore},
};

use super::{PipelineState, PipelineStatus};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "screenmind::pipeline";

use crate::{log_debug, log_error, log_info, log_warn};

/// How a finished run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Capture-only run; the raw image was stored.
    Stored(CaptureResult),
    Analyzed(CaptureResult),
    Failed(PipelineError),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, RunOutcome::Failed(_))
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            RunOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn to_reply(&self) -> CaptureReply {
        match self.error() {
            Some(err) => CaptureReply::failed(err.to_string()),
            None => CaptureReply::ok(),
        }
    }
}

/// Handle to an accepted run.
pub struct RunTicket {
    run_id: String,
    done: oneshot::Receiver<RunOutcome>,
}

impl RunTicket {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn wait(self) -> RunOutcome {
        self.done.await.unwrap_or_else(|_| {
            RunOutcome::Failed(PipelineError::CaptureFailed(
                "pipeline task ended without an outcome".into(),
            ))
        })
    }
}

/// Owns the capture → analyze → notify state machine. At most one run is in
/// flight; overlapping triggers are rejected with [`Busy`].
#[derive(Clone)]
pub struct Orchestrator {
    state: Arc<Mutex<PipelineState>>,
    status_tx: Arc<watch::Sender<PipelineStatus>>,
    settings: Arc<SettingsStore>,
    cache: ResultCache,
    db: Database,
    bus: MessageBus,
    capturer: Arc<dyn ScreenCapturer>,
    client: AnalysisClient,
    notifier: Arc<dyn Notifier>,
}

impl Orchestrator {
    pub fn new(
        settings: Arc<SettingsStore>,
        db: Database,
        events: StoreEvents,
        bus: MessageBus,
        capturer: Arc<dyn ScreenCapturer>,
        client: AnalysisClient,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (status_tx, _) = watch::channel(PipelineStatus::Idle);
        Self {
            state: Arc::new(Mutex::new(PipelineState::new())),
            status_tx: Arc::new(status_tx),
            settings,
            cache: ResultCache::new(db.clone(), events),
            db,
            bus,
            capturer,
            client,
            notifier,
        }
    }

    pub async fn get_state(&self) -> PipelineState {
        self.state.lock().await.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PipelineStatus> {
        self.status_tx.subscribe()
    }

    pub async fn get_last_outcome(&self) -> Result<LastOutcome> {
        self.cache.snapshot().await
    }

    /// Accept or reject immediately. An accepted run continues on its own
    /// task; the ticket resolves when it is back to `Idle`.
    pub async fn trigger_capture(&self) -> Result<RunTicket, Busy> {
        let run_id = Uuid::new_v4().to_string();
        {
            let mut state = self.state.lock().await;
            if let Err(busy) = state.begin_run(run_id.clone(), Utc::now()) {
                log_info!(
                    "Capture rejected, run {} is {:?}",
                    state.run_id.as_deref().unwrap_or("?"),
                    state.status
                );
                return Err(busy);
            }
            self.status_tx.send_replace(PipelineStatus::Capturing);
        }

        // autoAnalyze and friends are fixed for the lifetime of the run.
        let settings = self.settings.read();
        let (done_tx, done_rx) = oneshot::channel();
        let this = self.clone();
        let id = run_id.clone();
        tokio::spawn(async move {
            let run = {
                let this = this.clone();
                let id = id.clone();
                tokio::spawn(async move { this.run_pipeline(&id, settings).await })
            };
            let outcome = match run.await {
                Ok(outcome) => outcome,
                Err(err) => this.abandon(&id, err).await,
            };
            if done_tx.send(outcome).is_err() {
                log_debug!("Run {id} finished with nobody waiting");
            }
        });

        Ok(RunTicket {
            run_id,
            done: done_rx,
        })
    }

    pub async fn capture_and_wait(&self) -> Result<RunOutcome, Busy> {
        Ok(self.trigger_capture().await?.wait().await)
    }

    async fn run_pipeline(&self, run_id: &str, settings: Settings) -> RunOutcome {
        log_info!(
            "Run {run_id} started (auto_analyze={})",
            settings.auto_analyze
        );

        let finished = match self.capture_and_analyze(&settings).await {
            Ok(result) => self.complete(&settings, result).await,
            Err(err) => Err(err),
        };
        let outcome = match finished {
            Ok(outcome) => outcome,
            Err(err) => self.fail(&settings, err).await,
        };

        {
            let mut state = self.state.lock().await;
            state.finish();
            self.status_tx.send_replace(PipelineStatus::Idle);
        }

        match &outcome {
            RunOutcome::Failed(err) => log_info!("Run {run_id} failed: {}", err.kind()),
            RunOutcome::Stored(_) => log_info!("Run {run_id} stored a capture"),
            RunOutcome::Analyzed(_) => log_info!("Run {run_id} completed"),
        }
        outcome
    }

    async fn capture_and_analyze(&self, settings: &Settings) -> Result<CaptureResult, PipelineError> {
        self.notify(settings, Notification::progress("Capturing screen…"));
        let surface = self
            .bus
            .active_surface()
            .ok_or(PipelineError::NoActiveSurface)?;

        let capturer = self.capturer.clone();
        let image = tokio::task::spawn_blocking(move || capturer.capture(&surface))
            .await
            .map_err(|err| PipelineError::CaptureFailed(format!("capture task failed: {err}")))?
            .map_err(|err| PipelineError::CaptureFailed(format!("{err:#}")))?;
        let captured_at = Utc::now();
        let screenshot = image.to_data_uri();
        log_debug!("Captured {}x{} PNG ({} bytes)", image.width, image.height, image.png.len());

        if !settings.auto_analyze {
            return Ok(CaptureResult {
                screenshot,
                analysis: None,
                captured_at,
            });
        }

        self.advance(PipelineStatus::Uploading).await;
        self.notify(settings, Notification::progress("Analyzing…"));
        let upload = self.client.prepare(&settings.server_url, image.png)?;
        log_debug!("Uploading capture to {}", upload.url());

        // The timeout covers the upload and the wait for the answer together.
        let timeout = Duration::from_secs(u64::from(settings.analysis_timeout_seconds));
        let analysis = self
            .client
            .execute_with(upload, timeout, || self.advance(PipelineStatus::Analyzing))
            .await?;

        Ok(CaptureResult {
            screenshot,
            analysis: Some(analysis),
            captured_at,
        })
    }

    async fn complete(
        &self,
        settings: &Settings,
        result: CaptureResult,
    ) -> Result<RunOutcome, PipelineError> {
        let Some(analysis) = result.analysis.clone() else {
            self.advance(PipelineStatus::Stored).await;
            self.persist(&result).await?;
            self.notify(settings, Notification::capture_complete());
            self.bus.push_to_popups(PushMessage::UpdatePopup);
            return Ok(RunOutcome::Stored(result));
        };

        self.advance(PipelineStatus::Complete).await;
        self.persist(&result).await?;

        if settings.save_history {
            let entry = HistoryEntry::from_result(&analysis, result.captured_at);
            if let Err(err) = self
                .db
                .insert_history(&entry, settings.max_history_items)
                .await
            {
                log_warn!("Failed to append history entry: {err:#}");
            }
        }

        self.notify(
            settings,
            Notification::analysis_complete(analysis.answer.as_deref()),
        );
        match self.bus.push_to_active(PushMessage::AnalysisComplete(analysis)) {
            Delivery::Delivered => log_debug!("Result pushed to the active surface"),
            other => log_debug!("Result not pushed to a surface: {other:?}"),
        }
        self.bus.push_to_popups(PushMessage::UpdatePopup);

        Ok(RunOutcome::Analyzed(result))
    }

    async fn fail(&self, settings: &Settings, err: PipelineError) -> RunOutcome {
        self.advance(PipelineStatus::Failed).await;
        log_warn!("Pipeline failed ({}): {err}", err.kind());

        let message = err.to_string();
        if let Err(store_err) = self.cache.record_error(&message, Utc::now()).await {
            log_error!("Failed to record pipeline error: {store_err:#}");
        }
        self.notify(settings, Notification::failure(&message));
        self.bus.push_to_popups(PushMessage::UpdatePopup);

        RunOutcome::Failed(err)
    }

    /// The run task died before reaching `Idle`: record why and release the
    /// busy guard so later triggers are accepted.
    async fn abandon(&self, run_id: &str, err: tokio::task::JoinError) -> RunOutcome {
        log_error!("Run {run_id} aborted: {err}");
        let err = PipelineError::CaptureFailed(format!("pipeline task aborted: {err}"));

        if let Err(store_err) = self.cache.record_error(&err.to_string(), Utc::now()).await {
            log_error!("Failed to record pipeline error: {store_err:#}");
        }
        {
            let mut state = self.state.lock().await;
            if state.run_id.as_deref() == Some(run_id) {
                state.finish();
                self.status_tx.send_replace(PipelineStatus::Idle);
            }
        }
        self.bus.push_to_popups(PushMessage::UpdatePopup);

        RunOutcome::Failed(err)
    }

    async fn persist(&self, result: &CaptureResult) -> Result<(), PipelineError> {
        self.cache
            .record_success(result)
            .await
            .map_err(|err| PipelineError::PersistFailed(format!("{err:#}")))
    }

    async fn advance(&self, next: PipelineStatus) {
        let mut state = self.state.lock().await;
        let from = state.status;
        if !state.advance(next) {
            log_warn!("Unexpected pipeline transition {from:?} -> {next:?}");
        }
        self.status_tx.send_replace(next);
    }

    fn notify(&self, settings: &Settings, notification: Notification) {
        if settings.show_notifications {
            self.notifier.notify(notification);
        }
    }
}
