//! The popup: a pull-driven summary of settings, server health and the last
//! outcome, re-read whenever a store changes or the orchestrator pokes it.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::{
    analysis::{AnalysisClient, HealthStatus},
    bus::{
        BusError, CaptureReply, MessageBus, PushMessage, Request, StoreArea, StoreSubscription,
        SurfaceHandle, SurfaceKind,
    },
    db::models::{LastOutcome, Latest},
    settings::{Settings, SettingsError, SettingsPatch, SettingsStore, KEY_SERVER_URL},
    utils::time::format_relative,
};

/// What woke the view up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    StoreChange,
    PopupPush,
}

pub struct StatusView {
    bus: MessageBus,
    settings_store: Arc<SettingsStore>,
    client: AnalysisClient,
    surface: SurfaceHandle,
    changes: StoreSubscription,
    settings: Settings,
    last: LastOutcome,
    /// Set when the last outcome could not be read.
    unavailable: Option<String>,
    health: Option<HealthStatus>,
}

impl StatusView {
    /// Attach as a popup surface, then pull settings, last outcome and health.
    pub async fn open(
        bus: MessageBus,
        settings_store: Arc<SettingsStore>,
        client: AnalysisClient,
    ) -> Result<Self> {
        let surface = bus.attach_surface(SurfaceKind::Popup, "popup");
        let changes = settings_store.subscribe();
        let settings = settings_store.read();

        let mut view = Self {
            bus,
            settings_store,
            client,
            surface,
            changes,
            settings,
            last: LastOutcome::default(),
            unavailable: None,
            health: None,
        };
        view.refresh().await?;
        view.check_health().await;
        Ok(view)
    }

    pub async fn refresh(&mut self) -> Result<()> {
        self.settings = self.settings_store.read();
        let response = self.bus.request(Request::GetLastResult).await?;
        match response.into_last_result() {
            Ok(last) => {
                self.last = last;
                self.unavailable = None;
            }
            Err(error) => {
                log::warn!("Popup could not load the last outcome: {error}");
                self.unavailable = Some(error);
            }
        }
        Ok(())
    }

    pub async fn check_health(&mut self) -> HealthStatus {
        let status = self.client.check_health(&self.settings.server_url).await;
        self.health = Some(status);
        status
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn last(&self) -> &LastOutcome {
        &self.last
    }

    pub fn health(&self) -> Option<HealthStatus> {
        self.health
    }

    /// The newer of the last result and the last error.
    pub fn display(&self) -> Option<Latest> {
        self.last.latest()
    }

    pub async fn capture(&self) -> Result<CaptureReply, BusError> {
        let response = self.bus.request(Request::CaptureScreen).await?;
        Ok(response
            .into_capture()
            .unwrap_or_else(|| CaptureReply::failed("unexpected reply to capture request")))
    }

    pub fn toggle_auto_analyze(&mut self) -> Result<bool, SettingsError> {
        self.settings = self.settings_store.read();
        let next = !self.settings.auto_analyze;
        self.settings_store.write(&SettingsPatch {
            auto_analyze: Some(next),
            ..SettingsPatch::default()
        })?;
        self.settings.auto_analyze = next;
        Ok(next)
    }

    pub fn toggle_notifications(&mut self) -> Result<bool, SettingsError> {
        self.settings = self.settings_store.read();
        let next = !self.settings.show_notifications;
        self.settings_store.write(&SettingsPatch {
            show_notifications: Some(next),
            ..SettingsPatch::default()
        })?;
        self.settings.show_notifications = next;
        Ok(next)
    }

    /// Wait for the next store change or `UPDATE_POPUP`, then re-pull.
    /// A new server URL also re-checks health. `None` once both sources are
    /// gone.
    pub async fn wait_for_update(&mut self) -> Result<Option<UpdateSource>> {
        let mut server_moved = false;
        let source = tokio::select! {
            change = self.changes.next() => change.map(|change| {
                server_moved = change.touches(StoreArea::Sync, KEY_SERVER_URL);
                UpdateSource::StoreChange
            }),
            push = self.surface.recv() => match push {
                Some(PushMessage::UpdatePopup) => Some(UpdateSource::PopupPush),
                // Popups are never the active page, but stay tolerant.
                Some(PushMessage::AnalysisComplete(_)) => Some(UpdateSource::PopupPush),
                None => None,
            },
        };

        if source.is_some() {
            self.refresh().await?;
        }
        if server_moved {
            self.check_health().await;
        }
        Ok(source)
    }

    pub fn render(&self, now: DateTime<Utc>) -> String {
        let health = match self.health {
            Some(HealthStatus::Online) => "online",
            Some(HealthStatus::Offline) => "offline",
            Some(HealthStatus::TimedOut) => "not responding",
            None => "unknown",
        };
        let mut lines = vec![
            format!("Server: {health} ({})", self.settings.server_url),
            format!(
                "Auto-analyze: {}  Notifications: {}",
                on_off(self.settings.auto_analyze),
                on_off(self.settings.show_notifications)
            ),
        ];

        match &self.unavailable {
            Some(error) => lines.push(format!("Last outcome unavailable: {error}")),
            None => lines.extend(describe_latest(self.display(), now)),
        }
        lines.join("\n")
    }
}

/// Lines describing the newest outcome, as the popup and `screenmind last` show it.
pub fn describe_latest(latest: Option<Latest>, now: DateTime<Utc>) -> Vec<String> {
    match latest {
        None => vec!["No captures yet".into()],
        Some(Latest::Error(error)) => vec![format!(
            "Last error ({}): {}",
            format_relative(error.occurred_at, now),
            error.message
        )],
        Some(Latest::Result(result)) => {
            let when = format_relative(result.captured_at, now);
            let Some(text) = result.analysis_text() else {
                return vec![format!("Last capture ({when}): screenshot saved")];
            };
            let mut lines = vec![format!("Last result ({when}):"), format!("  {text}")];
            if let Some(answer) = result.answer() {
                lines.push(format!("  Answer: {answer}"));
            }
            lines
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}
