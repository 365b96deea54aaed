//! Single-slot record of the last successful run and the last failure.
//! Only the orchestrator writes here; surfaces read snapshots.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::{
    analysis::AnalysisResult,
    bus::{StoreArea, StoreEvents},
    db::{
        models::{CaptureResult, ErrorRecord, LastOutcome},
        parse_datetime, Database, LocalWrite,
    },
};

pub const KEY_LAST_SCREENSHOT: &str = "lastScreenshot";
pub const KEY_LAST_ANALYSIS: &str = "lastAnalysis";
pub const KEY_LAST_ANALYSIS_TIME: &str = "lastAnalysisTime";
pub const KEY_LAST_ERROR: &str = "lastError";
pub const KEY_LAST_ERROR_TIME: &str = "lastErrorTime";

const ALL_KEYS: [&str; 5] = [
    KEY_LAST_SCREENSHOT,
    KEY_LAST_ANALYSIS,
    KEY_LAST_ANALYSIS_TIME,
    KEY_LAST_ERROR,
    KEY_LAST_ERROR_TIME,
];

#[derive(Clone)]
pub struct ResultCache {
    db: Database,
    events: StoreEvents,
}

impl ResultCache {
    pub fn new(db: Database, events: StoreEvents) -> Self {
        Self { db, events }
    }

    /// Overwrite the success slot and clear the error slot in one batch.
    pub async fn record_success(&self, result: &CaptureResult) -> Result<()> {
        let mut batch = LocalWrite::default()
            .set(KEY_LAST_SCREENSHOT, result.screenshot.clone())
            .set(KEY_LAST_ANALYSIS_TIME, result.captured_at.to_rfc3339());

        batch = match &result.analysis {
            Some(analysis) => batch.set(KEY_LAST_ANALYSIS, serde_json::to_string(analysis)?),
            None => batch.remove(KEY_LAST_ANALYSIS),
        };
        batch = batch.remove(KEY_LAST_ERROR).remove(KEY_LAST_ERROR_TIME);

        self.commit(batch).await
    }

    /// The previous success stays in place.
    pub async fn record_error(&self, message: &str, at: DateTime<Utc>) -> Result<()> {
        let batch = LocalWrite::default()
            .set(KEY_LAST_ERROR, message)
            .set(KEY_LAST_ERROR_TIME, at.to_rfc3339());
        self.commit(batch).await
    }

    pub async fn snapshot(&self) -> Result<LastOutcome> {
        let values = self.db.get_local(&ALL_KEYS).await?;

        let analysis = match values.get(KEY_LAST_ANALYSIS) {
            Some(raw) => match serde_json::from_str::<AnalysisResult>(raw) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    log::warn!("Ignoring unreadable {KEY_LAST_ANALYSIS}: {err}");
                    None
                }
            },
            None => None,
        };

        let captured_at = values
            .get(KEY_LAST_ANALYSIS_TIME)
            .map(|raw| parse_datetime(raw, KEY_LAST_ANALYSIS_TIME))
            .transpose()?;

        let error = match (values.get(KEY_LAST_ERROR), values.get(KEY_LAST_ERROR_TIME)) {
            (Some(message), Some(raw)) => Some(ErrorRecord {
                message: message.clone(),
                occurred_at: parse_datetime(raw, KEY_LAST_ERROR_TIME)?,
            }),
            _ => None,
        };

        Ok(LastOutcome {
            screenshot: values.get(KEY_LAST_SCREENSHOT).cloned(),
            analysis,
            captured_at,
            error,
        })
    }

    async fn commit(&self, batch: LocalWrite) -> Result<()> {
        let keys = batch.keys();
        self.db.write_local(batch).await?;
        self.events.emit(StoreArea::Local, keys);
        Ok(())
    }
}
