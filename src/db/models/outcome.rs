//! The two single-slot "last outcome" records and the snapshot surfaces read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;

/// Most recent successful run. `analysis` is absent for capture-only runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub screenshot: String,
    pub analysis: Option<AnalysisResult>,
    pub captured_at: DateTime<Utc>,
}

impl CaptureResult {
    pub fn analysis_text(&self) -> Option<&str> {
        self.analysis.as_ref().map(|a| a.analysis.as_str())
    }

    pub fn answer(&self) -> Option<&str> {
        self.analysis.as_ref().and_then(|a| a.answer.as_deref())
    }

    pub fn analysis_time_seconds(&self) -> Option<f64> {
        self.analysis.as_ref().map(|a| a.analysis_time)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Read-only snapshot of the result cache.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

/// Whichever outcome is newer.
#[derive(Debug, Clone, PartialEq)]
pub enum Latest {
    Result(CaptureResult),
    Error(ErrorRecord),
}

impl LastOutcome {
    pub fn is_empty(&self) -> bool {
        self.screenshot.is_none() && self.error.is_none()
    }

    pub fn capture_result(&self) -> Option<CaptureResult> {
        Some(CaptureResult {
            screenshot: self.screenshot.clone()?,
            analysis: self.analysis.clone(),
            captured_at: self.captured_at?,
        })
    }

    /// The error wins only when it is strictly newer than the last result.
    pub fn latest(&self) -> Option<Latest> {
        match (self.capture_result(), self.error.clone()) {
            (Some(result), Some(error)) if error.occurred_at > result.captured_at => {
                Some(Latest::Error(error))
            }
            (Some(result), _) => Some(Latest::Result(result)),
            (None, Some(error)) => Some(Latest::Error(error)),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn result_at(at: DateTime<Utc>) -> LastOutcome {
        LastOutcome {
            screenshot: Some("data:image/png;base64,AAAA".into()),
            analysis: None,
            captured_at: Some(at),
            error: None,
        }
    }

    #[test]
    fn newer_error_wins() {
        let now = Utc::now();
        let mut outcome = result_at(now - Duration::seconds(10));
        outcome.error = Some(ErrorRecord {
            message: "boom".into(),
            occurred_at: now,
        });
        assert!(matches!(outcome.latest(), Some(Latest::Error(e)) if e.message == "boom"));
    }

    #[test]
    fn older_error_loses() {
        let now = Utc::now();
        let mut outcome = result_at(now);
        outcome.error = Some(ErrorRecord {
            message: "stale".into(),
            occurred_at: now - Duration::seconds(10),
        });
        assert!(matches!(outcome.latest(), Some(Latest::Result(_))));
    }

    #[test]
    fn empty_snapshot_has_nothing_to_show() {
        let outcome = LastOutcome::default();
        assert!(outcome.is_empty());
        assert_eq!(outcome.latest(), None);
        assert_eq!(serde_json::to_value(&outcome).unwrap(), serde_json::json!({}));
    }
}
