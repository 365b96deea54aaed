use serde::{Deserialize, Serialize};

use crate::{analysis::AnalysisResult, db::models::LastOutcome};

/// Requests a surface can send to the orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    CaptureScreen,
    GetLastResult,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaptureReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Capture(CaptureReply),
    LastResult(Box<LastOutcome>),
    /// The handler could not produce an answer, e.g. the result cache is
    /// unreadable.
    Unavailable { error: String },
}

impl Response {
    pub fn unavailable(error: impl Into<String>) -> Self {
        Response::Unavailable {
            error: error.into(),
        }
    }

    pub fn into_capture(self) -> Option<CaptureReply> {
        match self {
            Response::Capture(reply) => Some(reply),
            Response::Unavailable { error } => Some(CaptureReply::failed(error)),
            Response::LastResult(_) => None,
        }
    }

    /// The last outcome, or the reason it could not be read.
    pub fn into_last_result(self) -> Result<LastOutcome, String> {
        match self {
            Response::LastResult(outcome) => Ok(*outcome),
            Response::Unavailable { error } => Err(error),
            Response::Capture(_) => Err("unexpected reply to last-result request".into()),
        }
    }
}

/// Fire-and-forget messages pushed to surfaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushMessage {
    AnalysisComplete(AnalysisResult),
    /// Hint for popups to re-pull; carries nothing.
    UpdatePopup,
}
