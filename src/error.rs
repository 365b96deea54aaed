use thiserror::Error;

/// Why a pipeline run ended in `Failed`. The `Display` text is what lands in
/// the error record and in the failure notification.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("no active surface")]
    NoActiveSurface,

    #[error("capture failed: {0}")]
    CaptureFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// Non-2xx from the analysis service; `message` is the server's `detail`
    /// when it sent one.
    #[error("{message}")]
    AnalysisApiError { status: u16, message: String },

    #[error("analysis timed out after {0}s")]
    AnalysisTimeout(u64),

    #[error("unreadable analysis response: {0}")]
    MalformedResponse(String),

    #[error("failed to store result: {0}")]
    PersistFailed(String),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::NoActiveSurface => "NoActiveSurface",
            PipelineError::CaptureFailed(_) => "CaptureFailed",
            PipelineError::UploadFailed(_) => "UploadFailed",
            PipelineError::AnalysisApiError { .. } => "AnalysisApiError",
            PipelineError::AnalysisTimeout(_) => "AnalysisTimeout",
            PipelineError::MalformedResponse(_) => "MalformedResponse",
            PipelineError::PersistFailed(_) => "PersistFailed",
        }
    }
}

/// Returned at the entry point when a run is already in flight.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("a capture is already in progress")]
pub struct Busy;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_displays_server_detail_verbatim() {
        let err = PipelineError::AnalysisApiError {
            status: 500,
            message: "model unavailable".into(),
        };
        assert_eq!(err.to_string(), "model unavailable");
    }

    #[test]
    fn timeout_is_distinguishable_from_api_error() {
        let timeout = PipelineError::AnalysisTimeout(30);
        assert_eq!(timeout.kind(), "AnalysisTimeout");
        assert_eq!(timeout.to_string(), "analysis timed out after 30s");
    }
}
