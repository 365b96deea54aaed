use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Busy;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PipelineStatus {
    #[default]
    Idle,
    Capturing,
    Stored,
    Uploading,
    Analyzing,
    Complete,
    Failed,
}

impl PipelineStatus {
    pub fn is_idle(self) -> bool {
        self == PipelineStatus::Idle
    }

    /// Edges of the run state machine. `Stored` and `Complete` may still fall
    /// to `Failed` when the result cannot be persisted.
    pub fn can_advance_to(self, next: PipelineStatus) -> bool {
        use PipelineStatus::*;
        matches!(
            (self, next),
            (Idle, Capturing)
                | (Capturing, Stored | Uploading | Failed)
                | (Uploading, Analyzing | Failed)
                | (Analyzing, Complete | Failed)
                | (Stored | Complete, Failed)
                | (Stored | Complete | Failed, Idle)
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    pub status: PipelineStatus,
    pub run_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-set of the busy guard. Callers hold the state lock, so two
    /// triggers can never both see `Idle`.
    pub fn begin_run(&mut self, run_id: String, started_at: DateTime<Utc>) -> Result<(), Busy> {
        if !self.status.is_idle() {
            return Err(Busy);
        }
        *self = Self {
            status: PipelineStatus::Capturing,
            run_id: Some(run_id),
            started_at: Some(started_at),
        };
        Ok(())
    }

    /// Returns false for an edge the state machine does not have; the status
    /// is updated either way.
    pub fn advance(&mut self, next: PipelineStatus) -> bool {
        let allowed = self.status.can_advance_to(next);
        self.status = next;
        allowed
    }

    pub fn finish(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_is_busy() {
        let mut state = PipelineState::new();
        state.begin_run("a".into(), Utc::now()).unwrap();
        assert_eq!(state.begin_run("b".into(), Utc::now()), Err(Busy));
        assert_eq!(state.run_id.as_deref(), Some("a"));
    }

    #[test]
    fn analyzed_run_walks_the_happy_path() {
        let mut state = PipelineState::new();
        state.begin_run("a".into(), Utc::now()).unwrap();
        for next in [
            PipelineStatus::Uploading,
            PipelineStatus::Analyzing,
            PipelineStatus::Complete,
        ] {
            assert!(state.advance(next), "unexpected edge into {next:?}");
        }
        state.finish();
        assert!(state.status.is_idle());
        assert!(state.run_id.is_none());
    }

    #[test]
    fn skipping_steps_is_flagged() {
        assert!(!PipelineStatus::Idle.can_advance_to(PipelineStatus::Analyzing));
        assert!(!PipelineStatus::Capturing.can_advance_to(PipelineStatus::Complete));
        assert!(!PipelineStatus::Uploading.can_advance_to(PipelineStatus::Idle));
        assert!(PipelineStatus::Capturing.can_advance_to(PipelineStatus::Failed));
        assert!(PipelineStatus::Capturing.can_advance_to(PipelineStatus::Stored));
    }

    #[test]
    fn finished_run_accepts_new_trigger() {
        let mut state = PipelineState::new();
        state.begin_run("a".into(), Utc::now()).unwrap();
        state.advance(PipelineStatus::Failed);
        state.finish();
        assert!(state.begin_run("b".into(), Utc::now()).is_ok());
    }
}
