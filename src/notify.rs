//! Toast-style notifications raised by the orchestrator.

use serde::Serialize;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "screenmind::notify";

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    Progress,
    CaptureComplete,
    AnalysisComplete,
    Failure,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn progress(message: &str) -> Self {
        Self {
            kind: NotificationKind::Progress,
            title: "ScreenMind".into(),
            message: message.into(),
        }
    }

    pub fn capture_complete() -> Self {
        Self {
            kind: NotificationKind::CaptureComplete,
            title: "Screenshot saved".into(),
            message: "Open ScreenMind to view the capture.".into(),
        }
    }

    pub fn analysis_complete(answer: Option<&str>) -> Self {
        let message = match answer {
            Some(answer) => format!("Answer: {answer}"),
            None => "Open ScreenMind to view the result.".into(),
        };
        Self {
            kind: NotificationKind::AnalysisComplete,
            title: "Analysis complete".into(),
            message,
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            kind: NotificationKind::Failure,
            title: "ScreenMind error".into(),
            message: message.into(),
        }
    }
}

/// Platform toast primitive. Delivery is fire-and-forget.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Failure => {
                log_warn!("{}: {}", notification.title, notification.message)
            }
            _ => log_info!("{}: {}", notification.title, notification.message),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_notification_mentions_answer_when_present() {
        assert_eq!(
            Notification::analysis_complete(Some("4")).message,
            "Answer: 4"
        );
        assert!(Notification::analysis_complete(None)
            .message
            .contains("view the result"));
    }

    #[test]
    fn failure_carries_the_error_text() {
        let n = Notification::failure("no active surface");
        assert_eq!(n.kind, NotificationKind::Failure);
        assert_eq!(n.message, "no active surface");
    }
}
