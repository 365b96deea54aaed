//! Transient result card shown on the active page after an analysis.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use tokio_util::sync::CancellationToken;

use crate::{
    analysis::AnalysisResult,
    bus::{PushMessage, SurfaceHandle},
};

pub const AUTO_DISMISS_AFTER: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, PartialEq)]
pub struct ResultCard {
    pub analysis: String,
    pub answer: Option<String>,
    pub analysis_time: f64,
}

impl From<&AnalysisResult> for ResultCard {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            analysis: result.analysis.clone(),
            answer: result.answer.clone(),
            analysis_time: result.analysis_time,
        }
    }
}

impl ResultCard {
    pub fn render(&self) -> String {
        let mut text = format!("── ScreenMind ──\n{}\n", self.analysis);
        if let Some(answer) = &self.answer {
            text.push_str(&format!("Answer: {answer}\n"));
        }
        text.push_str(&format!("Analysis time: {:.2}s", self.analysis_time));
        text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissReason {
    Timeout,
    Dismissed,
    Replaced,
}

/// Where cards are drawn.
pub trait OverlaySink: Send + Sync + 'static {
    fn show(&self, card: &ResultCard);
    fn hide(&self, reason: DismissReason);
}

/// Draws cards on stdout.
pub struct TerminalSink;

impl OverlaySink for TerminalSink {
    fn show(&self, card: &ResultCard) {
        println!("\n{}\n", card.render());
    }

    fn hide(&self, reason: DismissReason) {
        if reason == DismissReason::Timeout {
            println!("(result dismissed)");
        }
    }
}

struct ActiveCard {
    id: u64,
    card: ResultCard,
    cancel: CancellationToken,
}

struct OverlayInner {
    sink: Arc<dyn OverlaySink>,
    active: Mutex<Option<ActiveCard>>,
    next_id: AtomicU64,
    dismiss_after: Duration,
}

impl OverlayInner {
    fn active(&self) -> MutexGuard<'_, Option<ActiveCard>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Hide card `id` if it is still the one on screen.
    fn expire(&self, id: u64) {
        let expired = {
            let mut active = self.active();
            match active.as_ref() {
                Some(current) if current.id == id => active.take(),
                _ => None,
            }
        };
        if expired.is_some() {
            self.sink.hide(DismissReason::Timeout);
        }
    }
}

/// At most one card at a time; a newer result replaces the current card.
#[derive(Clone)]
pub struct OverlayRenderer {
    inner: Arc<OverlayInner>,
}

impl OverlayRenderer {
    pub fn new(sink: Arc<dyn OverlaySink>) -> Self {
        Self::with_dismiss_after(sink, AUTO_DISMISS_AFTER)
    }

    pub fn with_dismiss_after(sink: Arc<dyn OverlaySink>, dismiss_after: Duration) -> Self {
        Self {
            inner: Arc::new(OverlayInner {
                sink,
                active: Mutex::new(None),
                next_id: AtomicU64::new(1),
                dismiss_after,
            }),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn show(&self, result: &AnalysisResult) {
        let card = ResultCard::from(result);
        let cancel = CancellationToken::new();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let previous = self.inner.active().replace(ActiveCard {
            id,
            card: card.clone(),
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
            self.inner.sink.hide(DismissReason::Replaced);
        }
        self.inner.sink.show(&card);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(inner.dismiss_after) => inner.expire(id),
                _ = cancel.cancelled() => {}
            }
        });
    }

    pub fn dismiss(&self) -> bool {
        let Some(current) = self.inner.active().take() else {
            return false;
        };
        current.cancel.cancel();
        self.inner.sink.hide(DismissReason::Dismissed);
        true
    }

    pub fn current(&self) -> Option<ResultCard> {
        self.inner.active().as_ref().map(|active| active.card.clone())
    }

    /// Render every `ANALYSIS_COMPLETE` pushed to `surface` until it detaches.
    pub async fn run(&self, mut surface: SurfaceHandle) {
        while let Some(message) = surface.recv().await {
            if let PushMessage::AnalysisComplete(result) = message {
                self.show(&result);
            }
        }
    }
}
