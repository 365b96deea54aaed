use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Which durable store a change happened in.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StoreArea {
    /// Settings (`serverUrl`, `autoAnalyze`, ...).
    Sync,
    /// Result cache (`lastScreenshot`, `lastError`, ...).
    Local,
}

/// A hint that some keys changed. Consumers re-read the store instead of
/// trusting the payload; `area == None` means notices were dropped and
/// everything should be re-read.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoreChange {
    pub area: Option<StoreArea>,
    pub keys: Vec<String>,
}

impl StoreChange {
    pub fn resync() -> Self {
        Self {
            area: None,
            keys: Vec::new(),
        }
    }

    pub fn touches(&self, area: StoreArea, key: &str) -> bool {
        match self.area {
            None => true,
            Some(changed) => changed == area && self.keys.iter().any(|k| k == key),
        }
    }
}

/// Fan-out of store-change notices to every open surface.
#[derive(Clone)]
pub struct StoreEvents {
    sender: broadcast::Sender<StoreChange>,
}

impl Default for StoreEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn emit<I, S>(&self, area: StoreArea, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return;
        }
        // No subscribers is the normal state when no UI is open.
        let _ = self.sender.send(StoreChange {
            area: Some(area),
            keys,
        });
    }

    pub fn subscribe(&self) -> StoreSubscription {
        StoreSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Live subscription; dropping it unsubscribes.
pub struct StoreSubscription {
    receiver: broadcast::Receiver<StoreChange>,
}

impl StoreSubscription {
    /// Next notice, or `None` once every emitter is gone.
    pub async fn next(&mut self) -> Option<StoreChange> {
        match self.receiver.recv().await {
            Ok(change) => Some(change),
            Err(RecvError::Lagged(skipped)) => {
                log::debug!("store subscriber lagged by {skipped} notices, asking for resync");
                Some(StoreChange::resync())
            }
            Err(RecvError::Closed) => None,
        }
    }

    /// Non-blocking variant.
    #[cfg(test)]
    pub(crate) fn try_next(&mut self) -> Option<StoreChange> {
        use broadcast::error::TryRecvError;
        match self.receiver.try_recv() {
            Ok(change) => Some(change),
            Err(TryRecvError::Lagged(_)) => Some(StoreChange::resync()),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }
}
