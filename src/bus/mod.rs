//! In-process message passing between the orchestrator and the surfaces.
//!
//! Two delivery modes: request/response (a surface asks, the orchestrator
//! answers exactly once) and best-effort push (the orchestrator addresses the
//! active page or the open popups; nobody listening is not an error).

pub mod events;
pub mod messages;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub use events::{StoreArea, StoreChange, StoreEvents, StoreSubscription};
pub use messages::{CaptureReply, PushMessage, Request, Response};

const REQUEST_QUEUE_CAPACITY: usize = 32;
const PUSH_QUEUE_CAPACITY: usize = 16;

pub type SurfaceId = u64;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("no handler is serving requests")]
    Closed,
    #[error("request handler went away without replying")]
    Dropped,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SurfaceKind {
    /// A page that can show the overlay and be captured.
    Page,
    /// A status popup; receives `UPDATE_POPUP` hints.
    Popup,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceInfo {
    pub id: SurfaceId,
    pub kind: SurfaceKind,
    pub title: String,
}

/// Result of a best-effort push. Callers may log it but must not branch
/// pipeline control flow on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    NoActiveSurface,
    Undeliverable,
}

/// A request in flight together with its reply slot.
pub struct Envelope {
    pub request: Request,
    reply: oneshot::Sender<Response>,
}

impl Envelope {
    pub fn respond(self, response: Response) {
        if self.reply.send(response).is_err() {
            log::debug!("requester gave up before the {:?} reply", self.request);
        }
    }
}

/// The orchestrator's end of the request channel.
pub struct RequestReceiver {
    receiver: mpsc::Receiver<Envelope>,
}

impl RequestReceiver {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }
}

struct SurfaceSlot {
    info: SurfaceInfo,
    sender: mpsc::Sender<PushMessage>,
}

#[derive(Default)]
struct Registry {
    surfaces: HashMap<SurfaceId, SurfaceSlot>,
    active: Option<SurfaceId>,
    next_id: SurfaceId,
}

struct BusInner {
    requests: mpsc::Sender<Envelope>,
    registry: Mutex<Registry>,
}

impl BusInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn detach(&self, id: SurfaceId) {
        let mut registry = self.registry();
        registry.surfaces.remove(&id);
        if registry.active == Some(id) {
            registry.active = None;
        }
    }
}

#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    pub fn new() -> (Self, RequestReceiver) {
        let (requests, receiver) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let bus = Self {
            inner: Arc::new(BusInner {
                requests,
                registry: Mutex::new(Registry::default()),
            }),
        };
        (bus, RequestReceiver { receiver })
    }

    /// Send a request and wait for its single reply.
    pub async fn request(&self, request: Request) -> Result<Response, BusError> {
        let (reply, reply_rx) = oneshot::channel();
        self.inner
            .requests
            .send(Envelope { request, reply })
            .await
            .map_err(|_| BusError::Closed)?;

        reply_rx.await.map_err(|_| BusError::Dropped)
    }

    /// Register a receiving context. The first page attached while no page is
    /// active becomes the active surface.
    pub fn attach_surface(&self, kind: SurfaceKind, title: impl Into<String>) -> SurfaceHandle {
        let (sender, receiver) = mpsc::channel(PUSH_QUEUE_CAPACITY);
        let mut registry = self.inner.registry();

        registry.next_id += 1;
        let info = SurfaceInfo {
            id: registry.next_id,
            kind,
            title: title.into(),
        };

        if kind == SurfaceKind::Page && registry.active.is_none() {
            registry.active = Some(info.id);
        }
        registry.surfaces.insert(
            info.id,
            SurfaceSlot {
                info: info.clone(),
                sender,
            },
        );

        SurfaceHandle {
            info,
            receiver,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Make a page surface the foreground one. Popups cannot be active.
    pub fn set_active(&self, id: SurfaceId) -> bool {
        let mut registry = self.inner.registry();
        match registry.surfaces.get(&id) {
            Some(slot) if slot.info.kind == SurfaceKind::Page => {
                registry.active = Some(id);
                true
            }
            _ => false,
        }
    }

    pub fn active_surface(&self) -> Option<SurfaceInfo> {
        let registry = self.inner.registry();
        registry
            .active
            .and_then(|id| registry.surfaces.get(&id))
            .map(|slot| slot.info.clone())
    }

    pub fn push_to_active(&self, message: PushMessage) -> Delivery {
        let registry = self.inner.registry();
        let Some(slot) = registry.active.and_then(|id| registry.surfaces.get(&id)) else {
            return Delivery::NoActiveSurface;
        };

        match slot.sender.try_send(message) {
            Ok(()) => Delivery::Delivered,
            Err(_) => Delivery::Undeliverable,
        }
    }

    /// Push to every popup; returns how many accepted the message.
    pub fn push_to_popups(&self, message: PushMessage) -> usize {
        let registry = self.inner.registry();
        registry
            .surfaces
            .values()
            .filter(|slot| slot.info.kind == SurfaceKind::Popup)
            .filter(|slot| slot.sender.try_send(message.clone()).is_ok())
            .count()
    }

    #[cfg(test)]
    pub(crate) fn surface_count(&self) -> usize {
        self.inner.registry().surfaces.len()
    }
}

/// A surface's receiving end; dropping it detaches the surface.
pub struct SurfaceHandle {
    info: SurfaceInfo,
    receiver: mpsc::Receiver<PushMessage>,
    bus: Weak<BusInner>,
}

impl SurfaceHandle {
    pub fn id(&self) -> SurfaceId {
        self.info.id
    }

    pub async fn recv(&mut self) -> Option<PushMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PushMessage> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.detach(self.info.id);
        }
    }
}
