pub mod types;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

pub use types::{CycleOutcome, CycleStatus};

use crate::rules::EmittedEvent;
use crate::wsps::WspsReading;

#[derive(Default)]
struct Latest {
    reading: Option<WspsReading>,
    event: Option<EmittedEvent>,
    status: Option<CycleStatus>,
}

/// Latest published reading, event and cycle status. Read by the HTTP API;
/// in-process consumers can subscribe to events instead of polling.
#[derive(Clone)]
pub struct PulseView {
    inner: Arc<RwLock<Latest>>,
    events: watch::Sender<Option<EmittedEvent>>,
}

impl Default for PulseView {
    fn default() -> Self {
        let (events, _) = watch::channel(None);
        Self {
            inner: Arc::new(RwLock::new(Latest::default())),
            events,
        }
    }
}

impl PulseView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins.
    pub async fn publish_reading(&self, reading: WspsReading) {
        self.inner.write().await.reading = Some(reading);
    }

    pub async fn publish_event(&self, event: EmittedEvent) {
        self.inner.write().await.event = Some(event.clone());
        self.events.send_replace(Some(event));
    }

    pub async fn publish_status(&self, status: CycleStatus) {
        self.inner.write().await.status = Some(status);
    }

    pub async fn reading(&self) -> Option<WspsReading> {
        self.inner.read().await.reading.clone()
    }

    pub async fn last_event(&self) -> Option<EmittedEvent> {
        self.inner.read().await.event.clone()
    }

    pub async fn last_status(&self) -> Option<CycleStatus> {
        self.inner.read().await.status.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<EmittedEvent>> {
        self.events.subscribe()
    }
}
