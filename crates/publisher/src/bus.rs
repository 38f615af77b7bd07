//! Event bus clients.

use cuckoo_dxl_common::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Connection to the publish/subscribe fabric.
///
/// The host owns one client and shares it between publish runs, so
/// implementations must accept concurrent `publish` calls. Session setup,
/// credentials and reconnects belong to the implementation.
pub trait EventBusClient: Send + Sync {
    /// Connect to the fabric. Calling this on a connected client is a no-op.
    fn connect(&self) -> Result<()>;

    /// Check if the connection is still alive.
    fn is_connected(&self) -> bool;

    /// Send `payload` to every subscriber of `topic`.
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;
}

/// A message captured by [`MemoryBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// In-process client that records every published message.
#[derive(Debug, Default)]
pub struct MemoryBus {
    connected: AtomicBool,
    events: Mutex<Vec<PublishedEvent>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client that is already connected.
    pub fn connected() -> Self {
        let bus = Self::new();
        bus.connected.store(true, Ordering::SeqCst);
        bus
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Messages published so far, in publish order.
    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Messages published on one topic.
    pub fn events_on(&self, topic: &str) -> Vec<PublishedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.topic == topic)
            .collect()
    }
}

impl EventBusClient for MemoryBus {
    fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Connection(format!(
                "cannot publish on {}: client is not connected",
                topic
            )));
        }

        debug!("Memory bus publish: {} ({} bytes)", topic, payload.len());
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(PublishedEvent {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            });
        Ok(())
    }
}
