//! Service events
//!
//! Services never hold references to each other. The refresh service
//! announces new variables and the autosave service flushes on that
//! announcement, through a broadcast channel owned by the manager.

use std::time::Instant;

use tokio::sync::broadcast;

use super::ServiceResult;

/// A published event
#[derive(Debug, Clone)]
pub struct Event {
    /// `<area>/<what>`, e.g. `registry/variables-added`
    pub event_type: String,
    /// Id of the publishing service
    pub source: String,
    pub data: serde_json::Value,
    pub published_at: Instant,
}

impl Event {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            data,
            published_at: Instant::now(),
        }
    }

    /// Event with no payload
    pub fn now(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(event_type, source, serde_json::Value::Null)
    }

    /// `*` matches everything, `area/*` matches every event of `area`,
    /// anything else must match exactly.
    pub fn matches(&self, pattern: &str) -> bool {
        match pattern.strip_suffix('*') {
            Some("") => true,
            Some(area) if area.ends_with('/') => self.event_type.starts_with(area),
            _ => self.event_type == pattern,
        }
    }
}

/// Cloneable sending side of the event channel
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<Event>,
}

impl EventPublisher {
    pub fn new(tx: broadcast::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Publish to every subscriber. Having none is fine.
    pub fn publish(&self, event: Event) -> ServiceResult<()> {
        // Sending only fails when nobody is subscribed
        let _ = self.tx.send(event);
        Ok(())
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
