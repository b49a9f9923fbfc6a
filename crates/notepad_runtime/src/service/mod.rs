//! Background Services
//!
//! A service is a piece of long-running server work, such as rescanning the
//! configuration or flushing autosave. The `ServiceManager` runs every
//! service on its own tokio task and drives it through four hooks:
//!
//! - `on_start` once, before anything else
//! - `on_tick` every `tick_interval` (first tick immediately)
//! - `on_event` for each published event matching a subscription
//! - `on_stop` once, on shutdown, bounded by `shutdown_timeout`
//!
//! Errors from `on_tick` and `on_event` are logged and the service keeps
//! running.

mod event;
mod handle;
mod manager;

pub use event::*;
pub use handle::*;
pub use manager::*;

use std::time::Duration;

use async_trait::async_trait;

/// Errors raised by services and the manager
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("Service {0} failed to start: {1}")]
    StartFailed(String, String),

    #[error("Service already running: {0}")]
    AlreadyRunning(String),

    #[error("Service not running: {0}")]
    NotRunning(String),

    #[error("Service {0} failed: {1}")]
    Failed(String, String),

    #[error("Service {0} did not stop in time")]
    ShutdownTimeout(String),

    #[error("Service {0} panicked")]
    Panicked(String),

    #[error("Channel closed")]
    ChannelClosed,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// How the manager should run a service
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    /// Unique identifier, also used as the event source
    pub id: String,
    pub name: String,
    pub tick_interval: Option<Duration>,
    /// Event type patterns (`autosave/flush`, `registry/*`, `*`)
    pub subscriptions: Vec<String>,
    /// Upper bound on `on_stop`
    pub shutdown_timeout: Duration,
}

impl ServiceSpec {
    pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tick_interval: None,
            subscriptions: Vec::new(),
            shutdown_timeout: Self::DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    pub fn subscribe(mut self, pattern: impl Into<String>) -> Self {
        self.subscriptions.push(pattern.into());
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// True if any subscription pattern matches the event
    pub fn wants(&self, event: &Event) -> bool {
        self.subscriptions.iter().any(|pattern| event.matches(pattern))
    }
}

/// Handed to every hook; lets a service publish events
pub struct ServiceContext {
    pub service_id: String,
    publisher: EventPublisher,
}

impl ServiceContext {
    pub fn new(service_id: impl Into<String>, publisher: EventPublisher) -> Self {
        Self {
            service_id: service_id.into(),
            publisher,
        }
    }

    /// Publish an event with this service as its source
    pub fn emit(&self, event_type: impl Into<String>, data: serde_json::Value) -> ServiceResult<()> {
        self.publisher.publish(Event::new(event_type, &self.service_id, data))
    }
}

#[async_trait]
pub trait Service: Send + 'static {
    fn spec(&self) -> ServiceSpec;

    /// An error here keeps the service from running at all
    async fn on_start(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        Ok(())
    }

    async fn on_event(&mut self, _ctx: &ServiceContext, _event: Event) -> ServiceResult<()> {
        Ok(())
    }

    async fn on_tick(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_subscriptions() {
        let spec = ServiceSpec::new("autosave/flush", "Autosave")
            .with_tick_interval(Duration::from_secs(10))
            .subscribe("registry/*")
            .subscribe("autosave/flush");

        assert_eq!(spec.tick_interval, Some(Duration::from_secs(10)));
        assert_eq!(spec.shutdown_timeout, ServiceSpec::DEFAULT_SHUTDOWN_TIMEOUT);
        assert!(spec.wants(&Event::now("registry/variables-added", "x")));
        assert!(spec.wants(&Event::now("autosave/flush", "x")));
        assert!(!spec.wants(&Event::now("autosave/other", "x")));
    }
}
