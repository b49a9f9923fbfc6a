//! Autosave Service
//!
//! Flushes the registry snapshot to the autosave file on every tick, right
//! after a refresh exposed new variables, on request, and once more when
//! stopped. A failed write is logged and retried at the next flush.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use notepad_runtime::service::{Event, Service, ServiceContext, ServiceResult, ServiceSpec};
use notepad_types::PvValue;

use super::{FLUSH_REQUEST_EVENT, VARIABLES_ADDED_EVENT};
use crate::autosave::{AutosaveStore, PersistenceError};
use crate::pv::Registry;

pub struct AutosaveService {
    registry: Arc<Registry>,
    store: AutosaveStore,
    interval: Duration,
    /// Last snapshot written successfully
    last_saved: Option<Vec<(String, PvValue)>>,
}

impl AutosaveService {
    pub fn new(registry: Arc<Registry>, store: AutosaveStore, interval: Duration) -> Self {
        Self {
            registry,
            store,
            interval,
            last_saved: None,
        }
    }

    pub const SERVICE_ID: &'static str = "autosave/flush";

    /// Write the current snapshot unless it matches the last one written.
    ///
    /// Returns whether a write happened.
    pub async fn flush(&mut self) -> Result<bool, PersistenceError> {
        let snapshot = self.registry.snapshot();
        if self.last_saved.as_ref() == Some(&snapshot) {
            return Ok(false);
        }

        self.store.save(&snapshot).await?;
        self.last_saved = Some(snapshot);
        Ok(true)
    }

    async fn flush_logged(&mut self) {
        match self.flush().await {
            Ok(true) => debug!("Autosaved {} values", self.registry.len()),
            Ok(false) => {}
            Err(e) => warn!("{}; retrying at next flush", e),
        }
    }
}

#[async_trait]
impl Service for AutosaveService {
    fn spec(&self) -> ServiceSpec {
        ServiceSpec::new(Self::SERVICE_ID, "Autosave")
            .with_tick_interval(self.interval)
            .subscribe(VARIABLES_ADDED_EVENT)
            .subscribe(FLUSH_REQUEST_EVENT)
    }

    async fn on_start(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        info!(
            "Autosaving to {} every {:?}",
            self.store.path().display(),
            self.interval
        );
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        self.flush_logged().await;
        Ok(())
    }

    async fn on_event(&mut self, _ctx: &ServiceContext, event: Event) -> ServiceResult<()> {
        debug!("Autosave flush triggered by {}", event.event_type);
        self.flush_logged().await;
        Ok(())
    }

    async fn on_tick(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        self.flush_logged().await;
        Ok(())
    }
}
