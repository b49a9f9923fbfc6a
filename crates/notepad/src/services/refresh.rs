//! Refresh Service
//!
//! Every tick re-reads the whole configuration source and registers the
//! variables that are not served yet. Existing variables are never touched,
//! so their values and client monitors survive every scan.
//!
//! Cycle: scan (read the source) -> merge (register new descriptors) -> sleep
//! until the next tick. A failed scan leaves the registry as it was.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use notepad_runtime::service::{Service, ServiceContext, ServiceResult, ServiceSpec};
use notepad_types::PvValue;

use super::VARIABLES_ADDED_EVENT;
use crate::pv::{DescriptorBuilder, Registry};
use crate::source::{ConfigSource, SourceError};

/// Outcome of one scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    /// Definitions read from the source
    pub scanned: usize,
    /// Addresses registered by this scan, in configuration order
    pub added: Vec<String>,
    /// Descriptors whose address was already registered
    pub skipped: usize,
}

/// Run one scan and merge its new variables into the registry
pub async fn refresh_once(
    registry: &Registry,
    source: &dyn ConfigSource,
    builder: &DescriptorBuilder,
) -> Result<RefreshReport, SourceError> {
    let definitions = source.load().await?;

    let mut report = RefreshReport {
        scanned: definitions.len(),
        ..Default::default()
    };

    for descriptor in builder.build_all(&definitions) {
        let address = descriptor.address.clone();
        if registry.register_if_absent(descriptor) {
            report.added.push(address);
        } else {
            report.skipped += 1;
        }
    }

    Ok(report)
}

pub struct RefreshService {
    registry: Arc<Registry>,
    source: Arc<dyn ConfigSource>,
    builder: DescriptorBuilder,
    interval: Duration,
    helper_address: String,
    scans: i64,
}

impl RefreshService {
    pub fn new(
        registry: Arc<Registry>,
        source: Arc<dyn ConfigSource>,
        builder: DescriptorBuilder,
        interval: Duration,
        helper_address: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            source,
            builder,
            interval,
            helper_address: helper_address.into(),
            scans: 0,
        }
    }

    pub const SERVICE_ID: &'static str = "registry/refresh";
}

#[async_trait]
impl Service for RefreshService {
    fn spec(&self) -> ServiceSpec {
        ServiceSpec::new(Self::SERVICE_ID, "Configuration Refresh")
            .with_tick_interval(self.interval)
    }

    async fn on_start(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        // Continue counting from the restored value
        if let Some(PvValue::Int(scans)) = self.registry.get(&self.helper_address).map(|v| v.value()) {
            self.scans = scans;
        }
        info!(
            "Watching {} for new PVs every {:?}",
            self.source.describe(),
            self.interval
        );
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        debug!("Refresh stopped after {} scans", self.scans);
        Ok(())
    }

    async fn on_tick(&mut self, ctx: &ServiceContext) -> ServiceResult<()> {
        let report = match refresh_once(&self.registry, self.source.as_ref(), &self.builder).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Configuration scan of {} failed: {}", self.source.describe(), e);
                return Ok(());
            }
        };

        self.scans += 1;
        if let Err(e) = self.registry.set_value(&self.helper_address, PvValue::Int(self.scans)) {
            debug!("Scan counter not updated: {}", e);
        }

        debug!(
            "Scanned {} definitions: {} new, {} already served",
            report.scanned,
            report.added.len(),
            report.skipped
        );

        if report.added.is_empty() {
            return Ok(());
        }

        for address in &report.added {
            info!("New PV available: {}", address);
        }

        ctx.emit(VARIABLES_ADDED_EVENT, json!({ "addresses": report.added }))
    }
}
