//! Initial registry population
//!
//! Runs once before the server accepts traffic:
//! configuration -> descriptors -> autosave reconciliation -> registry.
//! Then the background services start and the listener is bound.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use notepad_runtime::service::ServiceManager;

use crate::autosave::{AutosaveStore, reconcile};
use crate::config::NotepadConfig;
use crate::pv::{DescriptorBuilder, Registry, VariableDescriptor};
use crate::services::{AutosaveService, RefreshService};
use crate::source::ConfigSource;

/// Outcome of the startup population
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartupReport {
    /// Definitions read from the configuration source
    pub definitions: usize,
    /// Variables registered
    pub registered: usize,
    /// Variables whose initial value came from autosave
    pub restored: usize,
    /// Autosaved addresses with no configuration entry
    pub carried_over: usize,
}

/// Descriptor of the refresh counter helper variable
pub fn helper_descriptor(config: &NotepadConfig) -> VariableDescriptor {
    VariableDescriptor::internal(
        config.helper_address(),
        "file_checker_helper",
        "Number of completed configuration scans",
    )
}

/// Populate an empty registry from the configuration source and autosave file.
///
/// A missing or corrupt autosave file only logs a warning. An unreadable
/// configuration source is an error: there would be nothing to serve.
pub async fn populate(
    registry: &Registry,
    source: &dyn ConfigSource,
    store: &AutosaveStore,
    builder: &DescriptorBuilder,
    config: &NotepadConfig,
) -> crate::Result<StartupReport> {
    let persisted = store.load_or_empty().await;
    let definitions = source.load().await?;

    let mut fresh = vec![helper_descriptor(config)];
    fresh.extend(builder.build_all(&definitions));

    let reconciliation = reconcile(fresh, &persisted);
    let registered = reconciliation
        .descriptors
        .into_iter()
        .map(|descriptor| registry.register_if_absent(descriptor))
        .filter(|added| *added)
        .count();

    let report = StartupReport {
        definitions: definitions.len(),
        registered,
        restored: reconciliation.restored.len(),
        carried_over: reconciliation.carried_over.len(),
    };

    info!(
        "Loaded {} PV definitions from {}: {} variables, {} restored from {}, {} carried over",
        report.definitions,
        source.describe(),
        report.registered,
        report.restored,
        store.path().display(),
        report.carried_over
    );

    Ok(report)
}

/// Start the refresh loop and the autosave flush
pub async fn spawn_services(
    manager: &ServiceManager,
    registry: &Arc<Registry>,
    source: Arc<dyn ConfigSource>,
    store: AutosaveStore,
    builder: DescriptorBuilder,
    config: &NotepadConfig,
) -> crate::Result<()> {
    let refresh = RefreshService::new(
        Arc::clone(registry),
        source,
        builder,
        config.refresh_interval,
        config.helper_address(),
    );
    let autosave = AutosaveService::new(Arc::clone(registry), store, config.autosave_interval);

    manager.spawn(refresh).await?;
    manager.spawn(autosave).await?;
    Ok(())
}

/// Bind the access protocol listener. `host` may be a name or an address.
pub async fn bind(config: &NotepadConfig) -> crate::Result<TcpListener> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pv::VariableOrigin;
    use crate::source::JsonFileSource;
    use notepad_types::PvValue;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_populate_with_autosave() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");
        let autosave_path = dir.path().join("autosave.json");

        std::fs::write(
            &config_path,
            r#"[
                {"read_pv": "A"},
                {"read_pv": "C", "default_value": 2.5},
                {"read_pv": "BAD", "record_type": "nonsense"}
            ]"#,
        )
        .unwrap();
        std::fs::write(&autosave_path, r#"{"A": {"value": 5}, "B": {"value": 7}}"#).unwrap();

        let config = NotepadConfig::default().with_prefix("TST:");
        let registry = Registry::new();
        let report = populate(
            &registry,
            &JsonFileSource::new(&config_path),
            &AutosaveStore::new(&autosave_path),
            &DescriptorBuilder::new(),
            &config,
        )
        .await
        .unwrap();

        assert_eq!(report.definitions, 3);
        assert_eq!(report.registered, 4);
        assert_eq!(report.restored, 1);
        assert_eq!(report.carried_over, 1);

        assert_eq!(registry.get("A").unwrap().value(), PvValue::Float(5.0));
        assert_eq!(registry.get("C").unwrap().value(), PvValue::Float(2.5));
        assert_eq!(
            registry.get("B").unwrap().descriptor().origin,
            VariableOrigin::CarryOver
        );
        assert!(!registry.contains("BAD"));

        let helper = registry.get("TST:file_checker_helper").unwrap();
        assert!(helper.read_only());
        assert_eq!(helper.value(), PvValue::Int(0));
    }

    #[tokio::test]
    async fn test_populate_without_autosave_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"[{"read_pv": "A", "write_pv": "A_SP"}]"#).unwrap();

        let registry = Registry::new();
        let report = populate(
            &registry,
            &JsonFileSource::new(&config_path),
            &AutosaveStore::new(dir.path().join("absent.json")),
            &DescriptorBuilder::new(),
            &NotepadConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.registered, 3);
        assert_eq!(report.carried_over, 0);
    }

    #[tokio::test]
    async fn test_unreadable_config_is_fatal() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new();

        let result = populate(
            &registry,
            &JsonFileSource::new(dir.path().join("absent.json")),
            &AutosaveStore::new(dir.path().join("autosave.json")),
            &DescriptorBuilder::new(),
            &NotepadConfig::default(),
        )
        .await;

        assert!(matches!(result, Err(crate::Error::Source(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_services_starts_refresh_and_autosave() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"[{"read_pv": "A"}]"#).unwrap();

        let config = NotepadConfig::default()
            .with_config_path(&config_path)
            .with_autosave_path(dir.path().join("autosave.json"));
        let registry = Arc::new(Registry::new());
        let source: Arc<dyn ConfigSource> = Arc::new(JsonFileSource::new(&config_path));
        let manager = ServiceManager::new();

        spawn_services(
            &manager,
            &registry,
            Arc::clone(&source),
            AutosaveStore::new(&config.autosave_path),
            DescriptorBuilder::new(),
            &config,
        )
        .await
        .unwrap();
        assert_eq!(manager.len(), 2);

        let again = spawn_services(
            &manager,
            &registry,
            source,
            AutosaveStore::new(&config.autosave_path),
            DescriptorBuilder::new(),
            &config,
        )
        .await;
        assert!(matches!(again, Err(crate::Error::Service(_))));

        manager.shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_accepts_host_names() {
        let mut config = NotepadConfig::default();
        config.host = "localhost".to_string();
        config.port = 0;

        let listener = bind(&config).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }
}
