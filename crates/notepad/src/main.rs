//! PV Notepad Server
//!
//! Serves the PVs declared in a JSON configuration file, picks up new entries
//! while running, and keeps values across restarts in an autosave file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use notepad::autosave::AutosaveStore;
use notepad::config::NotepadConfig;
use notepad::pv::{DescriptorBuilder, Registry};
use notepad::server::{AppState, create_router};
use notepad::source::{ConfigSource, JsonFileSource};
use notepad::startup;
use notepad_runtime::service::ServiceManager;

/// PV Notepad - dynamically updated PV server
#[derive(Parser, Debug)]
#[command(name = "notepad-ioc")]
#[command(about = "Serve notepad PVs from a JSON configuration", long_about = None)]
struct Args {
    /// JSON list of PV definitions
    #[arg(long, default_value = "config.json", env = "NOTEPAD_CONFIG")]
    config: PathBuf,

    /// Autosave file
    #[arg(long, default_value = "notepad_autosave.json", env = "NOTEPAD_AUTOSAVE")]
    autosave: PathBuf,

    /// Prefix for the server's own PVs
    #[arg(long, default_value = "PCDSDEVICES:Notepad:")]
    prefix: String,

    /// Server host address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Server port
    #[arg(long, default_value = "5064")]
    port: u16,

    /// Seconds between configuration scans
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    refresh_interval: u64,

    /// Seconds between autosave flushes
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    autosave_interval: u64,

    /// Reject definitions with limits on non-numeric records
    #[arg(long)]
    strict_limits: bool,

    /// Don't keep a .bak copy of the previous autosave file
    #[arg(long)]
    no_backup: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> NotepadConfig {
        let mut config = NotepadConfig::default()
            .with_config_path(self.config)
            .with_autosave_path(self.autosave)
            .with_prefix(self.prefix)
            .with_refresh_interval(Duration::from_secs(self.refresh_interval))
            .with_autosave_interval(Duration::from_secs(self.autosave_interval))
            .with_strict_limits(self.strict_limits);
        config.host = self.host;
        config.port = self.port;
        config.keep_backup = !self.no_backup;
        config
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("notepad=info,tower_http=info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);
    let config = args.into_config();

    info!("Starting PV Notepad v{}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(Registry::new());
    let source: Arc<dyn ConfigSource> = Arc::new(JsonFileSource::new(&config.config_path));
    let store = AutosaveStore::new(&config.autosave_path).with_backup(config.keep_backup);
    let builder = DescriptorBuilder::new().strict(config.strict_limits);

    if let Err(e) = startup::populate(&registry, source.as_ref(), &store, &builder, &config).await {
        error!("Cannot serve PVs from {}: {}", source.describe(), e);
        std::process::exit(1);
    }

    let service_manager = Arc::new(ServiceManager::new());

    startup::spawn_services(&service_manager, &registry, Arc::clone(&source), store, builder, &config)
        .await
        .context("Failed to start background services")?;

    let state = AppState::new(Arc::clone(&registry));
    let forwarder = state.spawn_registry_forwarder();
    let app = create_router(state);

    let listener = match startup::bind(&config).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.bind_addr(), e);
            service_manager.shutdown_all().await.ok();
            std::process::exit(1);
        }
    };

    info!("Serving {} PVs on ws://{}/ws", registry.len(), config.bind_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&service_manager)))
        .await?;

    forwarder.abort();
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal(service_manager: Arc<ServiceManager>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }

    // Stops the refresh loop and runs the final autosave flush
    if let Err(e) = service_manager.shutdown_all().await {
        warn!("Some services did not shut down cleanly: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervals_must_be_positive() {
        assert!(Args::try_parse_from(["notepad-ioc", "--refresh-interval", "0"]).is_err());
        assert!(Args::try_parse_from(["notepad-ioc", "--autosave-interval", "0"]).is_err());

        let args = Args::try_parse_from(["notepad-ioc", "--refresh-interval", "1", "--host", "localhost"]).unwrap();
        let config = args.into_config();
        assert_eq!(config.refresh_interval, Duration::from_secs(1));
        assert_eq!(config.bind_addr(), "localhost:5064");
    }
}
