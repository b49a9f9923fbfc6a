//! Server Application State
//!
//! Shared state accessible by all WebSocket handlers.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;
use wildmatch::WildMatch;

use crate::pv::{Registry, RegistryEvent};

use super::protocol::{ChangeType, ServerMessage, pv_path};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    registry: Arc<Registry>,

    /// Connected clients
    clients: DashMap<Uuid, ClientState>,
}

/// Per-client state
#[derive(Debug, Clone)]
pub struct ClientState {
    pub session_id: Uuid,

    /// Subscribed paths (with potential wildcards)
    pub subscriptions: HashSet<String>,

    /// Channel to send messages to this client
    pub tx: mpsc::Sender<ServerMessage>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                registry,
                clients: DashMap::new(),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Register a new client connection
    pub fn register_client(&self, tx: mpsc::Sender<ServerMessage>) -> Uuid {
        let session_id = Uuid::new_v4();
        self.inner.clients.insert(
            session_id,
            ClientState {
                session_id,
                subscriptions: HashSet::new(),
                tx,
            },
        );
        tracing::info!("Client connected: {}", session_id);
        session_id
    }

    pub fn remove_client(&self, session_id: Uuid) {
        self.inner.clients.remove(&session_id);
        tracing::info!("Client disconnected: {}", session_id);
    }

    /// Add subscriptions for a client
    pub fn subscribe(&self, session_id: Uuid, paths: &[String]) {
        if let Some(mut client) = self.inner.clients.get_mut(&session_id) {
            for path in paths {
                tracing::debug!("Client {} subscribed to: {}", session_id, path);
                client.subscriptions.insert(path.clone());
            }
        }
    }

    pub fn unsubscribe(&self, session_id: Uuid, paths: &[String]) {
        if let Some(mut client) = self.inner.clients.get_mut(&session_id) {
            for path in paths {
                client.subscriptions.remove(path);
            }
        }
    }

    pub fn get_subscriptions(&self, session_id: Uuid) -> HashSet<String> {
        self.inner
            .clients
            .get(&session_id)
            .map(|c| c.subscriptions.clone())
            .unwrap_or_default()
    }

    /// Send a message to all clients subscribed to a path
    pub fn broadcast(&self, path: &str, message: ServerMessage) {
        for client in self.inner.clients.iter() {
            if !Self::matches_any_subscription(&client.subscriptions, path) {
                continue;
            }
            if let Err(e) = client.tx.try_send(message.clone()) {
                tracing::warn!("Failed to send change to client {}: {}", client.session_id, e);
            }
        }
    }

    pub fn client_count(&self) -> usize {
        self.inner.clients.len()
    }

    /// Send a message to a specific client. Returns false if it was dropped.
    pub fn send_to_client(&self, session_id: Uuid, message: ServerMessage) -> bool {
        let Some(client) = self.inner.clients.get(&session_id) else {
            tracing::debug!("Dropping message for unknown client {}", session_id);
            return false;
        };
        match client.tx.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to send message to client {}: {}", session_id, e);
                false
            }
        }
    }

    /// Forward registry changes to subscribed clients until the registry's
    /// event channel closes.
    pub fn spawn_registry_forwarder(&self) -> JoinHandle<()> {
        let state = self.clone();
        let mut events = self.inner.registry.subscribe();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => state.forward(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Dropped {} registry changes for slow clients", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn forward(&self, event: RegistryEvent) {
        let (address, message) = match event {
            RegistryEvent::Added { address } => {
                let data = self
                    .inner
                    .registry
                    .get(&address)
                    .and_then(|v| serde_json::to_value(v.snapshot()).ok());
                let message = ServerMessage::change(pv_path(&address), ChangeType::Created, data);
                (address, message)
            }
            RegistryEvent::ValueChanged { address, value } => {
                let message = ServerMessage::change(
                    pv_path(&address),
                    ChangeType::Updated,
                    Some(json!({ "value": value })),
                );
                (address, message)
            }
        };

        self.broadcast(&pv_path(&address), message);
    }

    /// Check if a path matches any subscription pattern
    ///
    /// `/pv/*` matches one level below `/pv`, `/pv/**` any depth; other
    /// patterns are glob-matched (`/pv/TST:*`).
    pub(crate) fn matches_any_subscription(subscriptions: &HashSet<String>, path: &str) -> bool {
        subscriptions.iter().any(|pattern| {
            if pattern == path {
                return true;
            }

            if let Some(prefix) = pattern.strip_suffix("/**") {
                return path.starts_with(prefix);
            }

            if let Some(prefix) = pattern.strip_suffix("/*") {
                if let Some(remainder) = path.strip_prefix(prefix) {
                    return remainder.is_empty()
                        || (remainder.starts_with('/') && !remainder[1..].contains('/'));
                }
                return false;
            }

            WildMatch::new(pattern).matches(path)
        })
    }
}
