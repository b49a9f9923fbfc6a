//! Handle to a running service

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::{mpsc, oneshot};

use super::{Event, ServiceError, ServiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceState {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
    Failed = 4,
}

impl ServiceState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Stopping,
            3 => Self::Stopped,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ServiceState::Stopped | ServiceState::Failed)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
            ServiceState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// State shared between a service task and its handles
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub(crate) fn get(&self) -> ServiceState {
        ServiceState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: ServiceState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

pub(crate) enum ServiceCommand {
    /// Deliver an event regardless of subscriptions
    Event(Event),
    /// Run `on_tick` now and report back when it is done
    Tick(oneshot::Sender<()>),
    Shutdown,
}

/// Cheap, cloneable handle; dropping it does not stop the service
#[derive(Clone)]
pub struct ServiceHandle {
    pub service_id: String,
    commands: mpsc::Sender<ServiceCommand>,
    state: SharedState,
}

impl ServiceHandle {
    pub(crate) fn new(service_id: String, commands: mpsc::Sender<ServiceCommand>, state: SharedState) -> Self {
        Self {
            service_id,
            commands,
            state,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    async fn send(&self, command: ServiceCommand) -> ServiceResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ServiceError::NotRunning(self.service_id.clone()))
    }

    /// Deliver an event to this service only
    pub async fn send_event(&self, event: Event) -> ServiceResult<()> {
        self.send(ServiceCommand::Event(event)).await
    }

    /// Run one tick out of schedule and wait for it to finish
    pub async fn force_tick(&self) -> ServiceResult<()> {
        let (done, finished) = oneshot::channel();
        self.send(ServiceCommand::Tick(done)).await?;
        finished.await.map_err(|_| ServiceError::ChannelClosed)
    }

    /// Ask the service to stop; does not wait for `on_stop`
    pub async fn shutdown(&self) -> ServiceResult<()> {
        self.send(ServiceCommand::Shutdown).await
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("service_id", &self.service_id)
            .field("state", &self.state())
            .finish()
    }
}
