//! Service Manager
//!
//! Owns the running services, the shutdown signal and the event channel.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{
    Event, EventPublisher, Service, ServiceCommand, ServiceContext, ServiceError, ServiceHandle, ServiceResult,
    ServiceSpec, ServiceState, SharedState,
};

struct RunningService {
    handle: ServiceHandle,
    task: JoinHandle<ServiceResult<()>>,
    shutdown_timeout: Duration,
}

pub struct ServiceManager {
    services: DashMap<String, RunningService>,
    shutdown_tx: broadcast::Sender<()>,
    events: EventPublisher,
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (event_tx, _) = broadcast::channel(256);

        Self {
            services: DashMap::new(),
            shutdown_tx,
            events: EventPublisher::new(event_tx),
        }
    }

    pub fn event_publisher(&self) -> EventPublisher {
        self.events.clone()
    }

    /// Start a service on its own task.
    ///
    /// The service is subscribed to shutdown and events before this returns,
    /// so nothing published afterwards is missed.
    pub async fn spawn<S: Service>(&self, service: S) -> ServiceResult<ServiceHandle> {
        let spec = service.spec();
        if self.services.contains_key(&spec.id) {
            return Err(ServiceError::AlreadyRunning(spec.id));
        }

        let (command_tx, commands) = mpsc::channel(64);
        let state = SharedState::default();
        let handle = ServiceHandle::new(spec.id.clone(), command_tx, state.clone());

        let task = ServiceTask {
            ctx: ServiceContext::new(spec.id.clone(), self.event_publisher()),
            service,
            state,
            commands,
            shutdown: self.shutdown_tx.subscribe(),
            events: self.events.subscribe(),
            spec: spec.clone(),
        };

        self.services.insert(
            spec.id,
            RunningService {
                handle: handle.clone(),
                task: tokio::spawn(task.run()),
                shutdown_timeout: spec.shutdown_timeout,
            },
        );

        Ok(handle)
    }

    pub fn get(&self, service_id: &str) -> Option<ServiceHandle> {
        self.services.get(service_id).map(|s| s.handle.clone())
    }

    /// Publish an event to every subscribed service
    pub fn emit(&self, event_type: impl Into<String>, source: impl Into<String>, data: serde_json::Value) {
        let _ = self.events.publish(Event::new(event_type, source, data));
    }

    /// Stop one service and wait for its `on_stop`
    pub async fn stop(&self, service_id: &str) -> ServiceResult<()> {
        let (_, running) = self
            .services
            .remove(service_id)
            .ok_or_else(|| ServiceError::NotRunning(service_id.to_string()))?;

        let _ = running.handle.shutdown().await;
        running.join(service_id).await
    }

    /// Stop every service and wait for all of them.
    ///
    /// Returns the first failure, after every service has been waited on.
    pub async fn shutdown_all(&self) -> ServiceResult<()> {
        info!("Stopping {} services", self.services.len());
        let _ = self.shutdown_tx.send(());

        let ids: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        let mut first_error = None;

        for service_id in ids {
            let Some((_, running)) = self.services.remove(&service_id) else {
                continue;
            };
            if let Err(e) = running.join(&service_id).await {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Id and state of every service
    pub fn list(&self) -> Vec<(String, ServiceState)> {
        self.services
            .iter()
            .map(|entry| (entry.key().clone(), entry.handle.state()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl RunningService {
    async fn join(self, service_id: &str) -> ServiceResult<()> {
        // The task may still be inside a tick when asked to stop
        let deadline = self.shutdown_timeout * 2;
        match tokio::time::timeout(deadline, self.task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(service_id, error = ?e, "Service task panicked");
                Err(ServiceError::Panicked(service_id.to_string()))
            }
            Err(_) => {
                warn!(service_id, "Service did not stop in time");
                Err(ServiceError::ShutdownTimeout(service_id.to_string()))
            }
        }
    }
}

/// Everything one service task owns
struct ServiceTask<S> {
    service: S,
    ctx: ServiceContext,
    spec: ServiceSpec,
    state: SharedState,
    commands: mpsc::Receiver<ServiceCommand>,
    shutdown: broadcast::Receiver<()>,
    events: broadcast::Receiver<Event>,
}

impl<S: Service> ServiceTask<S> {
    async fn run(mut self) -> ServiceResult<()> {
        self.state.set(ServiceState::Starting);
        if let Err(e) = self.service.on_start(&self.ctx).await {
            error!(service_id = %self.ctx.service_id, error = %e, "Service failed to start");
            self.state.set(ServiceState::Failed);
            return Err(ServiceError::StartFailed(self.spec.id.clone(), e.to_string()));
        }

        self.state.set(ServiceState::Running);
        info!(service_id = %self.ctx.service_id, "Service started");

        let period = self.spec.tick_interval.filter(|period| {
            if period.is_zero() {
                warn!(service_id = %self.ctx.service_id, "Zero tick interval, periodic ticks disabled");
            }
            !period.is_zero()
        });
        let mut timer = period.map(|period| {
            let mut timer = tokio::time::interval(period);
            // A slow tick delays the next one instead of causing a burst
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => break,
                command = self.commands.recv() => match command {
                    Some(ServiceCommand::Event(event)) => self.dispatch(event).await,
                    Some(ServiceCommand::Tick(done)) => self.tick(Some(done)).await,
                    Some(ServiceCommand::Shutdown) | None => break,
                },
                received = self.events.recv() => match received {
                    Ok(event) if self.spec.wants(&event) => self.dispatch(event).await,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(service_id = %self.ctx.service_id, missed, "Service fell behind on events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                },
                _ = next_tick(&mut timer) => self.tick(None).await,
            }
        }

        self.stop().await
    }

    async fn dispatch(&mut self, event: Event) {
        let event_type = event.event_type.clone();
        if let Err(e) = self.service.on_event(&self.ctx, event).await {
            warn!(service_id = %self.ctx.service_id, event_type = %event_type, error = %e, "Event handler failed");
        }
    }

    async fn tick(&mut self, done: Option<oneshot::Sender<()>>) {
        if let Err(e) = self.service.on_tick(&self.ctx).await {
            warn!(service_id = %self.ctx.service_id, error = %e, "Tick failed");
        }
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    async fn stop(mut self) -> ServiceResult<()> {
        self.state.set(ServiceState::Stopping);
        debug!(service_id = %self.ctx.service_id, "Service stopping");

        let stopped = tokio::time::timeout(self.spec.shutdown_timeout, self.service.on_stop(&self.ctx)).await;
        let result = match stopped {
            Ok(result) => result,
            Err(_) => Err(ServiceError::ShutdownTimeout(self.spec.id.clone())),
        };

        match &result {
            Ok(()) => {
                self.state.set(ServiceState::Stopped);
                info!(service_id = %self.ctx.service_id, "Service stopped");
            }
            Err(e) => {
                self.state.set(ServiceState::Failed);
                error!(service_id = %self.ctx.service_id, error = %e, "Service stop failed");
            }
        }
        result
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Calls {
        started: AtomicUsize,
        stopped: AtomicUsize,
        events: AtomicUsize,
        ticks: AtomicUsize,
    }

    struct Recorder {
        id: &'static str,
        tick_interval: Option<Duration>,
        calls: Arc<Calls>,
    }

    impl Recorder {
        fn new(id: &'static str) -> (Self, Arc<Calls>) {
            let calls = Arc::new(Calls::default());
            let recorder = Self {
                id,
                tick_interval: None,
                calls: Arc::clone(&calls),
            };
            (recorder, calls)
        }
    }

    #[async_trait::async_trait]
    impl Service for Recorder {
        fn spec(&self) -> ServiceSpec {
            let spec = ServiceSpec::new(self.id, "Recorder").subscribe("registry/*");
            match self.tick_interval {
                Some(period) => spec.with_tick_interval(period),
                None => spec,
            }
        }

        async fn on_start(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
            self.calls.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
            self.calls.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_event(&mut self, _ctx: &ServiceContext, _event: Event) -> ServiceResult<()> {
            self.calls.events.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_tick(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
            self.calls.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stop_runs_on_stop() {
        let manager = ServiceManager::new();
        let (recorder, calls) = Recorder::new("recorder");

        let handle = manager.spawn(recorder).await.unwrap();
        handle.force_tick().await.unwrap();
        assert_eq!(calls.started.load(Ordering::SeqCst), 1);
        assert!(handle.is_running());

        manager.stop("recorder").await.unwrap();
        assert_eq!(calls.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), ServiceState::Stopped);
        assert!(manager.is_empty());
        assert!(matches!(manager.stop("recorder").await, Err(ServiceError::NotRunning(_))));
    }

    #[tokio::test]
    async fn test_events_follow_subscriptions() {
        let manager = ServiceManager::new();
        let (recorder, calls) = Recorder::new("recorder");

        let handle = manager.spawn(recorder).await.unwrap();
        manager.emit("registry/variables-added", "test", serde_json::json!({}));
        manager.emit("autosave/flush", "test", serde_json::json!({}));
        handle.send_event(Event::now("direct/anything", "test")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(calls.events.load(Ordering::SeqCst), 2);
        manager.shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_force_tick_waits() {
        let manager = ServiceManager::new();
        let (recorder, calls) = Recorder::new("recorder");

        let handle = manager.spawn(recorder).await.unwrap();
        handle.force_tick().await.unwrap();
        handle.force_tick().await.unwrap();
        assert_eq!(calls.ticks.load(Ordering::SeqCst), 2);

        manager.shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_periodic_ticks_and_shutdown_all() {
        let manager = ServiceManager::new();
        let (mut recorder, calls) = Recorder::new("periodic");
        recorder.tick_interval = Some(Duration::from_millis(10));

        manager.spawn(recorder).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(calls.ticks.load(Ordering::SeqCst) >= 2);
        assert_eq!(manager.list(), vec![("periodic".to_string(), ServiceState::Running)]);

        manager.shutdown_all().await.unwrap();
        assert_eq!(calls.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_tick_interval_disables_periodic_ticks() {
        let manager = ServiceManager::new();
        let (mut recorder, calls) = Recorder::new("zero");
        recorder.tick_interval = Some(Duration::ZERO);

        let handle = manager.spawn(recorder).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(handle.is_running());
        assert_eq!(calls.ticks.load(Ordering::SeqCst), 0);

        handle.force_tick().await.unwrap();
        assert_eq!(calls.ticks.load(Ordering::SeqCst), 1);

        manager.shutdown_all().await.unwrap();
        assert_eq!(handle.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let manager = ServiceManager::new();
        let (first, _) = Recorder::new("singleton");
        let (second, _) = Recorder::new("singleton");

        manager.spawn(first).await.unwrap();
        assert!(matches!(
            manager.spawn(second).await,
            Err(ServiceError::AlreadyRunning(_))
        ));
        assert!(manager.get("singleton").is_some());

        manager.shutdown_all().await.unwrap();
    }
}
