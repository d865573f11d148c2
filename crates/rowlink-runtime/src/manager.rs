//! [`ErgManager`] – discovery, supervision and coordinated shutdown.
//!
//! # Tasks
//!
//! | Task | Cadence | Owns |
//! |---|---|---|
//! | discovery | `discovery_interval` | the bus, every worker's join handle |
//! | worker (one per erg) | `poll_interval` | that erg's [`ErgSession`] |
//! | dispatcher | event driven | the [`EventStream`][crate::event::EventStream] and observer |
//!
//! All three share the [`ErgRegistry`] and a [`CancellationToken`].  `stop`
//! cancels the token, waits for discovery (which in turn waits for its
//! workers), then pushes [`EventKind::Stop`] and waits for the dispatcher to
//! drain everything queued before it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use rowlink_csafe::{ErgSession, SessionConfig, build_workout};
use rowlink_hal::{BusError, ErgBus, FrameCodec};
use rowlink_types::{DeviceId, RowError, WorkoutRequest};
use tokio::runtime::Handle;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::dispatcher::dispatch;
use crate::event::{self, EventKind, EventSink};
use crate::handle::ErgHandle;
use crate::observer::ErgObserver;
use crate::registry::ErgRegistry;
use crate::worker::Worker;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Time between bus scans.
    pub discovery_interval: Duration,
    /// Time between polling cycles of each worker.
    pub poll_interval: Duration,
    pub session: SessionConfig,
    /// Include force-plot samples and stroke state in every update.
    pub forceplot: bool,
    /// Replace enumerated codes with labels.
    pub pretty: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(2),
            poll_interval: Duration::from_millis(500),
            session: SessionConfig::default(),
            forceplot: true,
            pretty: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Running,
    Stopping,
    Stopped,
}

/// Result of a broadcast command on one device.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastOutcome {
    pub device: DeviceId,
    pub result: Result<(), RowError>,
}

// ────────────────────────────────────────────────────────────────────────────
// Discovery task
// ────────────────────────────────────────────────────────────────────────────

struct Discovery {
    bus: Arc<dyn ErgBus>,
    codec: Arc<dyn FrameCodec>,
    config: ManagerConfig,
    registry: Arc<ErgRegistry>,
    sink: EventSink,
    cancel: CancellationToken,
    workers: JoinSet<()>,
}

impl Discovery {
    #[instrument(skip_all)]
    async fn run(mut self) {
        let mut interval = time::interval(self.config.discovery_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                _ = interval.tick() => self.scan().await,
            }
            while let Some(finished) = self.workers.try_join_next() {
                if let Err(e) = finished {
                    warn!(error = %e, "worker task failed");
                }
            }
        }

        debug!(workers = self.workers.len(), "waiting for workers");
        while let Some(finished) = self.workers.join_next().await {
            if let Err(e) = finished {
                warn!(error = %e, "worker task failed");
            }
        }
        debug!("discovery exited");
    }

    async fn scan(&mut self) {
        let found = match self.bus.find().await {
            Ok(found) => found,
            Err(BusError::Busy) => {
                debug!("bus busy; retrying next cycle");
                return;
            }
            Err(e) => {
                warn!(error = %e, "device discovery failed");
                return;
            }
        };

        for descriptor in found {
            let id = descriptor.identity();
            if self.registry.contains(&id) {
                continue;
            }
            if self.cancel.is_cancelled() {
                return;
            }
            let transport = match self.bus.open(&descriptor).await {
                Ok(transport) => transport,
                Err(e) => {
                    warn!(device = %id, error = %e, "cannot open erg; retrying next cycle");
                    continue;
                }
            };
            let session = ErgSession::new(
                id.clone(),
                transport,
                self.codec.clone(),
                self.config.session.clone(),
            )
            .with_cancel(self.cancel.clone());
            let (handle, commands) = ErgHandle::new(id.clone());
            if !self.registry.register(handle.clone()) {
                continue;
            }
            if let Err(e) = self.sink.push(&id, EventKind::NewDevice(handle)) {
                warn!(device = %id, error = %e, "event sink closed");
                self.registry.unregister(&id);
                return;
            }
            info!(device = %id, "new erg");

            self.workers.spawn(
                Worker {
                    session,
                    commands,
                    sink: self.sink.clone(),
                    registry: self.registry.clone(),
                    cancel: self.cancel.clone(),
                    poll_interval: self.config.poll_interval,
                    forceplot: self.config.forceplot,
                    pretty: self.config.pretty,
                }
                .run(),
            );
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ErgManager
// ────────────────────────────────────────────────────────────────────────────

struct Tasks {
    discovery: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

/// Discovers ergs on a bus, polls each one, and reports to an
/// [`ErgObserver`].
pub struct ErgManager {
    registry: Arc<ErgRegistry>,
    sink: EventSink,
    cancel: CancellationToken,
    state: Mutex<ManagerState>,
    tasks: tokio::sync::Mutex<Option<Tasks>>,
}

impl ErgManager {
    /// Spawn the discovery and dispatch tasks on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`RowError::Startup`] when called outside a Tokio runtime or with a
    /// zero interval.
    pub fn start(
        bus: Arc<dyn ErgBus>,
        codec: Arc<dyn FrameCodec>,
        config: ManagerConfig,
        observer: Arc<dyn ErgObserver>,
    ) -> Result<Self, RowError> {
        let runtime = Handle::try_current().map_err(|e| RowError::Startup(e.to_string()))?;
        if config.discovery_interval.is_zero() || config.poll_interval.is_zero() {
            return Err(RowError::Startup(
                "discovery and poll intervals must be non-zero".to_string(),
            ));
        }

        let registry = Arc::new(ErgRegistry::new());
        let (sink, stream) = event::channel();
        let cancel = CancellationToken::new();

        info!(
            discovery_ms = config.discovery_interval.as_millis() as u64,
            poll_ms = config.poll_interval.as_millis() as u64,
            "starting device manager"
        );
        let dispatcher = runtime.spawn(dispatch(stream, registry.clone(), observer));
        let discovery = runtime.spawn(
            Discovery {
                bus,
                codec,
                config,
                registry: registry.clone(),
                sink: sink.clone(),
                cancel: cancel.clone(),
                workers: JoinSet::new(),
            }
            .run(),
        );

        Ok(Self {
            registry,
            sink,
            cancel,
            state: Mutex::new(ManagerState::Running),
            tasks: tokio::sync::Mutex::new(Some(Tasks {
                discovery,
                dispatcher,
            })),
        })
    }

    pub fn state(&self) -> ManagerState {
        *self.lock_state()
    }

    /// Stop discovery and every worker, deliver the events already queued,
    /// then stop the dispatcher.  No callback runs after this returns.
    /// Calling it again is a no-op.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        {
            let mut state = self.lock_state();
            if *state != ManagerState::Running {
                return;
            }
            *state = ManagerState::Stopping;
        }
        info!("stopping device manager");
        self.cancel.cancel();

        if let Some(tasks) = self.tasks.lock().await.take() {
            if let Err(e) = tasks.discovery.await {
                warn!(error = %e, "discovery task failed");
            }
            if let Err(e) = self.sink.push_stop() {
                warn!(error = %e, "dispatcher already gone");
            }
            if let Err(e) = tasks.dispatcher.await {
                warn!(error = %e, "dispatch task failed");
            }
        }

        *self.lock_state() = ManagerState::Stopped;
        info!("device manager stopped");
    }

    /// Tracked devices in discovery order.
    pub fn devices(&self) -> Vec<DeviceId> {
        self.registry.devices()
    }

    pub fn handles(&self) -> Vec<ErgHandle> {
        self.registry.handles()
    }

    pub fn handle(&self, id: &DeviceId) -> Option<ErgHandle> {
        self.registry.handle(id)
    }

    /// Alias or identity of every tracked device.
    pub fn names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn alias(&self, id: &DeviceId) -> Option<String> {
        self.registry.alias(id)
    }

    /// Program `request` on every tracked erg concurrently.
    ///
    /// # Errors
    ///
    /// [`RowError::ManagerStopped`] after `stop`, and
    /// [`RowError::Validation`] for a bad request (no device is contacted).
    /// Per-device failures are reported in the outcomes.
    pub async fn set_workout(
        &self,
        request: &WorkoutRequest,
    ) -> Result<Vec<BroadcastOutcome>, RowError> {
        self.ensure_running()?;
        build_workout(request)?;

        let handles = self.registry.handles();
        let results = join_all(handles.iter().map(|h| h.set_workout(request.clone()))).await;
        Ok(handles
            .into_iter()
            .zip(results)
            .map(|(handle, result)| {
                if let Err(e) = &result {
                    warn!(device = %handle.id(), error = %e, "set workout failed");
                }
                BroadcastOutcome {
                    device: handle.id().clone(),
                    result,
                }
            })
            .collect())
    }

    /// Shorthand for a distance piece on every tracked erg.
    pub async fn set_distance(&self, meters: u32) -> Result<Vec<BroadcastOutcome>, RowError> {
        self.set_workout(&WorkoutRequest::distance(meters)).await
    }

    fn ensure_running(&self) -> Result<(), RowError> {
        match self.state() {
            ManagerState::Running => Ok(()),
            _ => Err(RowError::ManagerStopped),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ErgManager {
    fn drop(&mut self) {
        // Tasks wind down on their own once cancelled.
        self.cancel.cancel();
    }
}
