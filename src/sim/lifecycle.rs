//! Service object that owns the scheduling loop and its lifecycle.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::appliances::ProfileTable;
use crate::config::{ServiceConfig, SimulationConfig};
use crate::error::{Result, SimError};
use crate::store::{SqliteStore, TelemetryStore};

use super::clock::{Clock, SystemClock};
use super::engine::{Engine, TickOutcome, lock};
use super::lock::{InstanceLock, LockStatus, PidFileLock};
use super::stats::UserStats;

/// Lifecycle of the simulation loop within this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Result of [`Simulator::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The loop was launched and this process owns the lock.
    Started,
    /// This instance already runs a loop; nothing changed.
    AlreadyRunning,
    /// Another live process owns the lock; it was left untouched.
    HeldElsewhere { pid: u32 },
}

/// Result of [`Simulator::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The loop exited within the timeout.
    Stopped,
    /// The loop did not exit in time; the lock was released anyway.
    TimedOut,
    /// No loop was running.
    NotRunning,
}

#[derive(Debug, Clone, Copy)]
struct LoopTiming {
    tick: Duration,
    idle: Duration,
    stop_timeout: Duration,
}

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    state: LifecycleState,
    worker: Option<Worker>,
}

/// The telemetry simulation service.
///
/// Construct one per process, call [`start`](Self::start) at startup and
/// [`stop`](Self::stop) at shutdown. The loop runs as a Tokio task; its
/// blocking storage work runs on the blocking pool. Stats and manual ticks
/// can be requested at any time from other tasks.
pub struct Simulator<S, L: InstanceLock = PidFileLock> {
    store: Arc<Mutex<S>>,
    engine: Arc<Mutex<Engine<S>>>,
    lock: L,
    clock: Arc<dyn Clock>,
    timing: LoopTiming,
    inner: Mutex<Inner>,
}

impl Simulator<SqliteStore, PidFileLock> {
    /// Validates `cfg`, opens the SQLite store, and builds the service.
    pub fn from_config(cfg: &ServiceConfig) -> Result<Self> {
        let errors = cfg.validate();
        if !errors.is_empty() {
            return Err(SimError::Config(errors));
        }
        let store = SqliteStore::open(&cfg.storage.database_path)?;
        Ok(Self::new(
            store,
            PidFileLock::new(&cfg.storage.lock_path),
            cfg.profile_table(),
            &cfg.simulation,
        ))
    }
}

impl<S, L> Simulator<S, L>
where
    S: TelemetryStore + 'static,
    L: InstanceLock,
{
    /// Creates a stopped simulator using the system clock.
    pub fn new(store: S, lock: L, profiles: ProfileTable, cfg: &SimulationConfig) -> Self {
        let store = Arc::new(Mutex::new(store));
        let engine = Engine::from_config(Arc::clone(&store), profiles, cfg);
        Self {
            store,
            engine: Arc::new(Mutex::new(engine)),
            lock,
            clock: Arc::new(SystemClock),
            timing: LoopTiming {
                tick: cfg.tick_interval(),
                idle: cfg.idle_interval(),
                stop_timeout: cfg.stop_timeout(),
            },
            inner: Mutex::new(Inner {
                state: LifecycleState::Stopped,
                worker: None,
            }),
        }
    }

    /// Replaces the clock used to stamp ticks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Claims the cross-process lock and launches the scheduling loop.
    ///
    /// Must be called from within a Tokio runtime. Conflicts are reported
    /// through [`StartOutcome`]; only lock marker I/O failures and a missing
    /// runtime are errors.
    pub fn start(&self) -> Result<StartOutcome> {
        let runtime = Handle::try_current().map_err(|_| SimError::NoRuntime)?;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if inner.state != LifecycleState::Stopped {
            warn!(state = %inner.state, "simulation is already running in this instance");
            return Ok(StartOutcome::AlreadyRunning);
        }

        inner.state = LifecycleState::Starting;
        match self.lock.acquire() {
            Ok(LockStatus::Acquired) => {}
            Ok(LockStatus::HeldBy(pid)) => {
                inner.state = LifecycleState::Stopped;
                warn!(pid, "simulation is already running in another process");
                return Ok(StartOutcome::HeldElsewhere { pid });
            }
            Err(e) => {
                inner.state = LifecycleState::Stopped;
                error!(error = %e, "could not create lock marker");
                return Err(e);
            }
        }

        let token = CancellationToken::new();
        let handle = runtime.spawn(run_loop(
            Arc::clone(&self.engine),
            Arc::clone(&self.clock),
            self.timing,
            token.clone(),
        ));
        inner.worker = Some(Worker { token, handle });
        inner.state = LifecycleState::Running;
        drop(inner);

        match self.user_stats() {
            Ok(stats) => info!(
                users = stats.users,
                appliances = stats.appliances,
                "simulation started"
            ),
            Err(e) => warn!(error = %e, "simulation started; roster unavailable"),
        }
        Ok(StartOutcome::Started)
    }

    /// Signals the loop to exit and waits up to the stop timeout.
    ///
    /// The lock marker is released and the state returns to `Stopped` even
    /// when the loop does not exit in time.
    pub async fn stop(&self) -> StopOutcome {
        let worker = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(worker) = inner.worker.take() else {
                return StopOutcome::NotRunning;
            };
            inner.state = LifecycleState::Stopping;
            worker
        };

        worker.token.cancel();
        let outcome = match tokio::time::timeout(self.timing.stop_timeout, worker.handle).await {
            Ok(Ok(())) => StopOutcome::Stopped,
            Ok(Err(e)) => {
                error!(error = %e, "simulation loop ended abnormally");
                StopOutcome::Stopped
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timing.stop_timeout.as_millis() as u64,
                    "simulation loop did not exit in time"
                );
                StopOutcome::TimedOut
            }
        };

        if let Err(e) = self.lock.release() {
            warn!(error = %e, "could not remove lock marker");
        }
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state = LifecycleState::Stopped;
        info!("simulation stopped");
        outcome
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// Whether any live process, this one included, holds the lock.
    pub fn lock_held(&self) -> bool {
        self.lock.is_held()
    }

    /// Whether the loop is owned by someone else: this instance is stopped but
    /// a live process holds the lock.
    pub fn running_elsewhere(&self) -> bool {
        self.state() == LifecycleState::Stopped && self.lock.is_held()
    }

    /// Roster counters over active appliances.
    pub fn user_stats(&self) -> Result<UserStats> {
        let roster = lock(&self.store).active_appliances()?;
        Ok(UserStats::from_roster(&roster))
    }

    /// Runs one tick immediately on the calling thread.
    ///
    /// Serialized with the background loop; a tick never interleaves with another.
    pub fn run_tick(&self) -> Result<TickOutcome> {
        let now = self.clock.now();
        lock(&self.engine).tick(now)
    }

    /// Runs the retention pass immediately and returns the count removed.
    pub fn prune_now(&self) -> Result<usize> {
        let now = self.clock.now();
        lock(&self.engine).prune_now(now)
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> &Arc<Mutex<S>> {
        &self.store
    }
}

impl<S, L: InstanceLock> Drop for Simulator<S, L> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = inner.worker.take() {
            worker.token.cancel();
            if let Err(e) = self.lock.release() {
                warn!(error = %e, "could not remove lock marker on drop");
            }
        }
    }
}

async fn run_loop<S>(
    engine: Arc<Mutex<Engine<S>>>,
    clock: Arc<dyn Clock>,
    timing: LoopTiming,
    token: CancellationToken,
) where
    S: TelemetryStore + 'static,
{
    info!(tick_ms = timing.tick.as_millis() as u64, "simulation loop running");

    while !token.is_cancelled() {
        let now = clock.now();
        let engine = Arc::clone(&engine);
        let delay = match tokio::task::spawn_blocking(move || lock(&engine).tick(now)).await {
            Ok(Ok(TickOutcome::Written(_))) => timing.tick,
            Ok(Ok(TickOutcome::Idle)) => {
                info!("no active appliances, waiting");
                timing.idle
            }
            Ok(Err(e)) => {
                error!(error = %e, "simulation tick failed");
                timing.tick
            }
            Err(e) => {
                error!(error = %e, "simulation tick panicked");
                timing.tick
            }
        };

        tokio::select! {
            biased;
            () = token.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    info!("simulation loop exited");
}
