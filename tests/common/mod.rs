//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;

use ecowatt_sim::appliances::{Appliance, ProfileTable, TelemetrySample};
use ecowatt_sim::config::SimulationConfig;
use ecowatt_sim::sim::Simulator;
use ecowatt_sim::sim::clock::FixedClock;
use ecowatt_sim::sim::lock::PidFileLock;
use ecowatt_sim::store::{SqliteStore, TelemetryStore};
use ecowatt_sim::{Result, SimError};

/// Builds a timestamp on 2024-07-15 at `h:m`.
pub fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 7, 15)
        .and_then(|d| d.and_hms_opt(h, m, 0))
        .expect("valid timestamp")
}

/// Loop settings fast enough for tests (10 ms ticks, seed 42).
pub fn fast_config() -> SimulationConfig {
    SimulationConfig {
        tick_interval_ms: 10,
        idle_interval_ms: 10,
        stop_timeout_ms: 2_000,
        seed: Some(42),
        ..SimulationConfig::default()
    }
}

/// Temporary directory holding the lock marker.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.path().join("simulation.lock")
    }

    pub fn lock(&self) -> PidFileLock {
        PidFileLock::new(self.lock_path())
    }

    /// Simulator over `store` with a fixed clock at `now`.
    pub fn simulator<S>(&self, store: S, now: NaiveDateTime) -> Simulator<S>
    where
        S: TelemetryStore + 'static,
    {
        self.simulator_with(store, now, &fast_config())
    }

    /// Simulator with explicit loop settings.
    pub fn simulator_with<S>(
        &self,
        store: S,
        now: NaiveDateTime,
        cfg: &SimulationConfig,
    ) -> Simulator<S>
    where
        S: TelemetryStore + 'static,
    {
        Simulator::new(store, self.lock(), ProfileTable::builtin(), cfg)
            .with_clock(Arc::new(FixedClock::new(now)))
    }
}

/// In-memory store with `n` active appliances for user 1, cycling known types.
pub fn store_with_appliances(n: usize) -> SqliteStore {
    const TYPES: [&str; 3] = ["air_conditioner", "refrigerator", "television"];
    let store = SqliteStore::open_in_memory().expect("in-memory store");
    for i in 0..n {
        let tag = TYPES[i % TYPES.len()];
        store
            .insert_appliance(1, &format!("Appliance {i}"), tag, None)
            .expect("insert appliance");
    }
    store
}

/// Store whose first `failures` batch inserts fail.
pub struct FlakyStore {
    pub inner: SqliteStore,
    failures: usize,
    pub attempts: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new(inner: SqliteStore, failures: usize) -> Self {
        Self {
            inner,
            failures,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl TelemetryStore for FlakyStore {
    fn active_appliances(&self) -> Result<Vec<Appliance>> {
        self.inner.active_appliances()
    }

    fn latest_sample(&self, appliance_id: i64) -> Result<Option<TelemetrySample>> {
        self.inner.latest_sample(appliance_id)
    }

    fn insert_samples(&mut self, samples: &[TelemetrySample]) -> Result<usize> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(SimError::Io(std::io::Error::other("disk unavailable")));
        }
        self.inner.insert_samples(samples)
    }

    fn delete_samples_before(&mut self, cutoff: NaiveDateTime) -> Result<usize> {
        self.inner.delete_samples_before(cutoff)
    }
}

/// Store whose first batch insert panics while the store is locked.
pub struct PanicOnceStore {
    pub inner: SqliteStore,
    panicked: bool,
}

impl PanicOnceStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            panicked: false,
        }
    }
}

impl TelemetryStore for PanicOnceStore {
    fn active_appliances(&self) -> Result<Vec<Appliance>> {
        self.inner.active_appliances()
    }

    fn latest_sample(&self, appliance_id: i64) -> Result<Option<TelemetrySample>> {
        self.inner.latest_sample(appliance_id)
    }

    fn insert_samples(&mut self, samples: &[TelemetrySample]) -> Result<usize> {
        if !self.panicked {
            self.panicked = true;
            panic!("driver bug");
        }
        self.inner.insert_samples(samples)
    }

    fn delete_samples_before(&mut self, cutoff: NaiveDateTime) -> Result<usize> {
        self.inner.delete_samples_before(cutoff)
    }
}

/// Store whose batch insert blocks for `delay` before writing.
pub struct SlowStore {
    pub inner: SqliteStore,
    delay: Duration,
    pub entered: Arc<AtomicBool>,
}

impl SlowStore {
    pub fn new(inner: SqliteStore, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            entered: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl TelemetryStore for SlowStore {
    fn active_appliances(&self) -> Result<Vec<Appliance>> {
        self.inner.active_appliances()
    }

    fn latest_sample(&self, appliance_id: i64) -> Result<Option<TelemetrySample>> {
        self.inner.latest_sample(appliance_id)
    }

    fn insert_samples(&mut self, samples: &[TelemetrySample]) -> Result<usize> {
        self.entered.store(true, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.insert_samples(samples)
    }

    fn delete_samples_before(&mut self, cutoff: NaiveDateTime) -> Result<usize> {
        self.inner.delete_samples_before(cutoff)
    }
}
