//! One simulation tick: read state, generate samples, write the batch, prune.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDateTime;
use rand::Rng;
use rand::rngs::StdRng;
use tracing::{error, info};

use crate::appliances::{ProfileTable, TelemetrySample};
use crate::config::SimulationConfig;
use crate::error::Result;
use crate::store::TelemetryStore;

use super::generator::SampleGenerator;
use super::reader::read_state;
use super::retention::RetentionPruner;
use super::stats::UserStats;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The roster was empty; nothing was written.
    Idle,
    /// One sample per active appliance was committed.
    Written(TickReport),
}

/// Summary of a tick that wrote a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Tick time stamped on every sample.
    pub at: NaiveDateTime,
    /// Rows committed.
    pub written: usize,
    /// Roster counters observed during the tick.
    pub stats: UserStats,
    /// Rows removed when this tick also ran the retention pass.
    pub pruned: Option<usize>,
}

/// Simulation engine owning the generator, profile table, and prune schedule.
///
/// The store is shared with the rest of the service; the engine locks it only
/// for the duration of each storage call.
pub struct Engine<S, R = StdRng> {
    store: Arc<Mutex<S>>,
    profiles: ProfileTable,
    generator: SampleGenerator<R>,
    pruner: RetentionPruner,
    prune_every: u32,
    ticks_since_prune: u32,
}

impl<S: TelemetryStore> Engine<S, StdRng> {
    /// Creates an engine from the simulation settings.
    pub fn from_config(store: Arc<Mutex<S>>, profiles: ProfileTable, cfg: &SimulationConfig) -> Self {
        Self::new(
            store,
            profiles,
            SampleGenerator::from_seed_option(cfg.seed),
            RetentionPruner::new(cfg.retention()),
            cfg.prune_every_ticks,
        )
    }
}

impl<S: TelemetryStore, R: Rng> Engine<S, R> {
    /// Creates a new simulation engine.
    ///
    /// # Arguments
    ///
    /// * `store` - Shared telemetry store
    /// * `profiles` - Per-type behavior table
    /// * `generator` - Sample generator and its RNG
    /// * `pruner` - Retention pass settings
    /// * `prune_every` - Written ticks between retention passes (minimum 1)
    pub fn new(
        store: Arc<Mutex<S>>,
        profiles: ProfileTable,
        generator: SampleGenerator<R>,
        pruner: RetentionPruner,
        prune_every: u32,
    ) -> Self {
        Self {
            store,
            profiles,
            generator,
            pruner,
            prune_every: prune_every.max(1),
            ticks_since_prune: 0,
        }
    }

    /// Executes one tick at `now`.
    ///
    /// The batch is committed atomically; if reading, generating, or writing
    /// fails nothing from this tick is written and the prune counter is left
    /// unchanged. A failed retention pass is logged and retried on the next
    /// written tick; the tick itself still reports `Written` with `pruned: None`.
    pub fn tick(&mut self, now: NaiveDateTime) -> Result<TickOutcome> {
        let states = {
            let store = lock(&self.store);
            read_state(&*store)?
        };

        if states.is_empty() {
            return Ok(TickOutcome::Idle);
        }

        let batch: Vec<TelemetrySample> = states
            .iter()
            .map(|s| {
                let profile = self.profiles.for_appliance(&s.appliance);
                self.generator
                    .generate(&s.appliance, profile, s.previous.as_ref(), now)
            })
            .collect();

        let written = lock(&self.store).insert_samples(&batch)?;

        let roster: Vec<_> = states.into_iter().map(|s| s.appliance).collect();
        let stats = UserStats::from_roster(&roster);
        info!(written, %stats, "updated appliances");

        self.ticks_since_prune = self.ticks_since_prune.saturating_add(1);
        let pruned = if self.ticks_since_prune >= self.prune_every {
            match self.pruner.prune(&mut *lock(&self.store), now) {
                Ok(removed) => {
                    self.ticks_since_prune = 0;
                    Some(removed)
                }
                Err(e) => {
                    error!(error = %e, "retention pass failed, retrying next tick");
                    None
                }
            }
        } else {
            None
        };

        Ok(TickOutcome::Written(TickReport {
            at: now,
            written,
            stats,
            pruned,
        }))
    }

    /// Runs the retention pass immediately, outside the tick schedule.
    pub fn prune_now(&mut self, now: NaiveDateTime) -> Result<usize> {
        self.pruner.prune(&mut *lock(&self.store), now)
    }

    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }
}

/// Locks shared state, clearing poison left by a tick that panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use chrono::{Duration, NaiveDate};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 8, 1)
            .and_then(|d| d.and_hms_opt(19, 30, 0))
            .unwrap()
    }

    fn engine(store: SqliteStore, prune_every: u32) -> (Arc<Mutex<SqliteStore>>, Engine<SqliteStore>) {
        let shared = Arc::new(Mutex::new(store));
        let engine = Engine::new(
            Arc::clone(&shared),
            ProfileTable::builtin(),
            SampleGenerator::seeded(42),
            RetentionPruner::default(),
            prune_every,
        );
        (shared, engine)
    }

    #[test]
    fn empty_roster_is_idle() {
        let (_, mut engine) = engine(SqliteStore::open_in_memory().unwrap(), 360);
        assert_eq!(engine.tick(now()).unwrap(), TickOutcome::Idle);
    }

    #[test]
    fn tick_writes_one_sample_per_active_appliance() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_appliance(1, "AC", "air_conditioner", Some(2000.0)).unwrap();
        store.insert_appliance(2, "TV", "television", None).unwrap();
        let gone = store.insert_appliance(2, "Old TV", "television", None).unwrap();
        store.set_appliance_active(gone, false).unwrap();
        let (shared, mut engine) = engine(store, 360);

        let TickOutcome::Written(report) = engine.tick(now()).unwrap() else {
            panic!("expected a written tick");
        };
        assert_eq!(report.written, 2);
        assert_eq!(report.stats.users, 2);
        assert_eq!(report.pruned, None);
        assert_eq!(shared.lock().unwrap().sample_count().unwrap(), 2);
        assert!(shared.lock().unwrap().recent_samples(gone, 5).unwrap().is_empty());
    }

    #[test]
    fn second_tick_continues_from_previous_temperature() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_appliance(1, "Fridge", "refrigerator", None).unwrap();
        let (shared, mut engine) = engine(store, 360);

        engine.tick(now()).unwrap();
        engine.tick(now() + Duration::seconds(10)).unwrap();

        let samples = shared.lock().unwrap().recent_samples(id, 2).unwrap();
        assert_eq!(samples.len(), 2);
        let delta = (samples[0].temperature.unwrap() - samples[1].temperature.unwrap()).abs();
        // Both readings are rounded to hundredths.
        assert!(delta <= 0.2 + 0.011);
    }

    #[test]
    fn prunes_on_schedule() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_appliance(1, "TV", "television", None).unwrap();
        store
            .insert_samples(&[TelemetrySample {
                appliance_id: id,
                user_id: 1,
                is_on: false,
                temperature: Some(30.0),
                power_consumption: 2.0,
                timestamp: now() - Duration::days(40),
            }])
            .unwrap();
        let (_, mut engine) = engine(store, 3);

        let mut pruned = Vec::new();
        for i in 0..6 {
            if let TickOutcome::Written(r) = engine.tick(now() + Duration::seconds(10 * i)).unwrap() {
                pruned.push(r.pruned);
            }
        }
        assert_eq!(pruned, vec![None, None, Some(1), None, None, Some(0)]);
    }

    /// Store whose age-based delete fails a set number of times.
    struct FailingDelete {
        inner: SqliteStore,
        delete_failures: usize,
    }

    impl TelemetryStore for FailingDelete {
        fn active_appliances(&self) -> Result<Vec<crate::appliances::Appliance>> {
            self.inner.active_appliances()
        }

        fn latest_sample(&self, appliance_id: i64) -> Result<Option<TelemetrySample>> {
            self.inner.latest_sample(appliance_id)
        }

        fn insert_samples(&mut self, samples: &[TelemetrySample]) -> Result<usize> {
            self.inner.insert_samples(samples)
        }

        fn delete_samples_before(&mut self, cutoff: NaiveDateTime) -> Result<usize> {
            if self.delete_failures > 0 {
                self.delete_failures -= 1;
                return Err(crate::SimError::Io(std::io::Error::other("database is locked")));
            }
            self.inner.delete_samples_before(cutoff)
        }
    }

    #[test]
    fn failed_prune_keeps_the_batch_and_retries_next_tick() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_appliance(1, "AC", "air_conditioner", None).unwrap();
        store.insert_appliance(1, "TV", "television", None).unwrap();
        let shared = Arc::new(Mutex::new(FailingDelete {
            inner: store,
            delete_failures: 1,
        }));
        let mut engine = Engine::new(
            Arc::clone(&shared),
            ProfileTable::builtin(),
            SampleGenerator::seeded(9),
            RetentionPruner::default(),
            3,
        );

        let mut pruned = Vec::new();
        for i in 0..4 {
            match engine.tick(now() + Duration::seconds(10 * i)).unwrap() {
                TickOutcome::Written(r) => {
                    assert_eq!(r.written, 2);
                    pruned.push(r.pruned);
                }
                TickOutcome::Idle => panic!("roster is not empty"),
            }
        }
        assert_eq!(pruned, vec![None, None, None, Some(0)]);
        assert_eq!(shared.lock().unwrap().inner.sample_count().unwrap(), 8);
    }

    #[test]
    fn poisoned_store_lock_does_not_wedge_ticks() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_appliance(1, "TV", "television", None).unwrap();
        let (shared, mut engine) = engine(store, 360);

        let poisoner = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("tick panicked while holding the store");
        })
        .join();
        assert!(shared.is_poisoned());

        assert!(matches!(engine.tick(now()).unwrap(), TickOutcome::Written(_)));
    }
}
