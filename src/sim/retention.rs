//! Age-based pruning of the telemetry table.

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::error::Result;
use crate::store::TelemetryStore;

/// Deletes samples older than a fixed horizon.
///
/// Deletion is a single predicate delete, so it is idempotent and does not
/// race with concurrent inserts of fresh samples.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPruner {
    horizon: chrono::Duration,
}

impl RetentionPruner {
    pub fn new(horizon: chrono::Duration) -> Self {
        Self { horizon }
    }

    pub fn horizon(&self) -> chrono::Duration {
        self.horizon
    }

    /// Oldest timestamp that survives a prune at `now`.
    pub fn cutoff(&self, now: NaiveDateTime) -> NaiveDateTime {
        now - self.horizon
    }

    /// Removes every sample older than `now - horizon` and returns the count.
    pub fn prune<S: TelemetryStore + ?Sized>(&self, store: &mut S, now: NaiveDateTime) -> Result<usize> {
        let cutoff = self.cutoff(now);
        let removed = store.delete_samples_before(cutoff)?;
        if removed > 0 {
            info!(removed, %cutoff, "pruned old telemetry");
        } else {
            debug!(%cutoff, "no telemetry past retention horizon");
        }
        Ok(removed)
    }
}

impl Default for RetentionPruner {
    fn default() -> Self {
        Self::new(chrono::Duration::days(30))
    }
}
