//! Loads the active roster together with each appliance's last-known sample.

use crate::appliances::{Appliance, TelemetrySample};
use crate::error::Result;
use crate::store::TelemetryStore;

/// One roster entry and its most recent stored sample.
#[derive(Debug, Clone)]
pub struct ApplianceState {
    pub appliance: Appliance,
    pub previous: Option<TelemetrySample>,
}

/// Reads the roster, then the latest sample per appliance, in roster order.
///
/// Any failed query fails the whole read so a tick never works from a
/// partial view.
pub fn read_state<S: TelemetryStore + ?Sized>(store: &S) -> Result<Vec<ApplianceState>> {
    store
        .active_appliances()?
        .into_iter()
        .map(|appliance| {
            let previous = store.latest_sample(appliance.id)?;
            Ok(ApplianceState {
                appliance,
                previous,
            })
        })
        .collect()
}
