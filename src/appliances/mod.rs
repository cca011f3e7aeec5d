//! Appliance roster records and per-type behavior profiles.

/// Per-type behavior parameters and the profile lookup table.
pub mod profile;
pub mod types;

pub use profile::{ApplianceProfile, ProfileTable, ThermalCoupling};
pub use types::{Appliance, ApplianceKind, TelemetrySample};
