//! Synthetic household appliance telemetry engine.

/// Appliance roster records and behavior profiles.
pub mod appliances;
pub mod config;
pub mod error;
pub mod io;
/// Sample generation, scheduling loop, and lifecycle control.
pub mod sim;
pub mod store;

#[cfg(feature = "api")]
pub mod api;

pub use error::{Result, SimError};
