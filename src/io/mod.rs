/// CSV export of stored telemetry.
pub mod export;
