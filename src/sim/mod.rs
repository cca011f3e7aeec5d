/// Tick time sources.
pub mod clock;
pub mod engine;
pub mod generator;
pub mod lifecycle;
/// Cross-process single-instance lock.
pub mod lock;
pub mod reader;
/// Age-based telemetry pruning.
pub mod retention;
pub mod stats;

pub use engine::{Engine, TickOutcome, TickReport};
pub use lifecycle::{LifecycleState, Simulator, StartOutcome, StopOutcome};
pub use stats::UserStats;
