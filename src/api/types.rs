//! API response types.

use serde::Serialize;

use crate::sim::LifecycleState;

/// Lifecycle snapshot for the status endpoint.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// In-process loop state.
    pub state: LifecycleState,
    /// Whether a live process holds the cross-process lock.
    pub lock_held: bool,
}

/// Error response body for 500-class errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
