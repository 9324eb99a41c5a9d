//! Progress signal emitted at sync-point boundaries.

use serde::{Deserialize, Serialize};

/// Emitted by the run-loop each time it checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Number of items covered since the previous signal (the sync interval).
    pub increment: u64,
    /// Zero-based index of the item at which the checkpoint was taken.
    pub current: u64,
}
