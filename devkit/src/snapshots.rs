//! Snapshot sources for tests
//!
//! Session tests should never depend on the machine they run on, so they
//! swap the production sampler for a source that returns canned snapshots.

use async_trait::async_trait;
use chrono::Utc;
use fleetlink_agent::metrics::{fallback_snapshot, ResourceSnapshot, SnapshotSource};

/// Returns the same snapshot on every sampling cycle.
pub struct FixedSnapshots {
    snapshot: ResourceSnapshot,
}

impl FixedSnapshots {
    pub fn new(snapshot: ResourceSnapshot) -> Self {
        Self { snapshot }
    }

    /// The agent's documented all-defaults snapshot: what a device reports
    /// when every strategy of every collector fails.
    pub fn fallback() -> Self {
        Self {
            snapshot: fallback_snapshot(),
        }
    }
}

#[async_trait]
impl SnapshotSource for FixedSnapshots {
    async fn sample(&mut self) -> ResourceSnapshot {
        ResourceSnapshot {
            timestamp: Utc::now(),
            ..self.snapshot.clone()
        }
    }
}
