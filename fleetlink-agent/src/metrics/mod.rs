//! Resource measurement for Fleetlink agents
//!
//! Each metric is collected through an ordered fallback chain (see `probe`)
//! so that platforms with inconsistent introspection APIs still produce a
//! complete [`ResourceSnapshot`]: collection failure yields a documented
//! sentinel value, never a missing field and never an error.

pub mod battery;
pub mod cpu;
pub mod memory;
pub mod network;
pub mod probe;
pub mod storage;

pub use battery::{BatterySource, BatteryStatus, ChargeState};
pub use network::{NetworkStatus, ProbeMethod};
pub use storage::StorageStatus;

use crate::identity::DeviceIdentity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::debug;

/// Point-in-time resource measurement, rebuilt from scratch on every
/// sampling cycle and never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Estimated instantaneous CPU idle fraction, in [0, 100].
    pub cpu_free_percent: f64,
    pub ram_free_mb: u64,
    pub ram_total_mb: u64,
    /// `round((total-free)/total*100, 2)` when total > 0, else 0.
    pub ram_used_percent: f64,
    /// `None` when the device verifiably has no battery.
    pub battery: Option<BatteryStatus>,
    pub storage: StorageStatus,
    pub network: NetworkStatus,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

/// Collection settings threaded into the strategy chains.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Primary data partition to report storage for.
    pub storage_path: String,
    /// `host:port` for the direct reachability probe, if known.
    pub probe_addr: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            storage_path: "/".to_string(),
            probe_addr: None,
        }
    }
}

/// Build a complete snapshot. Collectors run sequentially; each one absorbs
/// its own failures, so this can never error or leave a field unset.
pub async fn build_snapshot(identity: &DeviceIdentity, config: &MetricsConfig) -> ResourceSnapshot {
    debug!("sampling resource snapshot");

    let cpu_free_percent = cpu::collect(identity.cpu_cores).await;
    let memory = memory::collect().await;
    let battery = battery::collect().await;
    let storage = storage::collect(&config.storage_path).await;
    let network = network::collect(config).await;

    ResourceSnapshot {
        cpu_free_percent,
        ram_free_mb: memory.free_mb,
        ram_total_mb: memory.total_mb,
        ram_used_percent: ram_used_percent(memory.total_mb, memory.free_mb),
        battery,
        storage,
        network,
        uptime_seconds: System::uptime(),
        timestamp: Utc::now(),
    }
}

/// The snapshot produced when every strategy of every collector fails.
/// Deterministic apart from the capture time.
pub fn fallback_snapshot() -> ResourceSnapshot {
    ResourceSnapshot {
        cpu_free_percent: cpu::DEFAULT_CPU_FREE,
        ram_free_mb: memory::DEFAULT_MEMORY.free_mb,
        ram_total_mb: memory::DEFAULT_MEMORY.total_mb,
        ram_used_percent: ram_used_percent(
            memory::DEFAULT_MEMORY.total_mb,
            memory::DEFAULT_MEMORY.free_mb,
        ),
        battery: Some(battery::DEFAULT_BATTERY),
        storage: storage::DEFAULT_STORAGE,
        network: network::DEFAULT_NETWORK,
        uptime_seconds: 0,
        timestamp: Utc::now(),
    }
}

/// Derived memory pressure; guarded against an empty total.
pub fn ram_used_percent(total_mb: u64, free_mb: u64) -> f64 {
    if total_mb == 0 {
        return 0.0;
    }
    let used = total_mb.saturating_sub(free_mb);
    round2(used as f64 / total_mb as f64 * 100.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Seam between the snapshot builder and the session state machine.
#[async_trait]
pub trait SnapshotSource: Send {
    async fn sample(&mut self) -> ResourceSnapshot;
}

/// Production snapshot source: samples the device this process runs on.
pub struct SystemSampler {
    identity: DeviceIdentity,
    config: MetricsConfig,
}

impl SystemSampler {
    pub fn new(identity: DeviceIdentity, config: MetricsConfig) -> Self {
        Self { identity, config }
    }
}

#[async_trait]
impl SnapshotSource for SystemSampler {
    async fn sample(&mut self) -> ResourceSnapshot {
        build_snapshot(&self.identity, &self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_used_percent_matches_the_documented_formula() {
        assert_eq!(ram_used_percent(8192, 2048), 75.0);
        assert_eq!(ram_used_percent(8010, 4000), 50.06);
        assert_eq!(ram_used_percent(3, 1), 66.67);
    }

    #[test]
    fn ram_used_percent_handles_degenerate_inputs() {
        assert_eq!(ram_used_percent(0, 0), 0.0);
        assert_eq!(ram_used_percent(0, 4096), 0.0);
        // A free reading above total must clamp, not wrap.
        assert_eq!(ram_used_percent(1024, 2048), 0.0);
    }

    #[test]
    fn ram_used_percent_stays_in_bounds() {
        for (total, free) in [(1, 0), (1, 1), (u64::MAX, 0), (u64::MAX, u64::MAX)] {
            let percent = ram_used_percent(total, free);
            assert!((0.0..=100.0).contains(&percent), "{percent} out of range");
        }
    }

    #[test]
    fn fallback_snapshot_is_fully_populated_and_deterministic() {
        let a = fallback_snapshot();
        let b = fallback_snapshot();

        assert_eq!(a.cpu_free_percent, 50.0);
        assert_eq!(a.ram_free_mb, 0);
        assert_eq!(a.ram_total_mb, 0);
        assert_eq!(a.ram_used_percent, 0.0);
        assert_eq!(a.battery, Some(battery::DEFAULT_BATTERY));
        assert_eq!(a.storage, storage::DEFAULT_STORAGE);
        assert_eq!(a.network, network::DEFAULT_NETWORK);

        // Identical apart from the capture timestamp.
        assert_eq!(a.cpu_free_percent, b.cpu_free_percent);
        assert_eq!(a.battery, b.battery);
        assert_eq!(a.storage, b.storage);
        assert_eq!(a.network, b.network);
    }

    #[tokio::test]
    async fn build_snapshot_never_fails() {
        let identity = DeviceIdentity::establish("ab12cd34".to_string());
        let snapshot = build_snapshot(&identity, &MetricsConfig::default()).await;

        assert!((0.0..=100.0).contains(&snapshot.cpu_free_percent));
        assert!((0.0..=100.0).contains(&snapshot.ram_used_percent));
        assert!(snapshot.storage.total_gb > 0.0);
    }
}
