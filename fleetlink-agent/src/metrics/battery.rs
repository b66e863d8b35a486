//! Battery state
//!
//! Strategies, high to low priority:
//! 1. `termux-battery-status` vendor helper (JSON)
//! 2. `dumpsys battery` system dump (text-parsed)
//! 3. sysfs per-supply directories (`/sys/class/power_supply/*/capacity`)
//! 4. AC charging-indicator-only probe (`.../online`)
//!
//! A strategy that can positively determine the device has no battery yields
//! `None`. The all-failed fallback is `{percent: 100, status: unknown}`,
//! which consumers must read as "no power constraint", never as "full".

use super::probe::{first_success, read_virtual_file, run_command, Strategy};
use crate::error::SampleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeState {
    Charging,
    Discharging,
    Full,
    Unknown,
}

/// Which probe produced the reading. Recorded because it is cheap and the
/// coordinator dashboards group devices by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatterySource {
    Api,
    SystemDump,
    Sysfs,
    PowerSupplyProbe,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryStatus {
    pub percent: u8,
    pub status: ChargeState,
    pub source: BatterySource,
}

pub const DEFAULT_BATTERY: BatteryStatus = BatteryStatus {
    percent: 100,
    status: ChargeState::Unknown,
    source: BatterySource::Unknown,
};

const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

/// `None` means the device verifiably has no battery.
pub async fn collect() -> Option<BatteryStatus> {
    let chain: Vec<Box<dyn Strategy<Option<BatteryStatus>>>> = vec![
        Box::new(TermuxHelper),
        Box::new(DumpsysBattery),
        Box::new(SysfsSupplies),
        Box::new(ChargeIndicator),
    ];
    first_success("battery", &chain, Some(DEFAULT_BATTERY)).await
}

/// Termux exposes the Android battery API as a JSON-printing helper.
struct TermuxHelper;

#[async_trait]
impl Strategy<Option<BatteryStatus>> for TermuxHelper {
    fn name(&self) -> &'static str {
        "termux-helper"
    }

    async fn sample(&self) -> Result<Option<BatteryStatus>, SampleError> {
        let output = run_command("termux-battery-status", &[]).await?;
        parse_termux_json(&output)
            .map(Some)
            .ok_or_else(|| SampleError::Parse("unexpected termux-battery-status output".to_string()))
    }
}

struct DumpsysBattery;

#[async_trait]
impl Strategy<Option<BatteryStatus>> for DumpsysBattery {
    fn name(&self) -> &'static str {
        "dumpsys-battery"
    }

    async fn sample(&self) -> Result<Option<BatteryStatus>, SampleError> {
        let output = run_command("dumpsys", &["battery"]).await?;
        parse_dumpsys_output(&output)
            .ok_or_else(|| SampleError::Parse("unexpected dumpsys battery output".to_string()))
    }
}

/// Walk `/sys/class/power_supply` looking for `type == Battery` directories.
struct SysfsSupplies;

#[async_trait]
impl Strategy<Option<BatteryStatus>> for SysfsSupplies {
    fn name(&self) -> &'static str {
        "sysfs-supplies"
    }

    async fn sample(&self) -> Result<Option<BatteryStatus>, SampleError> {
        let mut entries = tokio::fs::read_dir(POWER_SUPPLY_ROOT).await?;
        let mut saw_supply = false;
        let mut saw_battery = false;

        while let Some(entry) = entries.next_entry().await? {
            saw_supply = true;
            let dir = entry.path();
            let Ok(kind) = read_virtual_file(dir.join("type")).await else {
                continue;
            };
            if kind.trim() != "Battery" {
                continue;
            }
            saw_battery = true;
            if let Some(status) = read_sysfs_battery(&dir).await {
                return Ok(Some(status));
            }
        }

        if saw_battery {
            // A battery exists but is unreadable: let the chain keep probing.
            Err(SampleError::Unavailable("battery entry unreadable"))
        } else if saw_supply {
            // Power supplies exist but none of them is a battery: a desktop.
            Ok(None)
        } else {
            Err(SampleError::Unavailable("no power supply entries"))
        }
    }
}

/// Last resort: only the AC `online` flag is readable.
struct ChargeIndicator;

#[async_trait]
impl Strategy<Option<BatteryStatus>> for ChargeIndicator {
    fn name(&self) -> &'static str {
        "charge-indicator"
    }

    async fn sample(&self) -> Result<Option<BatteryStatus>, SampleError> {
        let mut entries = tokio::fs::read_dir(POWER_SUPPLY_ROOT).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Ok(online) = read_virtual_file(entry.path().join("online")).await else {
                continue;
            };
            let status = if online.trim() == "1" {
                ChargeState::Charging
            } else {
                ChargeState::Unknown
            };
            return Ok(Some(BatteryStatus {
                percent: 100,
                status,
                source: BatterySource::PowerSupplyProbe,
            }));
        }

        Err(SampleError::Unavailable("no charging indicator"))
    }
}

async fn read_sysfs_battery(dir: &Path) -> Option<BatteryStatus> {
    let capacity = read_virtual_file(dir.join("capacity")).await.ok()?;
    let percent: u8 = capacity.trim().parse().ok()?;
    let status = match read_virtual_file(dir.join("status")).await {
        Ok(raw) => parse_sysfs_status(&raw),
        Err(_) => ChargeState::Unknown,
    };
    Some(BatteryStatus {
        percent: percent.min(100),
        status,
        source: BatterySource::Sysfs,
    })
}

fn parse_sysfs_status(raw: &str) -> ChargeState {
    match raw.trim() {
        "Charging" => ChargeState::Charging,
        "Discharging" | "Not charging" => ChargeState::Discharging,
        "Full" => ChargeState::Full,
        _ => ChargeState::Unknown,
    }
}

fn parse_termux_json(raw: &str) -> Option<BatteryStatus> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let percent = value.get("percentage")?.as_f64()?;
    let status = match value.get("status").and_then(|s| s.as_str()) {
        Some("CHARGING") => ChargeState::Charging,
        Some("DISCHARGING") | Some("NOT_CHARGING") => ChargeState::Discharging,
        Some("FULL") => ChargeState::Full,
        _ => ChargeState::Unknown,
    };
    Some(BatteryStatus {
        percent: percent.clamp(0.0, 100.0) as u8,
        status,
        source: BatterySource::Api,
    })
}

/// Parse `dumpsys battery` key/value lines. An explicit `present: false`
/// means the device has no battery at all.
fn parse_dumpsys_output(raw: &str) -> Option<Option<BatteryStatus>> {
    let field = |key: &str| {
        raw.lines()
            .find_map(|line| line.trim().strip_prefix(key)?.strip_prefix(':').map(str::trim))
    };

    if field("present") == Some("false") {
        return Some(None);
    }

    let percent: u8 = field("level")?.parse().ok()?;
    // Android BatteryManager status codes.
    let status = match field("status") {
        Some("2") => ChargeState::Charging,
        Some("3") | Some("4") => ChargeState::Discharging,
        Some("5") => ChargeState::Full,
        _ => ChargeState::Unknown,
    };

    Some(Some(BatteryStatus {
        percent: percent.min(100),
        status,
        source: BatterySource::SystemDump,
    }))
}
