//! CPU availability
//!
//! Estimates the instantaneous idle fraction of the CPU, in percent.
//! Strategies, high to low priority:
//! 1. sysinfo aggregate usage sampled across a short settle interval
//! 2. `/proc/stat` counter delta across a short sleep
//! 3. 1-minute load average scaled by the logical core count
//!
//! The fallback is 50.0: a hard zero would read as "no CPU available" and
//! wrongly exclude a healthy device from placement.

use super::probe::{first_success, read_virtual_file, Strategy};
use super::round2;
use crate::error::SampleError;
use async_trait::async_trait;
use std::time::Duration;
use sysinfo::System;

pub const DEFAULT_CPU_FREE: f64 = 50.0;

const SETTLE_INTERVAL: Duration = Duration::from_millis(200);
const STAT_INTERVAL: Duration = Duration::from_millis(250);

pub async fn collect(cpu_cores: usize) -> f64 {
    let chain: Vec<Box<dyn Strategy<f64>>> = vec![
        Box::new(SysinfoUsage),
        Box::new(ProcStatDelta),
        Box::new(LoadAverageEstimate { cpu_cores }),
    ];
    first_success("cpu_free_percent", &chain, DEFAULT_CPU_FREE).await
}

/// Aggregate usage from the OS-level counters sysinfo wraps. Two refreshes
/// are needed for a meaningful reading.
struct SysinfoUsage;

#[async_trait]
impl Strategy<f64> for SysinfoUsage {
    fn name(&self) -> &'static str {
        "sysinfo-aggregate"
    }

    async fn sample(&self) -> Result<f64, SampleError> {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        tokio::time::sleep(SETTLE_INTERVAL).await;
        sys.refresh_cpu_usage();

        let usage = sys.global_cpu_info().cpu_usage() as f64;
        // An exact 0.0 means the backend produced no reading at all.
        if !usage.is_finite() || usage == 0.0 {
            return Err(SampleError::Unavailable("no aggregate cpu reading"));
        }
        Ok(round2((100.0 - usage).clamp(0.0, 100.0)))
    }
}

/// Delta of two raw kernel counter reads. Works where sysinfo's backend is
/// unavailable but `/proc` is still readable.
struct ProcStatDelta;

#[async_trait]
impl Strategy<f64> for ProcStatDelta {
    fn name(&self) -> &'static str {
        "proc-stat-delta"
    }

    async fn sample(&self) -> Result<f64, SampleError> {
        let first = read_cpu_counters().await?;
        tokio::time::sleep(STAT_INTERVAL).await;
        let second = read_cpu_counters().await?;

        cpu_free_from_delta(first, second)
            .ok_or(SampleError::Unavailable("cpu counters did not advance"))
    }
}

/// Coarse estimate from the 1-minute load average: a load equal to the core
/// count is treated as a fully busy machine.
struct LoadAverageEstimate {
    cpu_cores: usize,
}

#[async_trait]
impl Strategy<f64> for LoadAverageEstimate {
    fn name(&self) -> &'static str {
        "load-average"
    }

    async fn sample(&self) -> Result<f64, SampleError> {
        if self.cpu_cores == 0 {
            return Err(SampleError::Unavailable("unknown core count"));
        }
        let load = System::load_average().one;
        if !load.is_finite() || load < 0.0 {
            return Err(SampleError::Unavailable("no load average"));
        }
        Ok(free_from_load(load, self.cpu_cores))
    }
}

/// `(idle, total)` jiffies from the aggregate `cpu` line.
async fn read_cpu_counters() -> Result<(u64, u64), SampleError> {
    let stat = read_virtual_file("/proc/stat").await?;
    let line = stat
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| SampleError::Parse("no aggregate cpu line in /proc/stat".to_string()))?;
    parse_cpu_line(line).ok_or_else(|| SampleError::Parse(format!("bad cpu line: {line}")))
}

fn parse_cpu_line(line: &str) -> Option<(u64, u64)> {
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map_while(|f| f.parse().ok())
        .collect();
    // user nice system idle iowait irq softirq steal
    if fields.len() < 8 {
        return None;
    }
    let idle = fields[3] + fields[4];
    let total: u64 = fields[..8].iter().sum();
    Some((idle, total))
}

fn cpu_free_from_delta(first: (u64, u64), second: (u64, u64)) -> Option<f64> {
    let idle = second.0.checked_sub(first.0)?;
    let total = second.1.checked_sub(first.1)?;
    if total == 0 {
        return None;
    }
    Some(round2((idle as f64 / total as f64 * 100.0).clamp(0.0, 100.0)))
}

fn free_from_load(load_one: f64, cpu_cores: usize) -> f64 {
    round2(((1.0 - load_one / cpu_cores as f64) * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aggregate_cpu_line() {
        let line = "cpu  4705 150 1120 16250 520 30 45 0 0 0";
        let (idle, total) = parse_cpu_line(line).unwrap();
        assert_eq!(idle, 16250 + 520);
        assert_eq!(total, 4705 + 150 + 1120 + 16250 + 520 + 30 + 45);
    }

    #[test]
    fn rejects_truncated_cpu_line() {
        assert_eq!(parse_cpu_line("cpu 1 2 3"), None);
        assert_eq!(parse_cpu_line("intr 12345"), None);
    }

    #[test]
    fn delta_yields_idle_fraction() {
        // 100 total jiffies elapsed, 75 of them idle.
        let free = cpu_free_from_delta((1000, 5000), (1075, 5100)).unwrap();
        assert_eq!(free, 75.0);
    }

    #[test]
    fn delta_without_progress_is_rejected() {
        assert_eq!(cpu_free_from_delta((1000, 5000), (1000, 5000)), None);
        // Counter regression (e.g. mismatched reads) must not panic.
        assert_eq!(cpu_free_from_delta((1000, 5000), (900, 4900)), None);
    }

    #[test]
    fn load_estimate_clamps_to_bounds() {
        assert_eq!(free_from_load(0.0, 4), 100.0);
        assert_eq!(free_from_load(2.0, 4), 50.0);
        assert_eq!(free_from_load(8.0, 4), 0.0);
        assert_eq!(free_from_load(1.0, 8), 87.5);
    }
}
