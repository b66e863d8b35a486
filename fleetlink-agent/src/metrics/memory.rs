//! Memory availability
//!
//! Strategies, high to low priority:
//! 1. sysinfo virtual-memory API
//! 2. `MemAvailable` from `/proc/meminfo`
//! 3. `MemFree + Cached + Buffers` derived from `/proc/meminfo` (older
//!    kernels without `MemAvailable`)

use super::probe::{first_success, read_virtual_file, Strategy};
use crate::error::SampleError;
use async_trait::async_trait;
use sysinfo::System;

/// Free and total RAM in megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReading {
    pub free_mb: u64,
    pub total_mb: u64,
}

pub const DEFAULT_MEMORY: MemoryReading = MemoryReading {
    free_mb: 0,
    total_mb: 0,
};

const MIB: u64 = 1024 * 1024;

pub async fn collect() -> MemoryReading {
    let chain: Vec<Box<dyn Strategy<MemoryReading>>> = vec![
        Box::new(SysinfoMemory),
        Box::new(MeminfoAvailable),
        Box::new(MeminfoDerived),
    ];
    first_success("memory", &chain, DEFAULT_MEMORY).await
}

struct SysinfoMemory;

#[async_trait]
impl Strategy<MemoryReading> for SysinfoMemory {
    fn name(&self) -> &'static str {
        "sysinfo-vm"
    }

    async fn sample(&self) -> Result<MemoryReading, SampleError> {
        let mut sys = System::new();
        sys.refresh_memory();

        let total = sys.total_memory();
        if total == 0 {
            return Err(SampleError::Unavailable("no memory reading"));
        }
        Ok(MemoryReading {
            free_mb: sys.available_memory() / MIB,
            total_mb: total / MIB,
        })
    }
}

struct MeminfoAvailable;

#[async_trait]
impl Strategy<MemoryReading> for MeminfoAvailable {
    fn name(&self) -> &'static str {
        "meminfo-available"
    }

    async fn sample(&self) -> Result<MemoryReading, SampleError> {
        let meminfo = read_virtual_file("/proc/meminfo").await?;
        reading_from_available(&meminfo)
            .ok_or_else(|| SampleError::Parse("no MemAvailable in /proc/meminfo".to_string()))
    }
}

struct MeminfoDerived;

#[async_trait]
impl Strategy<MemoryReading> for MeminfoDerived {
    fn name(&self) -> &'static str {
        "meminfo-derived"
    }

    async fn sample(&self) -> Result<MemoryReading, SampleError> {
        let meminfo = read_virtual_file("/proc/meminfo").await?;
        reading_from_free_cached_buffers(&meminfo)
            .ok_or_else(|| SampleError::Parse("incomplete /proc/meminfo".to_string()))
    }
}

/// Value in kB of a `Key:  12345 kB` meminfo line.
fn meminfo_field(meminfo: &str, key: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        rest.split_whitespace().next()?.parse().ok()
    })
}

fn reading_from_available(meminfo: &str) -> Option<MemoryReading> {
    let total_kb = meminfo_field(meminfo, "MemTotal")?;
    let available_kb = meminfo_field(meminfo, "MemAvailable")?;
    Some(MemoryReading {
        free_mb: available_kb / 1024,
        total_mb: total_kb / 1024,
    })
}

fn reading_from_free_cached_buffers(meminfo: &str) -> Option<MemoryReading> {
    let total_kb = meminfo_field(meminfo, "MemTotal")?;
    let free_kb = meminfo_field(meminfo, "MemFree")?;
    let cached_kb = meminfo_field(meminfo, "Cached")?;
    let buffers_kb = meminfo_field(meminfo, "Buffers")?;
    Some(MemoryReading {
        free_mb: (free_kb + cached_kb + buffers_kb) / 1024,
        total_mb: total_kb / 1024,
    })
}
