//! Storage capacity of the primary data partition
//!
//! Strategies, high to low priority:
//! 1. `df -k <path>` (portable across the Unix-likes this agent targets)
//! 2. sysinfo `Disks` API, best mount-point match for the path
//!
//! The fallback `{128, 64, 50%}` is a deliberately unremarkable mid-size
//! device so an unreadable filesystem neither attracts nor repels placement.

use super::probe::{first_success, run_command, Strategy};
use super::round2;
use crate::error::SampleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sysinfo::Disks;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageStatus {
    pub total_gb: f64,
    pub free_gb: f64,
    pub used_percent: f64,
}

pub const DEFAULT_STORAGE: StorageStatus = StorageStatus {
    total_gb: 128.0,
    free_gb: 64.0,
    used_percent: 50.0,
};

const KIB_PER_GIB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub async fn collect(path: &str) -> StorageStatus {
    let chain: Vec<Box<dyn Strategy<StorageStatus>>> = vec![
        Box::new(DfCommand {
            path: path.to_string(),
        }),
        Box::new(SysinfoDisks {
            path: path.to_string(),
        }),
    ];
    first_success("storage", &chain, DEFAULT_STORAGE).await
}

struct DfCommand {
    path: String,
}

#[async_trait]
impl Strategy<StorageStatus> for DfCommand {
    fn name(&self) -> &'static str {
        "df-command"
    }

    async fn sample(&self) -> Result<StorageStatus, SampleError> {
        let output = run_command("df", &["-k", &self.path]).await?;
        parse_df_output(&output)
            .ok_or_else(|| SampleError::Parse("unexpected df output".to_string()))
    }
}

struct SysinfoDisks {
    path: String,
}

#[async_trait]
impl Strategy<StorageStatus> for SysinfoDisks {
    fn name(&self) -> &'static str {
        "sysinfo-disks"
    }

    async fn sample(&self) -> Result<StorageStatus, SampleError> {
        let disks = Disks::new_with_refreshed_list();

        // Longest mount point that prefixes the data path wins.
        let disk = disks
            .iter()
            .filter(|d| self.path.starts_with(&*d.mount_point().to_string_lossy()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .ok_or(SampleError::Unavailable("no disk covers the data path"))?;

        let total = disk.total_space();
        if total == 0 {
            return Err(SampleError::Unavailable("zero-sized disk reading"));
        }
        let free = disk.available_space();
        let used = total.saturating_sub(free);

        Ok(StorageStatus {
            total_gb: round2(total as f64 / BYTES_PER_GIB),
            free_gb: round2(free as f64 / BYTES_PER_GIB),
            used_percent: round2(used as f64 / total as f64 * 100.0),
        })
    }
}

/// Parse `df -k` output: the first data row with numeric block counts.
/// Long device names can push a row onto two lines, so rows are matched by
/// shape rather than position.
fn parse_df_output(output: &str) -> Option<StorageStatus> {
    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // [filesystem] total_kb used_kb avail_kb ...
        let Some(start) = fields.iter().position(|f| f.parse::<u64>().is_ok()) else {
            continue;
        };
        let parsed: Vec<u64> = fields[start..]
            .iter()
            .map_while(|f| f.parse().ok())
            .collect();
        if parsed.len() < 3 {
            continue;
        }

        let (total_kb, used_kb, avail_kb) = (parsed[0], parsed[1], parsed[2]);
        if total_kb == 0 || used_kb + avail_kb == 0 {
            continue;
        }

        return Some(StorageStatus {
            total_gb: round2(total_kb as f64 / KIB_PER_GIB),
            free_gb: round2(avail_kb as f64 / KIB_PER_GIB),
            used_percent: round2(used_kb as f64 / (used_kb + avail_kb) as f64 * 100.0),
        });
    }
    None
}
