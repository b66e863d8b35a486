//! Device identification
//!
//! A [`DeviceIdentity`] is established once at process start and stays
//! read-only for the process lifetime. The device id is a short random token
//! generated on first run and persisted through the config file, so the
//! coordinator sees the same identity across restarts.

use tracing::info;

/// Immutable identity of the device this agent runs on.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    /// Short random token (8 hex chars), stable across restarts.
    pub device_id: String,
    /// Platform tag (`linux`, `android`, `macos`, `windows`, ...).
    pub platform: String,
    pub hostname: String,
    /// Logical CPU count.
    pub cpu_cores: usize,
}

impl DeviceIdentity {
    /// Establish the identity for this process from a persisted device id.
    pub fn establish(device_id: String) -> Self {
        let platform = std::env::consts::OS.to_string();
        let hostname = gethostname::gethostname().to_string_lossy().to_string();
        let cpu_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        info!(%device_id, %platform, %hostname, cpu_cores, "device identity established");

        DeviceIdentity {
            device_id,
            platform,
            hostname,
            cpu_cores,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_captures_platform_and_cores() {
        let identity = DeviceIdentity::establish("ab12cd34".to_string());
        assert_eq!(identity.device_id, "ab12cd34");
        assert!(!identity.platform.is_empty());
        assert!(identity.cpu_cores >= 1);
    }
}
