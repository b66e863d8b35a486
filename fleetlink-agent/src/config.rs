//! Configuration management
//!
//! Handles:
//! - Coordinator endpoint
//! - Session timing (heartbeat cadence, ack bound, backoff policy)
//! - Metric collection settings
//! - Persisted device identity
//!
//! Loaded from `<config_dir>/fleetlink-agent/config.toml`; every field has a
//! default so a missing or partial file is never fatal. The generated device
//! id is written back on first run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

/// Environment variable overriding the coordinator endpoint.
pub const COORDINATOR_URL_ENV: &str = "FLEETLINK_COORDINATOR_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub coordinator: CoordinatorConfig,
    pub session: SessionSettings,
    pub metrics: MetricsSettings,
    pub agent: AgentInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// WebSocket endpoint of the coordinator.
    pub url: String,
}

/// Session timing knobs, in fractional seconds so tests can compress time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub heartbeat_interval_secs: f64,
    pub registration_ack_timeout_secs: f64,
    pub backoff_base_secs: f64,
    pub backoff_factor: f64,
    pub backoff_max_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Primary data partition reported by the storage collector.
    pub storage_path: String,
    /// Optional `host:port` override for the network reachability probe.
    /// Defaults to the coordinator host derived from its URL.
    pub probe_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentInfo {
    /// Persisted on first run; empty means "generate one".
    pub device_id: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:5000/ws".to_string(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 5.0,
            registration_ack_timeout_secs: 5.0,
            backoff_base_secs: 5.0,
            backoff_factor: 1.5,
            backoff_max_secs: 60.0,
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            storage_path: "/".to_string(),
            probe_addr: None,
        }
    }
}

impl Default for AgentInfo {
    fn default() -> Self {
        Self {
            device_id: String::new(),
        }
    }
}

impl AgentConfig {
    /// Load config from the OS-specific location, falling back to defaults.
    ///
    /// Ensures a device id exists, generating and persisting one on first run.
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;

        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("invalid TOML in {}", config_path.display()))?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var(COORDINATOR_URL_ENV) {
            if !url.is_empty() {
                config.coordinator.url = url;
            }
        }

        if config.agent.device_id.trim().is_empty() {
            config.agent.device_id = generate_device_id();
            if let Err(err) = config.save().await {
                warn!(%err, "could not persist generated device id; using it for this run only");
            }
        }

        Ok(config)
    }

    /// Save config to the OS-specific location.
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path()?;

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(&config_path, content).await?;
        Ok(())
    }

    /// OS-specific config file path.
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("could not determine a config directory"))?;
        path.push("fleetlink-agent");
        path.push("config.toml");
        Ok(path)
    }
}

/// Short random device token, matching the 8-char ids the coordinator indexes.
pub fn generate_device_id() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(8);
    token
}
