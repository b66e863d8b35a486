//! Network reachability
//!
//! Strategies, high to low priority:
//! 1. Local interface address scan, loopback excluded. An error-free scan
//!    that finds nothing is a definitive "offline", not a failure.
//! 2. Short-timeout TCP connect to the coordinator host (`direct`).
//! 3. Short-timeout TCP connect to a well-known external address
//!    (`internet-probe`).

use super::probe::{first_success, Strategy, PROBE_TIMEOUT};
use super::MetricsConfig;
use crate::error::SampleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// How the reachability verdict was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeMethod {
    Direct,
    InternetProbe,
    InterfaceScan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub connected: bool,
    pub method: ProbeMethod,
}

pub const DEFAULT_NETWORK: NetworkStatus = NetworkStatus {
    connected: false,
    method: ProbeMethod::InterfaceScan,
};

const EXTERNAL_PROBE_ADDR: &str = "8.8.8.8:53";

pub async fn collect(config: &MetricsConfig) -> NetworkStatus {
    let mut chain: Vec<Box<dyn Strategy<NetworkStatus>>> = vec![Box::new(ScanInterfaces)];
    if let Some(addr) = &config.probe_addr {
        chain.push(Box::new(ProbeCoordinator { addr: addr.clone() }));
    }
    chain.push(Box::new(ProbeExternal));
    first_success("network", &chain, DEFAULT_NETWORK).await
}

struct ScanInterfaces;

#[async_trait]
impl Strategy<NetworkStatus> for ScanInterfaces {
    fn name(&self) -> &'static str {
        "interface-scan"
    }

    async fn sample(&self) -> Result<NetworkStatus, SampleError> {
        let interfaces = if_addrs::get_if_addrs()?;
        let connected = interfaces.iter().any(|iface| !iface.is_loopback());
        Ok(NetworkStatus {
            connected,
            method: ProbeMethod::InterfaceScan,
        })
    }
}

struct ProbeCoordinator {
    addr: String,
}

#[async_trait]
impl Strategy<NetworkStatus> for ProbeCoordinator {
    fn name(&self) -> &'static str {
        "coordinator-probe"
    }

    async fn sample(&self) -> Result<NetworkStatus, SampleError> {
        probe_tcp(&self.addr).await?;
        Ok(NetworkStatus {
            connected: true,
            method: ProbeMethod::Direct,
        })
    }
}

struct ProbeExternal;

#[async_trait]
impl Strategy<NetworkStatus> for ProbeExternal {
    fn name(&self) -> &'static str {
        "internet-probe"
    }

    async fn sample(&self) -> Result<NetworkStatus, SampleError> {
        probe_tcp(EXTERNAL_PROBE_ADDR).await?;
        Ok(NetworkStatus {
            connected: true,
            method: ProbeMethod::InternetProbe,
        })
    }
}

async fn probe_tcp(addr: &str) -> Result<(), SampleError> {
    timeout(PROBE_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| SampleError::Timeout(PROBE_TIMEOUT))??;
    Ok(())
}

/// Extract a probeable `host:port` from a coordinator WebSocket URL.
pub fn coordinator_probe_addr(url: &str) -> Option<String> {
    let (default_port, rest) = if let Some(rest) = url.strip_prefix("wss://") {
        (443, rest)
    } else if let Some(rest) = url.strip_prefix("ws://") {
        (80, rest)
    } else {
        return None;
    };

    let authority = rest.split('/').next()?;
    if authority.is_empty() {
        return None;
    }

    if authority.contains(':') {
        Some(authority.to_string())
    } else {
        Some(format!("{authority}:{default_port}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_addr_keeps_explicit_ports() {
        assert_eq!(
            coordinator_probe_addr("ws://192.168.100.2:5000/ws"),
            Some("192.168.100.2:5000".to_string())
        );
    }

    #[test]
    fn probe_addr_supplies_scheme_default_ports() {
        assert_eq!(
            coordinator_probe_addr("ws://coordinator.local/agents"),
            Some("coordinator.local:80".to_string())
        );
        assert_eq!(
            coordinator_probe_addr("wss://fleet.example.com"),
            Some("fleet.example.com:443".to_string())
        );
    }

    #[test]
    fn probe_addr_rejects_non_websocket_urls() {
        assert_eq!(coordinator_probe_addr("http://example.com"), None);
        assert_eq!(coordinator_probe_addr("ws://"), None);
        assert_eq!(coordinator_probe_addr("fleet.example.com:5000"), None);
    }

    #[tokio::test]
    async fn unroutable_probe_fails_within_the_bound() {
        // TEST-NET-1 address, guaranteed unassigned.
        let started = std::time::Instant::now();
        let result = probe_tcp("192.0.2.1:9").await;
        assert!(result.is_err());
        assert!(started.elapsed() <= PROBE_TIMEOUT + std::time::Duration::from_secs(1));
    }
}
