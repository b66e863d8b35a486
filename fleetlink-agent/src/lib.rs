//! Fleetlink Agent - device-side resource reporting
//!
//! The agent continuously estimates how much compute, memory, power, storage
//! and network capacity a device has to spare and streams that state to a
//! remote coordinator over a persistent WebSocket connection:
//! - Per-metric fallback chains that degrade gracefully across platforms
//! - Immutable snapshots rebuilt on every sampling cycle
//! - Reconnecting session state machine with bounded multiplicative backoff
//! - Heartbeat protocol with acknowledgment correlation and ping/pong

pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::AgentConfig;
pub use error::{SampleError, TransportError};
pub use identity::DeviceIdentity;
pub use metrics::{MetricsConfig, ResourceSnapshot, SnapshotSource, SystemSampler};
pub use protocol::{Inbound, Outbound};
pub use session::{Session, SessionState, SessionSummary};
pub use transport::{Connector, Transport};
