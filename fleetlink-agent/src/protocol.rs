//! Coordinator wire protocol
//!
//! JSON messages over the persistent connection, each carrying a `type` tag.
//! Agent to coordinator: `register`, `heartbeat`, `pong`. Coordinator to
//! agent: `registration_ack`, `heartbeat_ack`, `ping`. Anything else coming
//! from the coordinator is ignored, never an error.

use crate::metrics::ResourceSnapshot;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Messages the agent sends to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Sent once per connection, right after the transport opens.
    Register {
        device_id: String,
        platform: String,
        hostname: String,
        cpu_cores: usize,
        version: String,
        #[serde(flatten)]
        snapshot: ResourceSnapshot,
    },
    /// Sent on every cadence tick while streaming.
    Heartbeat {
        device_id: String,
        seq: u64,
        #[serde(flatten)]
        snapshot: ResourceSnapshot,
    },
    /// Reply to a coordinator-initiated `ping`.
    Pong { device_id: String },
}

/// Messages the agent understands from the coordinator. All payloads are
/// treated as opaque beyond the fields below; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    RegistrationAck {},
    HeartbeatAck {
        /// Optionally echoes the acknowledged heartbeat's `seq`.
        #[serde(default)]
        seq: Option<u64>,
    },
    Ping {},
}

/// Decode a coordinator payload, ignoring unknown types and malformed JSON.
pub fn decode_inbound(raw: &str) -> Option<Inbound> {
    match serde_json::from_str(raw) {
        Ok(message) => Some(message),
        Err(err) => {
            debug!(%err, "ignoring unrecognized coordinator payload");
            None
        }
    }
}
