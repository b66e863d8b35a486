//! Error taxonomy for the agent
//!
//! Two failure families cross module boundaries:
//! - [`SampleError`]: a single measurement strategy failed. Absorbed by the
//!   fallback chain inside `metrics`; never reaches the session.
//! - [`TransportError`]: the coordinator connection failed. Propagates exactly
//!   one level, into the session's backoff transition.
//!
//! Protocol timeouts are not errors (`Transport::receive` returns `Ok(None)`),
//! and fatal configuration problems are reported with `anyhow` context from
//! the binary entry point.

use std::time::Duration;
use thiserror::Error;

/// Failure of one measurement strategy inside a metric's fallback chain.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("probe i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("unparseable probe output: {0}")]
    Parse(String),

    #[error("probe exceeded its {0:?} bound")]
    Timeout(Duration),

    #[error("{0}")]
    Unavailable(&'static str),
}

/// Failure of the coordinator connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connection closed by peer")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),
}
