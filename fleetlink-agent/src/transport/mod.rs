//! Coordinator transport contract
//!
//! The session state machine owns the connection lifecycle and only ever
//! talks to these two traits. The production implementation is the WebSocket
//! adapter in `ws`; the devkit ships a scripted stub for tests.

pub mod ws;

pub use ws::{WsConnector, WsTransport};

use crate::error::TransportError;
use crate::protocol::{Inbound, Outbound};
use async_trait::async_trait;
use std::time::Duration;

/// One open, bidirectional, message-oriented connection to the coordinator.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, message: &Outbound) -> Result<(), TransportError>;

    /// Wait up to `wait` for the next decodable coordinator message.
    /// `Ok(None)` is a timeout, which is never an error.
    async fn receive(&mut self, wait: Duration) -> Result<Option<Inbound>, TransportError>;

    async fn close(&mut self);
}

/// Factory for [`Transport`] connections; one `connect` per session attempt.
#[async_trait]
pub trait Connector: Send {
    async fn connect(&mut self) -> Result<Box<dyn Transport>, TransportError>;
}
