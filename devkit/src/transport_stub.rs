//! Scripted transport stub
//!
//! Implements the agent's `Connector`/`Transport` contract over a script of
//! connection outcomes and inbound events, recording every message the agent
//! sends and every connect attempt. Works under `tokio::time::pause`: a
//! scripted silence sleeps for the full wait the session asked for, exactly
//! like a quiet coordinator.

use async_trait::async_trait;
use fleetlink_agent::error::TransportError;
use fleetlink_agent::protocol::{Inbound, Outbound};
use fleetlink_agent::transport::{Connector, Transport};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// One step of a connection's receive script.
pub enum ScriptedEvent {
    /// Delivered to the agent immediately.
    Incoming(Inbound),
    /// The coordinator stays quiet for the whole wait window.
    Silence,
    /// The connection drops.
    Disconnect,
}

/// Outcome of one connect attempt.
pub enum ConnectOutcome {
    Refuse,
    Accept(StubConnection),
}

/// Script for one accepted connection.
pub struct StubConnection {
    events: Vec<ScriptedEvent>,
    max_sends: Option<usize>,
}

impl StubConnection {
    pub fn new(events: Vec<ScriptedEvent>) -> Self {
        Self {
            events,
            max_sends: None,
        }
    }

    /// Fail every send after `limit` successful ones.
    pub fn with_send_limit(events: Vec<ScriptedEvent>, limit: usize) -> Self {
        Self {
            events,
            max_sends: Some(limit),
        }
    }
}

/// Shared inspection handle for assertions: what was sent, and when each
/// connect attempt happened.
#[derive(Clone, Default)]
pub struct SessionProbe {
    sent: Arc<Mutex<Vec<(usize, Outbound)>>>,
    connects: Arc<Mutex<Vec<Instant>>>,
}

impl SessionProbe {
    /// Every message the agent sent, across all connections, in order.
    pub fn sent(&self) -> Vec<Outbound> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Messages sent on the `connection`-th accepted connection (0-based).
    pub fn sent_on(&self, connection: usize) -> Vec<Outbound> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(conn, _)| *conn == connection)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Message kinds in send order, for compact assertions.
    pub fn sent_kinds(&self) -> Vec<&'static str> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message_kind(message))
            .collect()
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.connects.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }
}

/// Wire-level kind of an outbound message.
pub fn message_kind(message: &Outbound) -> &'static str {
    match message {
        Outbound::Register { .. } => "register",
        Outbound::Heartbeat { .. } => "heartbeat",
        Outbound::Pong { .. } => "pong",
    }
}

/// Scripted connector. Once the script is exhausted, further attempts are
/// accepted with an empty receive script (a quiet but healthy coordinator).
pub struct StubConnector {
    outcomes: VecDeque<ConnectOutcome>,
    probe: SessionProbe,
    accepted: usize,
}

impl StubConnector {
    pub fn new(outcomes: Vec<ConnectOutcome>) -> (Self, SessionProbe) {
        let probe = SessionProbe::default();
        (
            Self {
                outcomes: outcomes.into(),
                probe: probe.clone(),
                accepted: 0,
            },
            probe,
        )
    }
}

#[async_trait]
impl Connector for StubConnector {
    async fn connect(&mut self) -> Result<Box<dyn Transport>, TransportError> {
        self.probe.connects.lock().unwrap().push(Instant::now());

        let outcome = self
            .outcomes
            .pop_front()
            .unwrap_or(ConnectOutcome::Accept(StubConnection::new(Vec::new())));

        match outcome {
            ConnectOutcome::Refuse => {
                debug!("stub refusing connect attempt");
                Err(TransportError::Connect("scripted refusal".to_string()))
            }
            ConnectOutcome::Accept(connection) => {
                let index = self.accepted;
                self.accepted += 1;
                debug!(connection = index, "stub accepting connect attempt");
                Ok(Box::new(StubTransport {
                    events: connection.events.into(),
                    max_sends: connection.max_sends,
                    sends: 0,
                    connection: index,
                    probe: self.probe.clone(),
                }))
            }
        }
    }
}

struct StubTransport {
    events: VecDeque<ScriptedEvent>,
    max_sends: Option<usize>,
    sends: usize,
    connection: usize,
    probe: SessionProbe,
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&mut self, message: &Outbound) -> Result<(), TransportError> {
        if let Some(limit) = self.max_sends {
            if self.sends >= limit {
                return Err(TransportError::Closed);
            }
        }
        self.sends += 1;
        self.probe
            .sent
            .lock()
            .unwrap()
            .push((self.connection, message.clone()));
        Ok(())
    }

    async fn receive(&mut self, wait: Duration) -> Result<Option<Inbound>, TransportError> {
        match self.events.pop_front() {
            Some(ScriptedEvent::Incoming(message)) => Ok(Some(message)),
            Some(ScriptedEvent::Silence) | None => {
                sleep(wait).await;
                Ok(None)
            }
            Some(ScriptedEvent::Disconnect) => Err(TransportError::Closed),
        }
    }

    async fn close(&mut self) {}
}
