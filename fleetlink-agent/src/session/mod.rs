//! Session state machine
//!
//! Owns the coordinator connection: registration, heartbeat streaming,
//! acknowledgment correlation and reconnection with backoff.
//!
//! ```text
//! DISCONNECTED -> CONNECTING -> REGISTERED -> STREAMING
//!       ^             |              |            |
//!       |             +--- failure --+------------+
//!       +------ BACKOFF (sleep reconnect_delay) <-+
//! ```
//!
//! There is no terminal state under normal operation; the loop only exits on
//! the external shutdown signal. Sampling errors never reach this layer (the
//! metric chains absorb them); transport errors always land here and drive
//! exactly one transition, into `BACKOFF`.

pub mod backoff;

use crate::config::SessionSettings;
use crate::error::TransportError;
use crate::identity::DeviceIdentity;
use crate::metrics::SnapshotSource;
use crate::protocol::{Inbound, Outbound};
use crate::transport::{Connector, Transport};
use backoff::Backoff;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Registered,
    Streaming,
    Backoff,
}

/// Operator-facing counters reported when the session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub heartbeats_sent: u64,
    pub last_ack_seq: Option<u64>,
}

/// Why a connection stopped being usable.
enum Interruption {
    TransportLost(TransportError),
    Shutdown,
}

pub struct Session<C: Connector, S: SnapshotSource> {
    identity: DeviceIdentity,
    connector: C,
    sampler: S,
    heartbeat_interval: Duration,
    registration_ack_timeout: Duration,
    state: SessionState,
    backoff: Backoff,
    seq: u64,
    last_ack_seq: Option<u64>,
}

impl<C: Connector, S: SnapshotSource> Session<C, S> {
    pub fn new(
        settings: &SessionSettings,
        identity: DeviceIdentity,
        connector: C,
        sampler: S,
    ) -> Self {
        Self {
            identity,
            connector,
            sampler,
            heartbeat_interval: Duration::from_secs_f64(settings.heartbeat_interval_secs),
            registration_ack_timeout: Duration::from_secs_f64(
                settings.registration_ack_timeout_secs,
            ),
            state: SessionState::Disconnected,
            backoff: Backoff::new(
                Duration::from_secs_f64(settings.backoff_base_secs),
                settings.backoff_factor,
                Duration::from_secs_f64(settings.backoff_max_secs),
            ),
            seq: 0,
            last_ack_seq: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session until the shutdown signal fires.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SessionSummary {
        info!(device_id = %self.identity.device_id, "session starting");

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(SessionState::Connecting);
            match self.connector.connect().await {
                Ok(mut conn) => match self.drive_connection(conn.as_mut(), &mut shutdown).await {
                    Interruption::Shutdown => {
                        conn.close().await;
                        break;
                    }
                    Interruption::TransportLost(err) => {
                        warn!(%err, "coordinator connection lost");
                        conn.close().await;
                    }
                },
                Err(err) => warn!(%err, "could not reach coordinator"),
            }

            self.set_state(SessionState::Backoff);
            let delay = self.backoff.next_delay();
            info!(delay_secs = delay.as_secs_f64(), "reconnecting after backoff");
            tokio::select! {
                _ = sleep(delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        info!("session stopped");
        SessionSummary {
            heartbeats_sent: self.seq,
            last_ack_seq: self.last_ack_seq,
        }
    }

    /// Register, then stream heartbeats until the connection dies or
    /// shutdown begins.
    async fn drive_connection(
        &mut self,
        conn: &mut dyn Transport,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Interruption {
        // Transport is open: the reconnect schedule starts over.
        self.set_state(SessionState::Registered);
        self.backoff.reset();

        let snapshot = self.sampler.sample().await;
        let register = Outbound::Register {
            device_id: self.identity.device_id.clone(),
            platform: self.identity.platform.clone(),
            hostname: self.identity.hostname.clone(),
            cpu_cores: self.identity.cpu_cores,
            version: env!("CARGO_PKG_VERSION").to_string(),
            snapshot,
        };
        if let Err(err) = conn.send(&register).await {
            return Interruption::TransportLost(err);
        }
        info!("register sent");

        let registered_at = Instant::now();
        let mut next_beat = registered_at + self.heartbeat_interval;

        // Best-effort registration ack: its absence is logged, not fatal.
        match self
            .await_window(conn, shutdown, registered_at + self.registration_ack_timeout, true)
            .await
        {
            Ok(true) => debug!("registration acknowledged"),
            Ok(false) => warn!(
                timeout_secs = self.registration_ack_timeout.as_secs_f64(),
                "no registration ack within bound, streaming anyway"
            ),
            Err(interruption) => return interruption,
        }

        self.set_state(SessionState::Streaming);
        loop {
            // Spend the idle part of the cadence listening for the
            // coordinator; acks and pings are handled inside the window.
            if let Err(interruption) = self.await_window(conn, shutdown, next_beat, false).await {
                return interruption;
            }

            if *shutdown.borrow() {
                return Interruption::Shutdown;
            }

            let snapshot = self.sampler.sample().await;
            self.seq += 1;
            let heartbeat = Outbound::Heartbeat {
                device_id: self.identity.device_id.clone(),
                seq: self.seq,
                snapshot,
            };
            if let Err(err) = conn.send(&heartbeat).await {
                return Interruption::TransportLost(err);
            }
            debug!(seq = self.seq, "heartbeat sent");

            next_beat += self.heartbeat_interval;
        }
    }

    /// Wait until `deadline`, reacting to whatever the coordinator sends.
    /// Returns `Ok(true)` as soon as a registration ack arrives if
    /// `until_registration_ack` is set; `Ok(false)` means the window simply
    /// elapsed.
    async fn await_window(
        &mut self,
        conn: &mut dyn Transport,
        shutdown: &mut watch::Receiver<bool>,
        deadline: Instant,
        until_registration_ack: bool,
    ) -> Result<bool, Interruption> {
        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Ok(false);
            };
            if remaining.is_zero() {
                return Ok(false);
            }

            let received = tokio::select! {
                _ = wait_for_shutdown(shutdown) => return Err(Interruption::Shutdown),
                received = conn.receive(remaining) => received,
            };

            match received {
                Ok(Some(Inbound::Ping {})) => {
                    debug!("ping from coordinator");
                    let pong = Outbound::Pong {
                        device_id: self.identity.device_id.clone(),
                    };
                    if let Err(err) = conn.send(&pong).await {
                        return Err(Interruption::TransportLost(err));
                    }
                }
                Ok(Some(Inbound::HeartbeatAck { seq })) => {
                    // Observability only: an ack without a seq is attributed
                    // to the most recent heartbeat.
                    match seq {
                        Some(seq) => self.last_ack_seq = Some(seq),
                        None if self.seq > 0 => self.last_ack_seq = Some(self.seq),
                        None => {}
                    }
                    debug!(last_ack_seq = ?self.last_ack_seq, "heartbeat acknowledged");
                }
                Ok(Some(Inbound::RegistrationAck {})) => {
                    if until_registration_ack {
                        return Ok(true);
                    }
                    debug!("late registration ack ignored");
                }
                Ok(None) => return Ok(false),
                Err(err) => return Err(Interruption::TransportLost(err)),
            }
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "session state change");
            self.state = state;
        }
    }
}

/// Resolves once the shutdown signal fires (or its sender is gone).
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
