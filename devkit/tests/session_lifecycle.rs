//! End-to-end session scenarios against the scripted transport stub.
//!
//! Every test runs under paused tokio time, so the protocol's real 5-second
//! cadence and backoff delays elapse instantly and deterministically.

use fleetlink_agent::config::SessionSettings;
use fleetlink_agent::identity::DeviceIdentity;
use fleetlink_agent::protocol::{Inbound, Outbound};
use fleetlink_agent::session::Session;
use fleetlink_devkit::{ConnectOutcome, FixedSnapshots, ScriptedEvent, SessionProbe, StubConnection, StubConnector};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

fn identity() -> DeviceIdentity {
    DeviceIdentity {
        device_id: "ab12cd34".to_string(),
        platform: "linux".to_string(),
        hostname: "test-device".to_string(),
        cpu_cores: 4,
    }
}

fn spawn_session(
    outcomes: Vec<ConnectOutcome>,
) -> (
    SessionProbe,
    watch::Sender<bool>,
    tokio::task::JoinHandle<fleetlink_agent::session::SessionSummary>,
) {
    let (connector, probe) = StubConnector::new(outcomes);
    let session = Session::new(
        &SessionSettings::default(),
        identity(),
        connector,
        FixedSnapshots::fallback(),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(session.run(shutdown_rx));
    (probe, shutdown_tx, handle)
}

async fn at(seconds: f64) {
    sleep(Duration::from_secs_f64(seconds)).await;
}

fn secs_between(earlier: tokio::time::Instant, later: tokio::time::Instant) -> f64 {
    later.duration_since(earlier).as_secs_f64()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 0.05,
        "expected ~{expected}s, got {actual}s"
    );
}

/// Scenario 1: the first message on a fresh connection is `register`, with
/// the device id and every snapshot field present even when every collector
/// fell back to its default.
#[tokio::test(start_paused = true)]
async fn first_message_is_a_complete_register() {
    let (probe, shutdown, handle) =
        spawn_session(vec![ConnectOutcome::Accept(StubConnection::new(vec![]))]);

    at(0.5).await;
    let sent = probe.sent();
    assert_eq!(sent.len(), 1);

    let Outbound::Register { device_id, cpu_cores, snapshot, .. } = &sent[0] else {
        panic!("first message was not register: {:?}", sent[0]);
    };
    assert_eq!(device_id, "ab12cd34");
    assert_eq!(*cpu_cores, 4);

    // All-defaults snapshot still serializes fully populated.
    let value = serde_json::to_value(&sent[0]).unwrap();
    for field in [
        "cpu_free_percent",
        "ram_free_mb",
        "ram_total_mb",
        "ram_used_percent",
        "battery",
        "storage",
        "network",
        "timestamp",
    ] {
        assert!(!value[field].is_null(), "missing snapshot field {field}");
    }
    assert_eq!(snapshot.cpu_free_percent, 50.0);
    assert_eq!(value["battery"]["percent"], 100);
    assert_eq!(value["storage"]["free_gb"], 64.0);

    shutdown.send(true).unwrap();
    handle.await.unwrap();
}

/// Scenario 2: a missing registration ack is logged, not fatal; the first
/// heartbeat still goes out at the next cadence tick.
#[tokio::test(start_paused = true)]
async fn missing_registration_ack_does_not_block_heartbeats() {
    let (probe, shutdown, handle) =
        spawn_session(vec![ConnectOutcome::Accept(StubConnection::new(vec![]))]);

    at(4.5).await;
    assert_eq!(probe.sent_kinds(), vec!["register"]);

    at(1.0).await; // t = 5.5, one tick past the cadence
    assert_eq!(probe.sent_kinds(), vec!["register", "heartbeat"]);

    let Outbound::Heartbeat { seq, .. } = probe.sent()[1].clone() else {
        panic!("expected heartbeat");
    };
    assert_eq!(seq, 1);

    shutdown.send(true).unwrap();
    handle.await.unwrap();
}

/// Scenario 3: a ping during the streaming wait triggers exactly one pong
/// with the right device id, and the heartbeat cadence is not disturbed.
#[tokio::test(start_paused = true)]
async fn ping_yields_one_pong_without_disturbing_cadence() {
    let (probe, shutdown, handle) = spawn_session(vec![ConnectOutcome::Accept(
        StubConnection::new(vec![
            ScriptedEvent::Incoming(Inbound::RegistrationAck {}),
            ScriptedEvent::Incoming(Inbound::Ping {}),
        ]),
    )]);

    at(1.0).await;
    assert_eq!(probe.sent_kinds(), vec!["register", "pong"]);
    assert_eq!(
        probe.sent()[1],
        Outbound::Pong {
            device_id: "ab12cd34".to_string()
        }
    );

    at(4.5).await; // t = 5.5: heartbeat still lands on the 5s cadence
    assert_eq!(probe.sent_kinds(), vec!["register", "pong", "heartbeat"]);

    at(5.0).await; // t = 10.5: cadence continues, no extra pongs
    let kinds = probe.sent_kinds();
    assert_eq!(kinds.iter().filter(|k| **k == "pong").count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == "heartbeat").count(), 2);

    shutdown.send(true).unwrap();
    handle.await.unwrap();
}

/// Scenario 4: a transport failure while streaming moves the session to
/// backoff; nothing is sent until the delay elapses and a fresh connection
/// attempt registers again.
#[tokio::test(start_paused = true)]
async fn streaming_failure_backs_off_before_reconnecting() {
    let (probe, shutdown, handle) = spawn_session(vec![
        ConnectOutcome::Accept(StubConnection::new(vec![
            ScriptedEvent::Silence,
            ScriptedEvent::Silence,
            ScriptedEvent::Disconnect,
        ])),
        ConnectOutcome::Accept(StubConnection::new(vec![])),
    ]);

    // Heartbeats at t=5 and t=10; the connection drops right after the
    // second one.
    at(12.0).await;
    assert_eq!(probe.sent_kinds(), vec!["register", "heartbeat", "heartbeat"]);
    assert_eq!(probe.connect_count(), 1);

    // Backoff base is 5s: reconnect and re-register at t=15.
    at(3.5).await;
    assert_eq!(probe.connect_count(), 2);
    assert_eq!(
        probe.sent_kinds(),
        vec!["register", "heartbeat", "heartbeat", "register"]
    );
    assert_eq!(probe.sent_on(1).len(), 1);

    shutdown.send(true).unwrap();
    handle.await.unwrap();
}

/// Consecutive connect failures escalate the reconnect delay 5, 7.5, 11.25,
/// ... and a successful registration resets it to the base.
#[tokio::test(start_paused = true)]
async fn reconnect_delays_escalate_then_reset_on_success() {
    let (probe, shutdown, handle) = spawn_session(vec![
        ConnectOutcome::Refuse,
        ConnectOutcome::Refuse,
        ConnectOutcome::Refuse,
        ConnectOutcome::Accept(StubConnection::new(vec![ScriptedEvent::Disconnect])),
    ]);

    // Attempts: t=0, 5, 12.5, 23.75; the accepted one drops immediately,
    // and the reset backoff schedules the next attempt 5s later.
    at(30.0).await;
    let times = probe.connect_times();
    assert!(times.len() >= 5, "only {} attempts", times.len());
    assert_close(secs_between(times[0], times[1]), 5.0);
    assert_close(secs_between(times[1], times[2]), 7.5);
    assert_close(secs_between(times[2], times[3]), 11.25);
    assert_close(secs_between(times[3], times[4]), 5.0);

    shutdown.send(true).unwrap();
    handle.await.unwrap();
}

/// Shutdown mid-stream: the loop exits promptly and no further messages are
/// sent after the signal.
#[tokio::test(start_paused = true)]
async fn shutdown_stops_all_sends() {
    let (probe, shutdown, handle) =
        spawn_session(vec![ConnectOutcome::Accept(StubConnection::new(vec![]))]);

    at(7.0).await; // register at 0, heartbeat at 5
    assert_eq!(probe.sent_kinds(), vec!["register", "heartbeat"]);

    shutdown.send(true).unwrap();
    let summary = handle.await.unwrap();
    assert_eq!(summary.heartbeats_sent, 1);

    at(20.0).await;
    assert_eq!(probe.sent_kinds(), vec!["register", "heartbeat"]);
}

/// A heartbeat ack echoing a sequence number is recorded for observability.
#[tokio::test(start_paused = true)]
async fn heartbeat_ack_sequence_is_recorded() {
    let (_probe, shutdown, handle) = spawn_session(vec![ConnectOutcome::Accept(
        StubConnection::new(vec![
            ScriptedEvent::Silence,
            ScriptedEvent::Incoming(Inbound::HeartbeatAck { seq: Some(1) }),
        ]),
    )]);

    at(6.0).await; // heartbeat 1 at t=5, ack right after
    shutdown.send(true).unwrap();
    let summary = handle.await.unwrap();
    assert_eq!(summary.heartbeats_sent, 1);
    assert_eq!(summary.last_ack_seq, Some(1));
}
