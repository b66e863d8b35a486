//! Live round-trip for the WebSocket transport adapter against an
//! in-process tokio-tungstenite server.

use fleetlink_agent::metrics::fallback_snapshot;
use fleetlink_agent::protocol::{Inbound, Outbound};
use fleetlink_agent::transport::{Connector, WsConnector};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn ws_transport_round_trips_protocol_messages() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        // The agent's register arrives as a tagged JSON text frame.
        let frame = ws.next().await.unwrap().unwrap();
        let text = frame.into_text().unwrap();
        assert!(text.contains("\"type\":\"register\""));
        assert!(text.contains("\"device_id\":\"ab12cd34\""));

        // Ack it, then exercise the unknown-payload and ping paths.
        ws.send(Message::Text(r#"{"type":"registration_ack"}"#.to_string()))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"type":"rebalance","shard":3}"#.to_string()))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"type":"ping"}"#.to_string()))
            .await
            .unwrap();

        // Drain until the client closes.
        while let Some(Ok(frame)) = ws.next().await {
            if matches!(frame, Message::Close(_)) {
                break;
            }
        }
    });

    let mut connector = WsConnector::new(format!("ws://{addr}")).unwrap();
    let mut transport = connector.connect().await.unwrap();

    let register = Outbound::Register {
        device_id: "ab12cd34".to_string(),
        platform: "linux".to_string(),
        hostname: "test-device".to_string(),
        cpu_cores: 4,
        version: "1.0.0".to_string(),
        snapshot: fallback_snapshot(),
    };
    transport.send(&register).await.unwrap();

    let first = transport.receive(Duration::from_secs(2)).await.unwrap();
    assert_eq!(first, Some(Inbound::RegistrationAck {}));

    // The unknown "rebalance" payload is skipped inside the same wait.
    let second = transport.receive(Duration::from_secs(2)).await.unwrap();
    assert_eq!(second, Some(Inbound::Ping {}));

    // Nothing further: the wait times out without an error.
    let third = transport
        .receive(Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(third, None);

    transport.close().await;
    server.await.unwrap();
}
