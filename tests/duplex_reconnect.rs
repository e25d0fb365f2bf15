use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use formpilot_lib::remote::{DuplexChannel, InboundMessage, OutboundMessage};

const DELAY: Duration = Duration::from_millis(300);
const WAIT: Duration = Duration::from_secs(5);

async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !check() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn closed_channel_reconnects_once_after_delay() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = url::Url::parse(&format!("ws://{}/ws", listener.local_addr().unwrap())).unwrap();
    let (channel, mut inbound) = DuplexChannel::spawn(url, DELAY);

    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut server = tokio_tungstenite::accept_async(stream).await.unwrap();
    wait_until(|| channel.is_connected()).await;

    // Both directions work on the live socket.
    assert!(channel.send(OutboundMessage::FieldFilled {
        field_name: "#email".into(),
        value: "ada@example.com".into(),
    }));
    let frame = timeout(WAIT, server.next()).await.unwrap().unwrap().unwrap();
    let text = match frame {
        Message::Text(text) => text,
        other => panic!("expected a text frame, got {other:?}"),
    };
    let sent: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(sent["action"], "field_filled");

    server
        .send(Message::Text(r##"{"type":"ack","field":"#email","status":"success"}"##.to_string().into()))
        .await
        .unwrap();
    let ack = timeout(WAIT, inbound.recv()).await.unwrap().unwrap();
    assert!(matches!(ack, InboundMessage::Ack { .. }));

    // Drop the connection from the server side.
    let closed_at = Instant::now();
    server.close(None).await.unwrap();
    drop(server);
    wait_until(|| !channel.is_connected()).await;
    assert!(!channel.send(OutboundMessage::Error {
        error: "lost".into(),
        field: serde_json::Value::Null,
    }));

    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    assert!(closed_at.elapsed() >= DELAY);
    let _second = tokio_tungstenite::accept_async(stream).await.unwrap();
    wait_until(|| channel.is_connected()).await;

    // One reconnect, and nothing else dials in while the second socket lives.
    assert!(timeout(DELAY * 3, listener.accept()).await.is_err());
    assert_eq!(channel.connection_attempts(), 2);
}

#[tokio::test]
async fn unreachable_service_keeps_retrying_on_the_flat_delay() {
    // Bind then drop to get a port nothing listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let url = url::Url::parse(&format!("ws://{addr}/ws")).unwrap();
    let (channel, _inbound) = DuplexChannel::spawn(url, Duration::from_millis(100));

    wait_until(|| channel.connection_attempts() >= 3).await;
    assert!(!channel.is_connected());
}
