//! End-to-end relay tests using real WebSocket clients against a live server.

use std::time::Duration;

use clap::Parser;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use service::config::Config;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use web::AppState;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Boot a server on an ephemeral port and return the socket URL plus the shared state.
async fn boot_server() -> (String, AppState) {
    let config = Config::try_parse_from(["relay_hub", "--connected-message", "hello"]).unwrap();
    let state = AppState::new(config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_state = state.clone();
    tokio::spawn(async move {
        web::serve(listener, server_state, std::future::pending())
            .await
            .unwrap();
    });

    (format!("ws://{addr}/api/socket"), state)
}

async fn connect(url: &str) -> WsStream {
    let (ws, _response) = timeout(TIMEOUT, connect_async(url))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        let frame = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for envelope")
            .expect("stream ended")
            .expect("transport error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn assert_silent(ws: &mut WsStream) {
    if let Ok(Some(Ok(Message::Text(text)))) =
        timeout(Duration::from_millis(200), ws.next()).await
    {
        panic!("unexpected envelope: {}", text.as_str());
    }
}

async fn wait_for_count(state: &AppState, expected: usize) {
    timeout(TIMEOUT, async {
        while state.hub.connection_count() != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never reached expected size");
}

#[tokio::test]
async fn two_clients_ack_broadcast_and_disconnect() {
    let (url, state) = boot_server().await;

    let mut c1 = connect(&url).await;
    let greeting1 = recv_json(&mut c1).await;
    assert_eq!(greeting1["type"], "connection");
    assert_eq!(greeting1["message"], "hello");
    let id1 = greeting1["id"].as_str().unwrap().to_string();

    let mut c2 = connect(&url).await;
    let greeting2 = recv_json(&mut c2).await;
    assert_eq!(greeting2["type"], "connection");
    assert_ne!(greeting2["id"], greeting1["id"]);
    wait_for_count(&state, 2).await;

    c1.send(Message::text(r#"{"x":1}"#)).await.unwrap();

    let ack = recv_json(&mut c1).await;
    assert_eq!(ack["type"], "message");
    assert_eq!(ack["data"], json!({"x": 1}));

    let relayed = recv_json(&mut c2).await;
    assert_eq!(relayed["type"], "broadcast");
    assert_eq!(relayed["from"], id1.as_str());
    assert_eq!(relayed["data"], json!({"x": 1}));

    c1.close(None).await.unwrap();
    wait_for_count(&state, 1).await;

    c2.send(Message::text(r#"{"y":2}"#)).await.unwrap();
    let ack = recv_json(&mut c2).await;
    assert_eq!(ack["type"], "message");
    assert_eq!(ack["data"], json!({"y": 2}));
    assert_silent(&mut c2).await;
}

#[tokio::test]
async fn malformed_payload_is_dropped_without_response() {
    let (url, state) = boot_server().await;

    let mut c1 = connect(&url).await;
    let _ = recv_json(&mut c1).await;
    let mut c2 = connect(&url).await;
    let _ = recv_json(&mut c2).await;
    wait_for_count(&state, 2).await;

    c1.send(Message::text("{not json")).await.unwrap();
    c1.send(Message::text(r#""valid""#)).await.unwrap();

    // The first envelope either client sees belongs to the valid payload.
    let ack = recv_json(&mut c1).await;
    assert_eq!(ack["type"], "message");
    assert_eq!(ack["data"], "valid");
    let relayed = recv_json(&mut c2).await;
    assert_eq!(relayed["data"], "valid");

    assert_eq!(state.hub.connection_count(), 2);
}

#[tokio::test]
async fn binary_frames_are_decoded_as_text() {
    let (url, _state) = boot_server().await;

    let mut c1 = connect(&url).await;
    let _ = recv_json(&mut c1).await;

    c1.send(Message::binary(br#"{"bin":true}"#.to_vec()))
        .await
        .unwrap();

    let ack = recv_json(&mut c1).await;
    assert_eq!(ack["type"], "message");
    assert_eq!(ack["data"], json!({"bin": true}));
}

#[tokio::test]
async fn dropped_connection_is_unregistered() {
    let (url, state) = boot_server().await;

    let mut c1 = connect(&url).await;
    let _ = recv_json(&mut c1).await;
    wait_for_count(&state, 1).await;

    drop(c1);

    wait_for_count(&state, 0).await;
}
