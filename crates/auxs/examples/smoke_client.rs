//! Minimal interactive smoke client: registers a host and a listener in one
//! room, runs the invite handshake, and relays one signal payload.
//!
//! Start a broker (`cargo run --bin auxs`), then:
//! `cargo run --example smoke_client -- ws://127.0.0.1:8080`

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

#[tokio::main]
async fn main() {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8080".to_string());

    let (host_ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("connect host");
    let (mut host_tx, mut host_rx) = host_ws.split();
    let (peer_ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("connect peer");
    let (mut peer_tx, mut peer_rx) = peer_ws.split();

    send(&mut host_tx, json!({"type": "register", "roomId": "SMOKE1", "clientId": "host", "role": "host"})).await;
    println!("host: {}", recv(&mut host_rx).await);
    send(&mut peer_tx, json!({"type": "register", "roomId": "SMOKE1", "clientId": "peer"})).await;
    println!("peer: {}", recv(&mut peer_rx).await);

    send(&mut host_tx, json!({"type": "invite", "roomId": "SMOKE1", "from": "host", "to": "peer"})).await;
    let invite = recv(&mut peer_rx).await;
    println!("peer: {invite}");
    send(
        &mut peer_tx,
        json!({
            "type": "invite-response", "roomId": "SMOKE1", "from": "peer", "to": "host",
            "accepted": true, "inviteId": invite["inviteId"],
        }),
    )
    .await;
    println!("host: {}", recv(&mut host_rx).await);

    send(
        &mut peer_tx,
        json!({"type": "signal", "roomId": "SMOKE1", "from": "peer", "to": "host", "payload": {"kind": "offer", "sdp": "v=0"}}),
    )
    .await;
    loop {
        let frame = recv(&mut host_rx).await;
        println!("host: {frame}");
        if frame["type"] == "signal" {
            break;
        }
    }
    println!("✓ smoke flow complete");
}

async fn send<S>(tx: &mut S, value: Value)
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Debug,
{
    tx.send(Message::Text(value.to_string())).await.expect("send");
}

async fn recv<R>(rx: &mut R) -> Value
where
    R: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match rx.next().await.expect("stream ended").expect("recv") {
            Message::Text(text) => return serde_json::from_str(&text).expect("json"),
            _ => continue,
        }
    }
}
