use auxs::config::ServerConfig;
use auxs::ServerState;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        max_conns: 1000,
        rate_limit_max: 60,
        rate_limit_window_secs: 10,
        invite_timeout_secs: 20,
        sweep_interval_secs: 60,
        ping_interval: 30,
        idle_timeout: 120,
        max_frame_bytes: 65536,
    }
}

pub async fn start_server() -> (SocketAddr, Arc<ServerState>) {
    start_server_with(|_| {}).await
}

pub async fn start_server_with(
    tweak: impl FnOnce(&mut ServerConfig),
) -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = test_config(addr);
    tweak(&mut config);
    let state = Arc::new(ServerState::new(config));

    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = auxs::run(listener, state_clone).await {
            eprintln!("server error in test: {e}");
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, state)
}

pub struct TestClient {
    pub ws_tx: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        Message,
    >,
    pub ws_rx: futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    >,
}

impl TestClient {
    pub async fn connect(addr: &SocketAddr) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        let (ws_tx, ws_rx) = ws.split();
        Self { ws_tx, ws_rx }
    }

    pub async fn send(&mut self, value: Value) {
        self.ws_tx
            .send(Message::Text(value.to_string()))
            .await
            .unwrap();
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws_tx
            .send(Message::Text(text.to_string()))
            .await
            .unwrap();
    }

    /// Register and wait for the `registered` acknowledgment.
    pub async fn register(
        &mut self,
        room: &str,
        client: &str,
        display_name: Option<&str>,
        role: Option<&str>,
    ) -> Value {
        let mut msg = json!({"type": "register", "roomId": room, "clientId": client});
        if let Some(name) = display_name {
            msg["displayName"] = json!(name);
        }
        if let Some(role) = role {
            msg["role"] = json!(role);
        }
        self.send(msg).await;
        self.expect("registered").await
    }

    /// Next protocol frame, skipping transport keepalives.
    pub async fn recv(&mut self) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.ws_rx.next())
                .await
                .expect("timeout waiting for frame")
                .expect("stream ended")
                .expect("websocket error");
            match msg {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => {}
                other => panic!("expected text frame, got {other:?}"),
            }
        }
    }

    /// Skip frames until one of the given type arrives.
    pub async fn expect(&mut self, frame_type: &str) -> Value {
        loop {
            let frame = self.recv().await;
            if frame["type"] == frame_type {
                return frame;
            }
        }
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Value> {
        tokio::time::timeout(timeout, self.recv()).await.ok()
    }

    /// Next raw WebSocket event, if any; `None` once the stream ends.
    pub async fn recv_raw(&mut self) -> Option<Message> {
        match tokio::time::timeout(Duration::from_secs(5), self.ws_rx.next()).await {
            Ok(Some(Ok(msg))) => Some(msg),
            Ok(Some(Err(_))) | Ok(None) => None,
            Err(_) => panic!("timeout waiting for raw frame"),
        }
    }
}
