use crate::error::AuxsError;
use crate::metrics::{counters, gauges};
use crate::ratelimit::RateLimiter;
use crate::registry::ConnId;
use crate::router;
use crate::server::ServerState;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsRecv = SplitStream<WebSocketStream<TcpStream>>;

/// Hard cap on a single WebSocket message; the per-frame protocol limit in
/// `ServerConfig::max_frame_bytes` is enforced separately with an `error`
/// reply instead of a connection teardown.
const MAX_WS_MESSAGE: usize = 1_048_576;

/// Outbound frames queued per connection before drops kick in.
const OUTBOUND_QUEUE: usize = 256;

/// Room/client pair a session is bound to after a successful `register`.
#[derive(Debug, Clone)]
pub(crate) struct BoundMember {
    pub room_id: String,
    pub client_id: String,
}

/// Per-connection state: the connection id and, once registered, the
/// member identity this session speaks for.
#[derive(Debug)]
pub(crate) struct Session {
    pub conn: ConnId,
    pub member: Option<BoundMember>,
}

pub(crate) async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), AuxsError> {
    // The listener only speaks WebSocket, but liveness probes arrive as
    // plain HTTP on the same port. Peek without consuming and answer those
    // before attempting the upgrade.
    {
        let mut peek_buf = [0u8; 1024];
        if let Ok(n) = stream.peek(&mut peek_buf).await {
            if let Ok(preview) = std::str::from_utf8(&peek_buf[..n]) {
                let is_http = preview.starts_with("GET ")
                    || preview.starts_with("HEAD ")
                    || preview.starts_with("POST ");
                if is_http && !preview.to_ascii_lowercase().contains("upgrade: websocket") {
                    return serve_http_probe(stream, preview).await;
                }
            }
        }
    }

    let ws_config = WebSocketConfig {
        max_message_size: Some(MAX_WS_MESSAGE),
        max_frame_size: Some(MAX_WS_MESSAGE),
        ..WebSocketConfig::default()
    };

    let ws_stream = tokio_tungstenite::accept_async_with_config(stream, Some(ws_config))
        .await
        .map_err(AuxsError::WebSocket)?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let conn_id = state.alloc_conn_id();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
    state
        .conns
        .insert(conn_id, crate::server::ConnHandle { tx: outbound_tx });

    state.active_connections.fetch_add(1, Ordering::Relaxed);
    gauges::inc_connections_active();
    tracing::debug!(conn = conn_id, peer = %peer_addr, "connection open");

    let mut session = Session {
        conn: conn_id,
        member: None,
    };

    let result = run_session(
        &mut ws_tx,
        &mut ws_rx,
        &mut outbound_rx,
        &state,
        &mut session,
    )
    .await;

    state.conns.remove(&conn_id);
    state.active_connections.fetch_sub(1, Ordering::Relaxed);
    gauges::dec_connections_active();

    if let Some(bound) = session.member.take() {
        router::handle_disconnect(&state, &bound.room_id, &bound.client_id, conn_id);
    }

    result
}

/// Drive one session: frames from the socket are processed in arrival
/// order and to completion; queued outbound frames and keepalives are
/// interleaved between them.
async fn run_session(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsRecv,
    outbound_rx: &mut mpsc::Receiver<Message>,
    state: &Arc<ServerState>,
    session: &mut Session,
) -> Result<(), AuxsError> {
    let mut limiter = RateLimiter::new(
        state.config.rate_limit_max,
        Duration::from_secs(state.config.rate_limit_window_secs),
    );
    let mut ping_interval = interval(Duration::from_secs(state.config.ping_interval));
    let idle_timeout = Duration::from_secs(state.config.idle_timeout);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        process_frame(state, session, &mut limiter, &text);
                    }
                    Some(Ok(Message::Binary(data))) => {
                        // Some clients send text frames as binary; anything
                        // that is not UTF-8 cannot be JSON either way.
                        match String::from_utf8(data) {
                            Ok(text) => process_frame(state, session, &mut limiter, &text),
                            Err(_) => state.send_error(session.conn, "Invalid JSON"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            tracing::debug!("failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(AuxsError::WebSocket(e)),
                    _ => {}
                }
            }
            Some(out) = outbound_rx.recv() => {
                if let Message::Close(_) = out {
                    let _ = ws_tx.send(out).await;
                    return Ok(());
                }
                counters::frames_total("out");
                ws_tx.send(out).await.map_err(AuxsError::WebSocket)?;
            }
            _ = ping_interval.tick() => {
                if last_activity.elapsed() >= idle_timeout {
                    tracing::debug!("idle timeout reached, closing connection");
                    return Ok(());
                }
                if let Err(e) = ws_tx.send(Message::Ping(Vec::new())).await {
                    tracing::debug!("failed to send ping: {}", e);
                }
            }
        }
    }
}

/// Admission control and codec hand-off for one inbound protocol frame.
fn process_frame(
    state: &Arc<ServerState>,
    session: &mut Session,
    limiter: &mut RateLimiter,
    text: &str,
) {
    counters::frames_total("in");
    if !limiter.check_and_record() {
        counters::frames_dropped_total("rate_limit");
        state.send_error(session.conn, "Rate limit exceeded, slow down");
        return;
    }
    if text.len() > state.config.max_frame_bytes {
        counters::frames_dropped_total("oversize");
        state.send_error(session.conn, "Message too large");
        return;
    }
    router::dispatch(state, session, text);
}

/// Answer a plain-HTTP probe on the signaling port. `/health` is the
/// documented liveness path; everything else is a dead end.
async fn serve_http_probe(mut stream: TcpStream, preview: &str) -> Result<(), AuxsError> {
    let path = preview.split_whitespace().nth(1).unwrap_or("/");
    let response: &[u8] = if path == "/health" {
        b"HTTP/1.1 200 OK\r\n\
          Content-Type: application/json\r\n\
          Content-Length: 15\r\n\
          Connection: close\r\n\
          \r\n\
          {\"status\":\"ok\"}"
    } else {
        b"HTTP/1.1 404 Not Found\r\n\
          Content-Length: 0\r\n\
          Connection: close\r\n\
          \r\n"
    };
    stream.write_all(response).await.map_err(AuxsError::Io)?;
    stream.shutdown().await.map_err(AuxsError::Io)?;
    Ok(())
}
