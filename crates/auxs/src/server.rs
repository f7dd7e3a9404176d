use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::error::AuxsError;
use crate::ledger::InviteLedger;
use crate::metrics::{counters, gauges};
use crate::registry::{ConnId, Registry};
use crate::router;
use aux_common::messages::ServerMessage;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

/// Handle held in the connection table — used to queue frames to a session.
#[derive(Clone, Debug)]
pub struct ConnHandle {
    /// Channel sender feeding the connection's single write loop.
    pub tx: mpsc::Sender<Message>,
}

/// Outcome of queueing an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frame was queued for delivery.
    Queued,
    /// The connection is open but its queue was full; the frame was dropped.
    Dropped,
    /// No open connection exists for the target.
    Unreachable,
}

/// Shared state for the signaling broker.
pub struct ServerState {
    /// Runtime server configuration.
    pub config: ServerConfig,
    /// Source of truth for rooms, members, and roles.
    pub registry: Registry,
    /// Pending invites with deadlines.
    pub ledger: InviteLedger,
    /// Live connections by id.
    pub conns: DashMap<ConnId, ConnHandle>,
    /// Connections currently being served, for the accept-loop cap.
    pub active_connections: AtomicUsize,
    next_conn_id: AtomicU64,
}

impl ServerState {
    /// Create fresh broker state for the given configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Registry::new(),
            ledger: InviteLedger::new(),
            conns: DashMap::new(),
            active_connections: AtomicUsize::new(0),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Allocate a process-unique connection id.
    pub fn alloc_conn_id(&self) -> ConnId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue one message to a connection without blocking. A full queue
    /// drops the frame so a slow peer cannot stall unrelated sessions.
    pub fn send_to(&self, conn: ConnId, msg: &ServerMessage) -> Delivery {
        let Some(handle) = self.conns.get(&conn).map(|entry| entry.value().clone()) else {
            return Delivery::Unreachable;
        };
        let text = match serde_json::to_string(msg) {
            Ok(text) => text,
            Err(e) => {
                error!("failed to encode outbound frame: {}", e);
                return Delivery::Dropped;
            }
        };
        match handle.tx.try_send(Message::Text(text)) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                counters::frames_dropped_total("backpressure");
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Unreachable,
        }
    }

    /// Queue an `error` frame to a connection.
    pub fn send_error(&self, conn: ConnId, message: &str) {
        counters::errors_sent_total();
        let _ = self.send_to(
            conn,
            &ServerMessage::Error {
                message: message.to_string(),
            },
        );
    }

    /// Ask a connection's session to close after draining queued frames.
    pub fn close_conn(&self, conn: ConnId) {
        if let Some(handle) = self.conns.get(&conn).map(|entry| entry.value().clone()) {
            let _ = handle.tx.try_send(Message::Close(None));
        }
    }

    fn close_all(&self) {
        for entry in self.conns.iter() {
            let _ = entry.value().tx.try_send(Message::Close(None));
        }
    }
}

/// Serve until the accept loop fails.
///
/// # Errors
///
/// Returns an error if the accept loop encounters an I/O failure.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<(), AuxsError> {
    run_with_shutdown(listener, state, std::future::pending::<()>()).await
}

/// Serve until `shutdown` resolves, then close every connection and stop
/// all invite timers before returning.
///
/// # Errors
///
/// Returns an error if the accept loop encounters an I/O failure.
pub async fn run_with_shutdown(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), AuxsError> {
    let local_addr = listener.local_addr().map_err(AuxsError::Io)?;
    info!("broker listening on {}", local_addr);

    let sweeper = tokio::spawn(sweep_loop(Arc::clone(&state)));

    let result = tokio::select! {
        result = accept_loop(listener, Arc::clone(&state)) => result,
        () = shutdown => {
            info!("shutting down");
            Ok(())
        }
    };

    sweeper.abort();
    state.close_all();
    state.ledger.shutdown();
    result
}

async fn accept_loop(listener: TcpListener, state: Arc<ServerState>) -> Result<(), AuxsError> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if state.active_connections.load(Ordering::Relaxed) >= state.config.max_conns {
                    warn!("max connections reached, rejecting {}", addr);
                    drop(stream);
                    continue;
                }

                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, addr, state).await {
                        tracing::debug!("connection from {} closed: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}

/// Fallback expiry path: per-invite deadline tasks are primary, the sweep
/// catches records whose timer was lost.
async fn sweep_loop(state: Arc<ServerState>) {
    let mut tick =
        tokio::time::interval(Duration::from_secs(state.config.sweep_interval_secs));
    tick.tick().await;
    loop {
        tick.tick().await;
        for invite in state.ledger.sweep_expired(Instant::now()) {
            tracing::debug!(invite_id = %invite.id, "sweep removed expired invite");
            router::notify_invite_expired(&state, &invite);
        }
        gauges::set_invites_pending(state.ledger.len());
        gauges::set_rooms_active(state.registry.room_count());
    }
}
