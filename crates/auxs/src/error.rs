use thiserror::Error;

/// Errors that can occur while running the broker.
#[derive(Error, Debug)]
pub enum AuxsError {
    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
