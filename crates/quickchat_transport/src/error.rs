use thiserror::Error;

/// Faults that end a connection. None of them escape the session task; they
/// are logged when the session shuts down.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no frame from peer within the read deadline")]
    ReadTimeout,

    #[error("write did not complete within the write deadline")]
    WriteTimeout,
}
