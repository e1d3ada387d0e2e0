use crate::session::SessionState;
use shared::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("transport has been closed")]
    Closed,
    #[error("failed to encode frame: {0}")]
    Encode(#[from] ProtocolError),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Local precondition failures; raised before anything is sent.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not connected to a server")]
    NotConnected,
    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },
    #[error("only the host can start the game")]
    NotHost,
    #[error("room name is required")]
    EmptyRoomName,
    #[error(transparent)]
    Transport(#[from] TransportError),
}
