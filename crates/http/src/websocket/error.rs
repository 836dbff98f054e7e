use std::io;
use thiserror::Error;

/// Errors raised while talking to a websocket through its adapter.
#[derive(Error, Debug)]
pub enum WebSocketError {
    /// The peer went away while the server was still sending or receiving.
    #[error("websocket disconnected code={code}")]
    Disconnected { code: u16 },

    /// Unexpected interaction between the application and the websocket server.
    #[error("websocket protocol error: {reason}")]
    Protocol { reason: String },

    #[error("websocket operation timed out")]
    Timeout,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl WebSocketError {
    /// Close code reported when the peer disconnected without one.
    pub const DEFAULT_DISCONNECT_CODE: u16 = 1005;

    pub fn disconnected(code: Option<u16>) -> Self {
        Self::Disconnected { code: code.unwrap_or(Self::DEFAULT_DISCONNECT_CODE) }
    }

    pub fn protocol<S: ToString>(str: S) -> Self {
        Self::Protocol { reason: str.to_string() }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }
}
