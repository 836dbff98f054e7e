//! The narrow interface between websocket requests and the engine that owns the socket.
//!
//! The engine performs the handshake and the framing; the application only sees the events
//! and messages defined here.

use crate::websocket::WebSocketError;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Bytes> for Message {
    fn from(value: Bytes) -> Self {
        Self::Binary(value)
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(value))
    }
}

/// What the engine reports on [`WebSocketAdapter::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The client asked to open the connection, the first event of every websocket.
    CreateConnection,
    Message(Message),
}

/// Parameters of the upgrade response.
#[derive(Debug, Clone, Default)]
pub struct AcceptConnection {
    pub subprotocol: Option<String>,
    pub extensions: Vec<String>,
    pub extra_headers: HeaderMap,
}

/// Implemented by websocket engines.
///
/// Every call may block up to `timeout` (forever if `None`) and then fails with
/// [`WebSocketError::Timeout`]. A peer that went away surfaces as
/// [`WebSocketError::Disconnected`]. Closing an already closed connection is a no-op.
#[cfg_attr(test, mockall::automock)]
pub trait WebSocketAdapter: Send + Sync {
    fn receive(&self, timeout: Option<Duration>) -> Result<Event, WebSocketError>;

    fn send(&self, message: Message, timeout: Option<Duration>) -> Result<(), WebSocketError>;

    fn accept(&self, accept: AcceptConnection, timeout: Option<Duration>) -> Result<(), WebSocketError>;

    /// Answers the upgrade request with a plain http response and closes the connection.
    fn reject(
        &self,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        timeout: Option<Duration>,
    ) -> Result<(), WebSocketError>;

    fn close(&self, code: u16, reason: Option<String>, timeout: Option<Duration>) -> Result<(), WebSocketError>;
}
