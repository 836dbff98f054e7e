//! Websocket upgrade requests.
//!
//! The websocket engine stays outside of this crate: it plugs in through a
//! [`WebSocketAdapter`], and the gateway sees the upgrade as a [`Request`](crate::protocol::Request)
//! with the [`WEBSOCKET`] method and a [`WebSocketChannel`] in its environment. Handlers
//! accept or reject the connection through a [`WebSocketRequest`].

mod adapter;
mod error;
mod request;

pub use adapter::{AcceptConnection, Event, Message, WebSocketAdapter};
#[cfg(test)]
pub use adapter::MockWebSocketAdapter;
pub use error::WebSocketError;
pub use request::{Messages, WEBSOCKET, WebSocket, WebSocketChannel, WebSocketRequest};
