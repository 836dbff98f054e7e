use crate::ensure;
use crate::protocol::{Request, Response};
use crate::websocket::{AcceptConnection, Event, Message, WebSocketAdapter, WebSocketError};
use http::Method;
use once_cell::sync::Lazy;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tracing::debug;

/// The artificial method of websocket upgrade requests, usable in route method lists.
pub static WEBSOCKET: Lazy<Method> = Lazy::new(|| Method::from_bytes(b"WEBSOCKET").expect("WEBSOCKET is a valid method token"));

const NORMAL_CLOSURE: u16 = 1000;
const UNSUPPORTED_DATA: u16 = 1003;

const PENDING: u8 = 0;
const HANDSHAKING: u8 = 1;
const UPGRADED: u8 = 2;
const REJECTED: u8 = 3;

/// One of `PENDING`, `HANDSHAKING`, `UPGRADED` or `REJECTED`.
#[derive(Debug, Default)]
struct HandshakeState(AtomicU8);

impl HandshakeState {
    fn get(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, phase: u8) {
        self.0.store(phase, Ordering::Release);
    }
}

/// The websocket capability of an upgrade request, stored in the request environment.
///
/// Clones share the handshake state, so the gateway can tell whether a handler accepted or
/// rejected the upgrade.
#[derive(Clone)]
pub struct WebSocketChannel {
    adapter: Arc<dyn WebSocketAdapter>,
    state: Arc<HandshakeState>,
}

impl WebSocketChannel {
    pub fn new(adapter: Arc<dyn WebSocketAdapter>) -> Self {
        Self { adapter, state: Arc::default() }
    }

    pub fn adapter(&self) -> &dyn WebSocketAdapter {
        self.adapter.as_ref()
    }

    pub fn is_upgraded(&self) -> bool {
        self.state.get() == UPGRADED
    }

    pub fn is_rejected(&self) -> bool {
        self.state.get() == REJECTED
    }

    /// Moves a pending handshake to `HANDSHAKING`. Only one caller wins.
    fn claim(&self) -> Result<(), WebSocketError> {
        let Err(phase) = self.state.0.compare_exchange(PENDING, HANDSHAKING, Ordering::AcqRel, Ordering::Acquire) else {
            return Ok(());
        };
        ensure!(phase != UPGRADED, WebSocketError::protocol("websocket connection already upgraded"));
        ensure!(phase != REJECTED, WebSocketError::protocol("websocket connection already rejected"));
        Err(WebSocketError::protocol("websocket handshake already in progress"))
    }

    /// Ends a claimed handshake in `phase` on success, back in `PENDING` on failure.
    fn settle<T>(&self, result: Result<T, WebSocketError>, phase: u8) -> Result<T, WebSocketError> {
        self.state.set(if result.is_ok() { phase } else { PENDING });
        result
    }

    /// Performs the upgrade handshake: waits for the connection request, then accepts it.
    ///
    /// Any other first event closes the connection and fails with a protocol error.
    pub fn accept(&self, accept: AcceptConnection, timeout: Option<Duration>) -> Result<WebSocket, WebSocketError> {
        self.claim()?;
        let result = self.handshake(accept, timeout);
        self.settle(result, UPGRADED)
    }

    fn handshake(&self, accept: AcceptConnection, timeout: Option<Duration>) -> Result<WebSocket, WebSocketError> {
        match self.adapter.receive(timeout)? {
            Event::CreateConnection => {
                self.adapter.accept(accept, timeout)?;
                Ok(WebSocket { channel: self.clone() })
            }
            Event::Message(_) => {
                let reason = "unexpected event Message";
                self.adapter.close(UNSUPPORTED_DATA, Some(reason.to_owned()), None)?;
                Err(WebSocketError::protocol(reason))
            }
        }
    }

    /// Refuses the upgrade and answers with `response` instead.
    pub fn reject(&self, response: Response) -> Result<(), WebSocketError> {
        self.claim()?;

        let (response, _on_close) = response.into_http();
        let (parts, body) = response.into_parts();
        let result = body
            .into_bytes()
            .map_err(WebSocketError::from)
            .and_then(|body| self.adapter.reject(parts.status, parts.headers, body, None));
        self.settle(result, REJECTED)
    }

    /// Closes a connection whose handshake is still pending, does nothing otherwise.
    pub fn close(&self) -> Result<(), WebSocketError> {
        if self.state.get() != PENDING {
            return Ok(());
        }
        self.adapter.close(NORMAL_CLOSURE, None, None)
    }
}

impl fmt::Debug for WebSocketChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketChannel").field("state", &self.state).finish_non_exhaustive()
    }
}

impl Request {
    /// Creates the request representing a websocket upgrade.
    ///
    /// The method of `head` is replaced with [`WEBSOCKET`] so routes can target upgrades.
    pub fn websocket(head: http::Request<()>, adapter: Arc<dyn WebSocketAdapter>) -> Self {
        let mut request = Request::from(head);
        request.set_method(WEBSOCKET.clone());
        request.environment_mut().insert(WebSocketChannel::new(adapter));
        request
    }

    pub fn websocket_channel(&self) -> Option<&WebSocketChannel> {
        self.environment().get::<WebSocketChannel>()
    }
}

/// A view on an upgrade request that can accept or reject the connection.
#[derive(Debug)]
pub struct WebSocketRequest<'a> {
    request: &'a Request,
    channel: WebSocketChannel,
}

impl<'a> WebSocketRequest<'a> {
    pub fn from_request(request: &'a Request) -> Result<Self, WebSocketError> {
        let channel = request
            .websocket_channel()
            .cloned()
            .ok_or_else(|| WebSocketError::protocol("request carries no websocket channel"))?;
        Ok(Self { request, channel })
    }

    pub fn request(&self) -> &'a Request {
        self.request
    }

    pub fn is_upgraded(&self) -> bool {
        self.channel.is_upgraded()
    }

    pub fn is_rejected(&self) -> bool {
        self.channel.is_rejected()
    }

    pub fn accept(&self) -> Result<WebSocket, WebSocketError> {
        self.channel.accept(AcceptConnection::default(), None)
    }

    pub fn accept_with(&self, accept: AcceptConnection, timeout: Option<Duration>) -> Result<WebSocket, WebSocketError> {
        self.channel.accept(accept, timeout)
    }

    pub fn reject(&self, response: Response) -> Result<(), WebSocketError> {
        self.channel.reject(response)
    }

    pub fn close(&self) -> Result<(), WebSocketError> {
        self.channel.close()
    }
}

impl Deref for WebSocketRequest<'_> {
    type Target = Request;

    fn deref(&self) -> &Self::Target {
        self.request
    }
}

/// An accepted websocket connection.
#[derive(Debug)]
pub struct WebSocket {
    channel: WebSocketChannel,
}

impl WebSocket {
    pub fn send<M: Into<Message>>(&self, message: M, timeout: Option<Duration>) -> Result<(), WebSocketError> {
        self.channel.adapter.send(message.into(), timeout)
    }

    /// Waits for the next message.
    pub fn receive(&self, timeout: Option<Duration>) -> Result<Message, WebSocketError> {
        match self.channel.adapter.receive(timeout)? {
            Event::Message(message) => Ok(message),
            Event::CreateConnection => Err(WebSocketError::protocol("unexpected websocket event CreateConnection")),
        }
    }

    pub fn close(&self, code: u16, reason: Option<&str>) -> Result<(), WebSocketError> {
        self.channel.adapter.close(code, reason.map(str::to_owned), None)
    }

    /// Iterates over incoming messages until the peer disconnects.
    ///
    /// Any other error is yielded once and ends the iteration.
    pub fn messages(&self) -> Messages<'_> {
        Messages { socket: self, done: false }
    }
}

#[derive(Debug)]
pub struct Messages<'a> {
    socket: &'a WebSocket,
    done: bool,
}

impl Iterator for Messages<'_> {
    type Item = Result<Message, WebSocketError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.socket.receive(None) {
            Ok(message) => Some(Ok(message)),
            Err(WebSocketError::Disconnected { code }) => {
                debug!(code, "websocket disconnected");
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::MockWebSocketAdapter;
    use bytes::Bytes;
    use http::StatusCode;
    use http::header::HOST;
    use mockall::Sequence;
    use mockall::predicate::eq;

    fn upgrade_request(adapter: MockWebSocketAdapter) -> Request {
        let head = http::Request::get("/ws/echo").header(HOST, "localhost").body(()).unwrap();
        Request::websocket(head, Arc::new(adapter))
    }

    #[test]
    fn websocket_method() {
        let request = upgrade_request(MockWebSocketAdapter::new());
        assert_eq!(request.method().as_str(), "WEBSOCKET");
        assert_eq!(request.path(), "/ws/echo");
        assert!(request.websocket_channel().is_some());
    }

    #[test]
    fn plain_request_is_not_a_websocket() {
        let request = Request::from(http::Request::get("/").body(()).unwrap());
        assert!(matches!(WebSocketRequest::from_request(&request), Err(WebSocketError::Protocol { .. })));
    }

    #[test]
    fn accept_then_echo_until_disconnect() {
        let mut adapter = MockWebSocketAdapter::new();
        let mut seq = Sequence::new();
        adapter.expect_receive().times(1).in_sequence(&mut seq).returning(|_| Ok(Event::CreateConnection));
        adapter.expect_accept().times(1).in_sequence(&mut seq).returning(|_, _| Ok(()));
        adapter
            .expect_receive()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Event::Message(Message::Text("hello".into()))));
        adapter
            .expect_send()
            .with(eq(Message::Text("hello".into())), eq(None))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        adapter.expect_receive().times(1).in_sequence(&mut seq).returning(|_| Err(WebSocketError::disconnected(None)));

        let request = upgrade_request(adapter);
        let ws_request = WebSocketRequest::from_request(&request).unwrap();
        let socket = ws_request.accept().unwrap();
        assert!(ws_request.is_upgraded());

        for message in socket.messages() {
            socket.send(message.unwrap(), None).unwrap();
        }

        // accepted connections are closed through the socket
        ws_request.close().unwrap();
    }

    #[test]
    fn accept_twice_fails() {
        let mut adapter = MockWebSocketAdapter::new();
        adapter.expect_receive().times(1).returning(|_| Ok(Event::CreateConnection));
        adapter.expect_accept().times(1).returning(|_, _| Ok(()));

        let request = upgrade_request(adapter);
        let ws_request = WebSocketRequest::from_request(&request).unwrap();
        ws_request.accept().unwrap();

        assert!(matches!(ws_request.accept(), Err(WebSocketError::Protocol { .. })));
        assert!(matches!(ws_request.reject(Response::new()), Err(WebSocketError::Protocol { .. })));
    }

    #[test]
    fn concurrent_accepts_have_one_winner() {
        let mut adapter = MockWebSocketAdapter::new();
        adapter.expect_receive().times(1).returning(|_| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(Event::CreateConnection)
        });
        adapter.expect_accept().times(1).returning(|_, _| Ok(()));

        let channel = WebSocketChannel::new(Arc::new(adapter));
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> =
                (0..2).map(|_| scope.spawn(|| channel.accept(AcceptConnection::default(), None))).collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        assert!(results.iter().any(|result| matches!(result, Err(WebSocketError::Protocol { .. }))));
        assert!(channel.is_upgraded());
    }

    #[test]
    fn failed_handshake_can_be_retried() {
        let mut adapter = MockWebSocketAdapter::new();
        let mut seq = Sequence::new();
        adapter.expect_receive().times(1).in_sequence(&mut seq).returning(|_| Err(WebSocketError::Timeout));
        adapter.expect_receive().times(1).in_sequence(&mut seq).returning(|_| Ok(Event::CreateConnection));
        adapter.expect_accept().times(1).in_sequence(&mut seq).returning(|_, _| Ok(()));

        let request = upgrade_request(adapter);
        let ws_request = WebSocketRequest::from_request(&request).unwrap();

        let timeout = Some(Duration::from_millis(10));
        assert!(matches!(ws_request.accept_with(AcceptConnection::default(), timeout), Err(WebSocketError::Timeout)));
        assert!(!ws_request.is_upgraded());
        ws_request.accept().unwrap();
        assert!(ws_request.is_upgraded());
    }

    #[test]
    fn unexpected_first_event_closes_connection() {
        let mut adapter = MockWebSocketAdapter::new();
        adapter.expect_receive().times(1).returning(|_| Ok(Event::Message(Message::Binary(Bytes::from_static(b"x")))));
        adapter.expect_close().withf(|code, _, _| *code == 1003).times(1).returning(|_, _, _| Ok(()));

        let request = upgrade_request(adapter);
        let ws_request = WebSocketRequest::from_request(&request).unwrap();

        assert!(matches!(ws_request.accept(), Err(WebSocketError::Protocol { .. })));
        assert!(!ws_request.is_upgraded());
    }

    #[test]
    fn reject_sends_http_response() {
        let mut adapter = MockWebSocketAdapter::new();
        adapter
            .expect_reject()
            .withf(|status, _, body, _| *status == StatusCode::FORBIDDEN && body.as_ref() == b"no dice")
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let request = upgrade_request(adapter);
        let ws_request = WebSocketRequest::from_request(&request).unwrap();

        let mut response = Response::with_status(StatusCode::FORBIDDEN);
        response.set_data("no dice");
        ws_request.reject(response).unwrap();

        assert!(ws_request.is_rejected());
        assert!(request.websocket_channel().unwrap().is_rejected());
        assert!(matches!(ws_request.reject(Response::new()), Err(WebSocketError::Protocol { .. })));
    }

    #[test]
    fn receive_timeout_is_distinct_from_disconnect() {
        let mut adapter = MockWebSocketAdapter::new();
        let mut seq = Sequence::new();
        adapter.expect_receive().times(1).in_sequence(&mut seq).returning(|_| Ok(Event::CreateConnection));
        adapter.expect_accept().times(1).in_sequence(&mut seq).returning(|_, _| Ok(()));
        adapter.expect_receive().times(1).in_sequence(&mut seq).returning(|_| Err(WebSocketError::Timeout));

        let request = upgrade_request(adapter);
        let socket = WebSocketRequest::from_request(&request).unwrap().accept().unwrap();

        let error = socket.receive(Some(Duration::from_millis(10))).unwrap_err();
        assert!(matches!(error, WebSocketError::Timeout));
        assert!(!error.is_disconnect());
    }
}
