//! The gateway: shared handler lists run as a fresh [`HandlerChain`] for every request.
//!
//! ```
//! use http::StatusCode;
//! use switchyard_http::protocol::Request;
//! use switchyard_web::gateway::{EmptyResponseHandler, Gateway, HandlerChain, handler_fn};
//!
//! let gateway: Gateway = Gateway::builder()
//!     .request_handler(handler_fn(|chain: &mut HandlerChain, _context, response| {
//!         chain.respond(response, StatusCode::ACCEPTED, "ok");
//!         Ok(())
//!     }))
//!     .response_handler(EmptyResponseHandler::default())
//!     .build();
//!
//! let mut response = gateway.handle(Request::from(http::Request::get("/").body(()).unwrap())).unwrap();
//! assert_eq!(response.status(), StatusCode::ACCEPTED);
//! assert_eq!(response.data().unwrap(), "ok");
//! ```

mod chain;
mod composite;
mod handlers;

pub use chain::{
    ChainOptions, ExceptionHandler, FnExceptionHandler, FnHandler, Handler, HandlerChain, Handlers, Payload,
    exception_handler_fn, handler_fn,
};
pub use composite::{CompositeExceptionHandler, CompositeFinalizer, CompositeHandler};
pub use handlers::{EmptyResponseHandler, ErrorFormat, HttpErrorHandler, RouterHandler};

use crate::context::{Context, RequestContext};
use crate::error::HandlerError;
use http::StatusCode;
use std::sync::Arc;
use switchyard_http::protocol::{Request, Response};
use switchyard_http::websocket::WebSocketError;
use tracing::{debug, debug_span};

/// Runs requests through its handlers.
///
/// The handler lists are shared by every chain the gateway creates. Changing them through
/// [`handlers_mut`](Self::handlers_mut) affects requests processed afterwards only.
#[derive(Debug)]
pub struct Gateway<C = RequestContext> {
    handlers: Arc<Handlers<C>>,
    options: ChainOptions,
}

impl<C: Context> Gateway<C> {
    pub fn new(handlers: Handlers<C>, options: ChainOptions) -> Self {
        Self { handlers: Arc::new(handlers), options }
    }

    pub fn builder() -> GatewayBuilder<C> {
        GatewayBuilder::new()
    }

    pub fn handlers(&self) -> &Handlers<C> {
        &self.handlers
    }

    /// The handler lists, copied first when chains still use them.
    pub fn handlers_mut(&mut self) -> &mut Handlers<C> {
        Arc::make_mut(&mut self.handlers)
    }

    pub fn options(&self) -> ChainOptions {
        self.options
    }

    pub fn new_chain(&self) -> HandlerChain<C> {
        HandlerChain::new(Arc::clone(&self.handlers), self.options)
    }

    /// Runs a new chain over `request`, populating `response`.
    pub fn process(&self, request: Request, response: &mut Response) -> Result<(), HandlerError> {
        let span = debug_span!("process", method = %request.method(), path = %request.raw_path());
        let _enter = span.enter();

        let mut context = C::from_request(request);
        self.new_chain().handle(&mut context, response)
    }

    /// Processes `request` into a new response.
    pub fn handle(&self, request: Request) -> Result<Response, HandlerError> {
        let mut response = Response::new();
        self.process(request, &mut response)?;
        Ok(response)
    }

    /// Processes a websocket upgrade request.
    ///
    /// Handlers accept or reject the upgrade themselves. When they changed the status away
    /// from `101` without doing either, the upgrade is rejected with the populated response.
    /// Otherwise, the connection is left to the transport.
    pub fn accept(&self, request: Request) -> Result<(), HandlerError> {
        let channel = request
            .websocket_channel()
            .cloned()
            .ok_or_else(|| WebSocketError::protocol("request carries no websocket channel"))?;

        let mut response = Response::with_status(StatusCode::SWITCHING_PROTOCOLS);
        self.process(request, &mut response)?;

        if response.status() == StatusCode::SWITCHING_PROTOCOLS || channel.is_upgraded() || channel.is_rejected() {
            return Ok(());
        }

        debug!(status = %response.status(), "rejecting websocket upgrade");
        channel.reject(response)?;
        Ok(())
    }
}

impl<C> Clone for Gateway<C> {
    fn clone(&self) -> Self {
        Self { handlers: Arc::clone(&self.handlers), options: self.options }
    }
}

/// Collects the handlers and options of a [`Gateway`].
#[derive(Debug)]
pub struct GatewayBuilder<C = RequestContext> {
    handlers: Handlers<C>,
    options: ChainOptions,
}

impl<C: Context> GatewayBuilder<C> {
    pub fn new() -> Self {
        Self { handlers: Handlers::new(), options: ChainOptions::default() }
    }

    pub fn request_handler<H: Handler<C> + 'static>(mut self, handler: H) -> Self {
        self.handlers.request.push(Arc::new(handler));
        self
    }

    pub fn response_handler<H: Handler<C> + 'static>(mut self, handler: H) -> Self {
        self.handlers.response.push(Arc::new(handler));
        self
    }

    pub fn finalizer<H: Handler<C> + 'static>(mut self, handler: H) -> Self {
        self.handlers.finalizers.push(Arc::new(handler));
        self
    }

    pub fn exception_handler<H: ExceptionHandler<C> + 'static>(mut self, handler: H) -> Self {
        self.handlers.exception.push(Arc::new(handler));
        self
    }

    /// Appends all lists of `handlers` to the ones collected so far.
    pub fn handlers(mut self, handlers: Handlers<C>) -> Self {
        let Handlers { request, response, finalizers, exception } = handlers;
        self.handlers.request.extend(request);
        self.handlers.response.extend(response);
        self.handlers.finalizers.extend(finalizers);
        self.handlers.exception.extend(exception);
        self
    }

    pub fn stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.options.stop_on_error = stop_on_error;
        self
    }

    pub fn raise_on_error(mut self, raise_on_error: bool) -> Self {
        self.options.raise_on_error = raise_on_error;
        self
    }

    pub fn options(mut self, options: ChainOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Gateway<C> {
        Gateway::new(self.handlers, self.options)
    }
}

impl<C: Context> Default for GatewayBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::HeaderMap;
    use mockall::mock;
    use mockall::predicate::eq;
    use std::sync::Mutex;
    use std::time::Duration;
    use switchyard_http::websocket::{AcceptConnection, Event, Message, WebSocketAdapter, WebSocketRequest};

    mock! {
        Adapter {}

        impl WebSocketAdapter for Adapter {
            fn receive(&self, timeout: Option<Duration>) -> Result<Event, WebSocketError>;
            fn send(&self, message: Message, timeout: Option<Duration>) -> Result<(), WebSocketError>;
            fn accept(&self, accept: AcceptConnection, timeout: Option<Duration>) -> Result<(), WebSocketError>;
            fn reject(
                &self,
                status: StatusCode,
                headers: HeaderMap,
                body: Bytes,
                timeout: Option<Duration>,
            ) -> Result<(), WebSocketError>;
            fn close(&self, code: u16, reason: Option<String>, timeout: Option<Duration>) -> Result<(), WebSocketError>;
        }
    }

    type Calls = Arc<Mutex<Vec<&'static str>>>;

    fn record(calls: &Calls, name: &'static str) -> impl Handler + 'static {
        let calls = Arc::clone(calls);
        handler_fn(move |_chain: &mut HandlerChain, _context: &mut RequestContext, _response: &mut Response| {
            calls.lock().unwrap().push(name);
            Ok(())
        })
    }

    fn get(path: &str) -> Request {
        Request::from(http::Request::get(path).body(()).unwrap())
    }

    fn upgrade(adapter: MockAdapter) -> Request {
        Request::websocket(http::Request::get("/ws").body(()).unwrap(), Arc::new(adapter))
    }

    #[test]
    fn respond_stops_request_handlers() {
        let calls = Calls::default();
        let responder = {
            let calls = Arc::clone(&calls);
            handler_fn(move |chain: &mut HandlerChain, _context: &mut RequestContext, response: &mut Response| {
                calls.lock().unwrap().push("h1");
                chain.respond(response, StatusCode::ACCEPTED, "ok");
                Ok(())
            })
        };

        let gateway: Gateway = Gateway::builder()
            .request_handler(responder)
            .request_handler(record(&calls, "h2"))
            .response_handler(record(&calls, "response"))
            .finalizer(record(&calls, "finalizer"))
            .build();

        let mut response = gateway.handle(get("/anything")).unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.data().unwrap(), "ok");
        assert_eq!(*calls.lock().unwrap(), vec!["h1", "response", "finalizer"]);
    }

    #[test]
    fn failing_finalizer_is_isolated() {
        let calls = Calls::default();
        let gateway: Gateway = Gateway::builder()
            .finalizer(record(&calls, "first"))
            .finalizer(handler_fn(|_chain: &mut HandlerChain, _context: &mut RequestContext, _response: &mut Response| {
                Err("finalizer failed".into())
            }))
            .finalizer(record(&calls, "third"))
            .build();

        gateway.handle(get("/")).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["first", "third"]);
    }

    #[test]
    fn raise_on_error() {
        let failing =
            handler_fn(|_chain: &mut HandlerChain, _context: &mut RequestContext, _response: &mut Response| {
                Err("backend unavailable".into())
            });

        let gateway: Gateway = Gateway::builder().request_handler(failing).raise_on_error(true).build();
        let error = gateway.handle(get("/")).unwrap_err();
        assert_eq!(error.to_string(), "backend unavailable");
        assert!(gateway.options().stop_on_error);
    }

    #[test]
    fn every_request_gets_a_fresh_context() {
        let counter = handler_fn(|_chain: &mut HandlerChain, context: &mut RequestContext, response: &mut Response| {
            let seen = context.contains("seen");
            context.set("seen", true);
            response.set_data(if seen { "again" } else { "first" });
            Ok(())
        });
        let gateway: Gateway = Gateway::builder().request_handler(counter).build();

        for _ in 0..2 {
            assert_eq!(gateway.handle(get("/")).unwrap().data().unwrap(), "first");
        }
    }

    #[derive(Debug)]
    struct TenantContext {
        request: Request,
        tenant: String,
    }

    impl Context for TenantContext {
        fn from_request(request: Request) -> Self {
            let tenant = request.headers().get("x-tenant").and_then(|value| value.to_str().ok()).unwrap_or("default");
            Self { tenant: tenant.to_owned(), request }
        }

        fn request(&self) -> &Request {
            &self.request
        }
    }

    #[test]
    fn custom_context() {
        let gateway: Gateway<TenantContext> = Gateway::builder()
            .request_handler(handler_fn(
                |_chain: &mut HandlerChain<TenantContext>, context: &mut TenantContext, response: &mut Response| {
                    response.set_data(context.tenant.clone());
                    Ok(())
                },
            ))
            .build();

        let request = Request::from(http::Request::get("/").header("x-tenant", "acme").body(()).unwrap());
        assert_eq!(gateway.handle(request).unwrap().data().unwrap(), "acme");
    }

    #[test]
    fn handlers_mut_leaves_running_chains_alone() {
        let calls = Calls::default();
        let mut gateway: Gateway = Gateway::builder().request_handler(record(&calls, "a")).build();

        let mut chain = gateway.new_chain();
        gateway.handlers_mut().request.push(Arc::new(record(&calls, "b")));

        let mut context = RequestContext::from_request(get("/"));
        chain.handle(&mut context, &mut Response::new()).unwrap();
        gateway.handle(get("/")).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["a", "a", "b"]);
    }

    #[test]
    fn accept_rejects_with_populated_response() {
        let mut adapter = MockAdapter::new();
        adapter
            .expect_reject()
            .withf(|status, _headers, body, _timeout| *status == StatusCode::FORBIDDEN && body == "denied")
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let gateway: Gateway = Gateway::builder()
            .request_handler(handler_fn(|chain: &mut HandlerChain, _context: &mut RequestContext, response: &mut Response| {
                chain.respond(response, StatusCode::FORBIDDEN, "denied");
                Ok(())
            }))
            .build();

        gateway.accept(upgrade(adapter)).unwrap();
    }

    #[test]
    fn accept_leaves_untouched_upgrades_to_transport() {
        let mut adapter = MockAdapter::new();
        adapter.expect_reject().never();
        adapter.expect_close().never();

        let gateway: Gateway = Gateway::builder().build();
        gateway.accept(upgrade(adapter)).unwrap();
    }

    #[test]
    fn accept_after_handler_upgraded() {
        let mut adapter = MockAdapter::new();
        adapter.expect_receive().times(1).returning(|_| Ok(Event::CreateConnection));
        adapter.expect_accept().times(1).returning(|_, _| Ok(()));
        adapter.expect_send().with(eq(Message::from("hello")), eq(None)).times(1).returning(|_, _| Ok(()));
        adapter.expect_reject().never();

        let gateway: Gateway = Gateway::builder()
            .request_handler(handler_fn(|chain: &mut HandlerChain, context: &mut RequestContext, response: &mut Response| {
                let websocket = WebSocketRequest::from_request(context.request())?.accept()?;
                websocket.send("hello", None)?;
                response.set_status(StatusCode::OK);
                chain.stop();
                Ok(())
            }))
            .build();

        gateway.accept(upgrade(adapter)).unwrap();
    }

    #[test]
    fn accept_requires_channel() {
        let gateway: Gateway = Gateway::builder().build();
        let error = gateway.accept(get("/ws")).unwrap_err();
        assert!(error.downcast_ref::<WebSocketError>().is_some());
    }
}
