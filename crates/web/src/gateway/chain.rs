//! The handler chain: one run of the gateway's handlers over a single request.
//!
//! A chain runs the request handlers in order until one of them stops or terminates the
//! chain, then the response handlers, then the finalizers:
//!
//! * `stop` skips the remaining request handlers. Response handlers and finalizers still run.
//! * `terminate` skips the remaining request handlers and the response handlers. Finalizers
//!   still run.
//! * `throw` makes `handle` fail once the current request handler returns. Finalizers still run.
//!
//! When a request handler fails, the chain stops (see [`ChainOptions`]) and every exception
//! handler is called with the error. Failures of exception handlers, response handlers and
//! finalizers are logged and never affect the handlers that come after them.

use crate::context::{Context, RequestContext};
use crate::error::HandlerError;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use switchyard_http::protocol::Response;
use switchyard_http::protocol::body::ResponseBody;
use tracing::{Level, debug, error, warn};

/// A request handler, response handler or finalizer.
pub trait Handler<C = RequestContext>: Send + Sync {
    fn handle(&self, chain: &mut HandlerChain<C>, context: &mut C, response: &mut Response) -> Result<(), HandlerError>;
}

/// Called with the error of a failed request handler.
pub trait ExceptionHandler<C = RequestContext>: Send + Sync {
    fn handle_exception(
        &self,
        chain: &mut HandlerChain<C>,
        error: &HandlerError,
        context: &mut C,
        response: &mut Response,
    ) -> Result<(), HandlerError>;
}

/// A closure handler, see [`handler_fn`].
pub struct FnHandler<F, C> {
    f: F,
    _context: PhantomData<fn(&mut C)>,
}

/// Turns a closure into a [`Handler`].
///
/// ```
/// use switchyard_web::context::RequestContext;
/// use switchyard_web::gateway::handler_fn;
///
/// let log = handler_fn(|_chain, context: &mut RequestContext, _response| {
///     context.set("logged", true);
///     Ok(())
/// });
/// ```
pub fn handler_fn<C, F>(f: F) -> FnHandler<F, C>
where
    F: Fn(&mut HandlerChain<C>, &mut C, &mut Response) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler { f, _context: PhantomData }
}

impl<C, F> Handler<C> for FnHandler<F, C>
where
    F: Fn(&mut HandlerChain<C>, &mut C, &mut Response) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, chain: &mut HandlerChain<C>, context: &mut C, response: &mut Response) -> Result<(), HandlerError> {
        (self.f)(chain, context, response)
    }
}

impl<F, C> fmt::Debug for FnHandler<F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHandler")
    }
}

/// A closure exception handler, see [`exception_handler_fn`].
pub struct FnExceptionHandler<F, C> {
    f: F,
    _context: PhantomData<fn(&mut C)>,
}

pub fn exception_handler_fn<C, F>(f: F) -> FnExceptionHandler<F, C>
where
    F: Fn(&mut HandlerChain<C>, &HandlerError, &mut C, &mut Response) -> Result<(), HandlerError> + Send + Sync,
{
    FnExceptionHandler { f, _context: PhantomData }
}

impl<C, F> ExceptionHandler<C> for FnExceptionHandler<F, C>
where
    F: Fn(&mut HandlerChain<C>, &HandlerError, &mut C, &mut Response) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle_exception(
        &self,
        chain: &mut HandlerChain<C>,
        error: &HandlerError,
        context: &mut C,
        response: &mut Response,
    ) -> Result<(), HandlerError> {
        (self.f)(chain, error, context, response)
    }
}

impl<F, C> fmt::Debug for FnExceptionHandler<F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnExceptionHandler")
    }
}

/// The four handler lists of a gateway, each run in registration order.
pub struct Handlers<C = RequestContext> {
    pub request: Vec<Arc<dyn Handler<C>>>,
    pub response: Vec<Arc<dyn Handler<C>>>,
    pub finalizers: Vec<Arc<dyn Handler<C>>>,
    pub exception: Vec<Arc<dyn ExceptionHandler<C>>>,
}

impl<C> Handlers<C> {
    pub fn new() -> Self {
        Self { request: Vec::new(), response: Vec::new(), finalizers: Vec::new(), exception: Vec::new() }
    }
}

impl<C> Default for Handlers<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for Handlers<C> {
    fn clone(&self) -> Self {
        Self {
            request: self.request.iter().map(Arc::clone).collect(),
            response: self.response.iter().map(Arc::clone).collect(),
            finalizers: self.finalizers.iter().map(Arc::clone).collect(),
            exception: self.exception.iter().map(Arc::clone).collect(),
        }
    }
}

impl<C> fmt::Debug for Handlers<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("request", &self.request.len())
            .field("response", &self.response.len())
            .field("finalizers", &self.finalizers.len())
            .field("exception", &self.exception.len())
            .finish()
    }
}

/// What the chain does after a request handler failed.
///
/// With the defaults, the chain stops and proceeds to the response handlers with whatever
/// the response holds at that point, even when no exception handler produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainOptions {
    /// Stop the chain when a request handler fails.
    pub stop_on_error: bool,
    /// Fail `handle` with the error once the exception handlers ran.
    pub raise_on_error: bool,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self { stop_on_error: true, raise_on_error: false }
    }
}

/// The payload of [`HandlerChain::respond`].
#[derive(Debug)]
pub enum Payload {
    /// Serialized as json.
    Json(Value),
    /// Copied as the raw body.
    Data(Bytes),
    Body(ResponseBody),
    /// Keeps the current body.
    None,
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<&'static str> for Payload {
    fn from(value: &'static str) -> Self {
        Self::Data(Bytes::from_static(value.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Data(Bytes::from(value))
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Self::Data(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Data(Bytes::from(value))
    }
}

impl From<ResponseBody> for Payload {
    fn from(value: ResponseBody) -> Self {
        Self::Body(value)
    }
}

impl From<()> for Payload {
    fn from((): ()) -> Self {
        Self::None
    }
}

/// The state of one request's run through the handlers.
pub struct HandlerChain<C = RequestContext> {
    handlers: Arc<Handlers<C>>,
    options: ChainOptions,
    stopped: bool,
    terminated: bool,
    error: Option<Arc<HandlerError>>,
}

impl<C: Context> HandlerChain<C> {
    pub fn new(handlers: Arc<Handlers<C>>, options: ChainOptions) -> Self {
        Self { handlers, options, stopped: false, terminated: false, error: None }
    }

    /// Runs the handlers over `context` and `response`.
    ///
    /// Fails only with an error passed to [`throw`](Self::throw), or with a request handler
    /// error when `raise_on_error` is set. Finalizers run in every case.
    pub fn handle(&mut self, context: &mut C, response: &mut Response) -> Result<(), HandlerError> {
        let handlers = Arc::clone(&self.handlers);
        let result = self.run(&handlers, context, response);
        self.call_finalizers(&handlers, context, response);
        result
    }

    /// Sets the status and payload of `response` and stops the chain.
    pub fn respond<P: Into<Payload>>(&mut self, response: &mut Response, status: StatusCode, payload: P) {
        response.set_status(status);
        match payload.into() {
            Payload::Json(value) => response.set_json_value(&value),
            Payload::Data(data) => response.set_data(data),
            Payload::Body(body) => response.set_body(body),
            Payload::None => {}
        }
        self.stop();
    }

    /// Like [`respond`](Self::respond), also replacing the given headers.
    pub fn respond_with_headers<P: Into<Payload>>(
        &mut self,
        response: &mut Response,
        status: StatusCode,
        payload: P,
        headers: HeaderMap,
    ) {
        response.update_headers(headers);
        self.respond(response, status, payload);
    }

    fn run(&mut self, handlers: &Handlers<C>, context: &mut C, response: &mut Response) -> Result<(), HandlerError> {
        for handler in &handlers.request {
            if let Err(error) = handler.handle(self, context, response) {
                debug!(%error, "request handler failed");
                if self.options.stop_on_error {
                    self.stopped = true;
                }

                let error = Arc::new(error);
                if self.options.raise_on_error && self.error.is_none() {
                    self.error = Some(Arc::clone(&error));
                }

                self.call_exception_handlers(handlers, &error, context, response);
            }

            if let Some(error) = self.error.take() {
                return Err(unshare(error));
            }
            if self.terminated {
                return Ok(());
            }
            if self.stopped {
                break;
            }
        }

        self.call_response_handlers(handlers, context, response);
        Ok(())
    }

    fn call_exception_handlers(
        &mut self,
        handlers: &Handlers<C>,
        error: &HandlerError,
        context: &mut C,
        response: &mut Response,
    ) {
        for handler in &handlers.exception {
            if let Err(nested) = handler.handle_exception(self, error, context, response) {
                log_isolated("exception while running exception handler", &nested);
            }
        }
    }

    fn call_response_handlers(&mut self, handlers: &Handlers<C>, context: &mut C, response: &mut Response) {
        for handler in &handlers.response {
            if self.terminated {
                return;
            }
            if let Err(error) = handler.handle(self, context, response) {
                log_isolated("exception while running response handler", &error);
            }
        }
    }

    fn call_finalizers(&mut self, handlers: &Handlers<C>, context: &mut C, response: &mut Response) {
        for handler in &handlers.finalizers {
            if let Err(error) = handler.handle(self, context, response) {
                log_isolated("exception while running request finalizer", &error);
            }
        }
    }
}

impl<C> HandlerChain<C> {
    /// Skips the remaining request handlers.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Skips the remaining request handlers and all response handlers.
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    /// Makes `handle` fail with `error` once the current request handler returns.
    ///
    /// Has no effect when called from a response handler or finalizer.
    pub fn throw<E: Into<HandlerError>>(&mut self, error: E) {
        self.error = Some(Arc::new(error.into()));
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// The error waiting to be raised, if any.
    pub fn error(&self) -> Option<&HandlerError> {
        self.error.as_deref()
    }

    pub fn options(&self) -> ChainOptions {
        self.options
    }
}

impl<C> fmt::Debug for HandlerChain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("handlers", &self.handlers)
            .field("options", &self.options)
            .field("stopped", &self.stopped)
            .field("terminated", &self.terminated)
            .field("error", &self.error)
            .finish()
    }
}

/// Takes the pending error back once exception handlers no longer see it.
fn unshare(error: Arc<HandlerError>) -> HandlerError {
    Arc::try_unwrap(error).unwrap_or_else(|shared| shared.to_string().into())
}

/// Logs the failure of a handler whose errors never leave its loop.
pub(crate) fn log_isolated(message: &str, e: &HandlerError) {
    if tracing::enabled!(Level::DEBUG) {
        error!(?e, "{message}");
    } else {
        warn!("{message}: {e}");
    }
}
