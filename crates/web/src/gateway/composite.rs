//! Handler lists that act as a single handler entry.

use crate::context::{Context, RequestContext};
use crate::error::HandlerError;
use crate::gateway::chain::{ExceptionHandler, Handler, HandlerChain, log_isolated};
use std::fmt;
use std::ptr;
use std::sync::Arc;
use switchyard_http::protocol::Response;

fn remove_from<T: ?Sized>(handlers: &mut Vec<Arc<T>>, handler: &Arc<T>) -> bool {
    let before = handlers.len();
    handlers.retain(|existing| !ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(handler)));
    handlers.len() != before
}

/// Runs its handlers in order, like a small chain.
///
/// A terminated chain always ends the group. A stopped chain ends it only when
/// `return_on_stop` is set, which is the default for request handlers. Errors end the
/// group and propagate to the enclosing chain.
pub struct CompositeHandler<C = RequestContext> {
    handlers: Vec<Arc<dyn Handler<C>>>,
    return_on_stop: bool,
}

impl<C> CompositeHandler<C> {
    pub fn new() -> Self {
        Self::with_return_on_stop(true)
    }

    /// A composite for response handlers, running every member even when the chain was stopped.
    pub fn response_handler() -> Self {
        Self::with_return_on_stop(false)
    }

    pub fn with_return_on_stop(return_on_stop: bool) -> Self {
        Self { handlers: Vec::new(), return_on_stop }
    }

    pub fn append<H: Handler<C> + 'static>(&mut self, handler: H) {
        self.handlers.push(Arc::new(handler));
    }

    pub fn append_shared(&mut self, handler: Arc<dyn Handler<C>>) {
        self.handlers.push(handler);
    }

    pub fn with<H: Handler<C> + 'static>(mut self, handler: H) -> Self {
        self.append(handler);
        self
    }

    /// Removes a handler added with [`append_shared`](Self::append_shared).
    pub fn remove(&mut self, handler: &Arc<dyn Handler<C>>) -> bool {
        remove_from(&mut self.handlers, handler)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C> Default for CompositeHandler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Context> Handler<C> for CompositeHandler<C> {
    fn handle(&self, chain: &mut HandlerChain<C>, context: &mut C, response: &mut Response) -> Result<(), HandlerError> {
        for handler in &self.handlers {
            handler.handle(chain, context, response)?;

            if chain.is_terminated() {
                return Ok(());
            }
            if chain.is_stopped() && self.return_on_stop {
                return Ok(());
            }
        }
        Ok(())
    }
}

impl<C> fmt::Debug for CompositeHandler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeHandler")
            .field("handlers", &self.handlers.len())
            .field("return_on_stop", &self.return_on_stop)
            .finish()
    }
}

/// Runs every member, logging failures instead of propagating them.
pub struct CompositeFinalizer<C = RequestContext> {
    handlers: Vec<Arc<dyn Handler<C>>>,
}

impl<C> CompositeFinalizer<C> {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn append<H: Handler<C> + 'static>(&mut self, handler: H) {
        self.handlers.push(Arc::new(handler));
    }

    pub fn append_shared(&mut self, handler: Arc<dyn Handler<C>>) {
        self.handlers.push(handler);
    }

    pub fn with<H: Handler<C> + 'static>(mut self, handler: H) -> Self {
        self.append(handler);
        self
    }

    pub fn remove(&mut self, handler: &Arc<dyn Handler<C>>) -> bool {
        remove_from(&mut self.handlers, handler)
    }
}

impl<C> Default for CompositeFinalizer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Context> Handler<C> for CompositeFinalizer<C> {
    fn handle(&self, chain: &mut HandlerChain<C>, context: &mut C, response: &mut Response) -> Result<(), HandlerError> {
        for handler in &self.handlers {
            if let Err(e) = handler.handle(chain, context, response) {
                log_isolated("exception while running request finalizer", &e);
            }
        }
        Ok(())
    }
}

impl<C> fmt::Debug for CompositeFinalizer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeFinalizer").field("handlers", &self.handlers.len()).finish()
    }
}

/// Calls every member exception handler, whatever the others do.
pub struct CompositeExceptionHandler<C = RequestContext> {
    handlers: Vec<Arc<dyn ExceptionHandler<C>>>,
}

impl<C> CompositeExceptionHandler<C> {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn append<H: ExceptionHandler<C> + 'static>(&mut self, handler: H) {
        self.handlers.push(Arc::new(handler));
    }

    pub fn append_shared(&mut self, handler: Arc<dyn ExceptionHandler<C>>) {
        self.handlers.push(handler);
    }

    pub fn with<H: ExceptionHandler<C> + 'static>(mut self, handler: H) -> Self {
        self.append(handler);
        self
    }

    pub fn remove(&mut self, handler: &Arc<dyn ExceptionHandler<C>>) -> bool {
        remove_from(&mut self.handlers, handler)
    }
}

impl<C> Default for CompositeExceptionHandler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Context> ExceptionHandler<C> for CompositeExceptionHandler<C> {
    fn handle_exception(
        &self,
        chain: &mut HandlerChain<C>,
        error: &HandlerError,
        context: &mut C,
        response: &mut Response,
    ) -> Result<(), HandlerError> {
        for handler in &self.handlers {
            if let Err(nested) = handler.handle_exception(chain, error, context, response) {
                log_isolated("exception while running exception handler", &nested);
            }
        }
        Ok(())
    }
}

impl<C> fmt::Debug for CompositeExceptionHandler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeExceptionHandler").field("handlers", &self.handlers.len()).finish()
    }
}
