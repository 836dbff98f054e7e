//! Serving a gateway from async transports.
//!
//! Handler chains block, so event loop transports hand every request to a
//! [`BlockingBridge`]. It runs the chain on tokio's blocking pool and caps the number of
//! chains running at once.

use crate::context::{Context, RequestContext};
use crate::error::ServingError;
use crate::gateway::Gateway;
use std::sync::Arc;
use switchyard_http::protocol::{Request, Response};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::spawn_blocking;
use tracing::trace;

#[derive(Debug)]
pub struct BlockingBridge<C = RequestContext> {
    gateway: Arc<Gateway<C>>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl<C: Context> BlockingBridge<C> {
    /// Runs at most `workers` chains of `gateway` at the same time.
    pub fn new(gateway: Arc<Gateway<C>>, workers: usize) -> Self {
        Self { gateway, permits: Arc::new(Semaphore::new(workers)), workers }
    }

    pub fn gateway(&self) -> &Arc<Gateway<C>> {
        &self.gateway
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Workers not running a chain right now.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Refuses requests from now on. Running chains complete.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    pub async fn process(&self, request: Request) -> Result<Response, ServingError> {
        let permit = self.acquire().await?;
        let gateway = Arc::clone(&self.gateway);

        let result = spawn_blocking(move || {
            let _permit = permit;
            gateway.handle(request)
        })
        .await?;

        result.map_err(|source| ServingError::Handler { source })
    }

    /// Runs [`Gateway::accept`] for a websocket upgrade request.
    ///
    /// Handlers that accept the upgrade keep the worker busy for as long as they serve the
    /// connection.
    pub async fn accept(&self, request: Request) -> Result<(), ServingError> {
        let permit = self.acquire().await?;
        let gateway = Arc::clone(&self.gateway);

        let result = spawn_blocking(move || {
            let _permit = permit;
            gateway.accept(request)
        })
        .await?;

        result.map_err(|source| ServingError::Handler { source })
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit, ServingError> {
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return Err(ServingError::Closed);
        };
        trace!(idle = self.permits.available_permits(), "acquired blocking worker");
        Ok(permit)
    }
}

impl<C> Clone for BlockingBridge<C> {
    fn clone(&self) -> Self {
        Self { gateway: Arc::clone(&self.gateway), permits: Arc::clone(&self.permits), workers: self.workers }
    }
}
