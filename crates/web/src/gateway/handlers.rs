//! Stock handlers for common gateway setups.

use crate::context::Context;
use crate::error::{DispatchError, FieldError, HandlerError, HttpError, RoutingError};
use crate::gateway::chain::{ExceptionHandler, Handler, HandlerChain};
use crate::router::Router;
use bytes::Bytes;
use http::header::{ALLOW, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde_json::json;
use std::sync::Arc;
use switchyard_http::protocol::Response;
use tracing::trace;

/// Serves a [`Router`] as a request handler.
///
/// A dispatched request stops the chain with the endpoint's response. Requests no route
/// matches pass on to the next handler, or get a `404` when `respond_not_found` is set.
/// Every other failure goes to the exception handlers.
#[derive(Debug)]
pub struct RouterHandler<E> {
    router: Arc<Router<E>>,
    respond_not_found: bool,
}

impl<E> RouterHandler<E> {
    pub fn new(router: Arc<Router<E>>) -> Self {
        Self { router, respond_not_found: false }
    }

    pub fn respond_not_found(mut self, respond_not_found: bool) -> Self {
        self.respond_not_found = respond_not_found;
        self
    }

    pub fn router(&self) -> &Arc<Router<E>> {
        &self.router
    }
}

impl<C: Context, E: Send + Sync + 'static> Handler<C> for RouterHandler<E> {
    fn handle(&self, chain: &mut HandlerChain<C>, context: &mut C, response: &mut Response) -> Result<(), HandlerError> {
        match self.router.dispatch(context.request()) {
            Ok(mut router_response) => {
                if router_response.is_status_unset() {
                    router_response.set_status(StatusCode::OK);
                }
                response.update_from(router_response);
                chain.stop();
                Ok(())
            }
            Err(DispatchError::Routing(RoutingError::NotFound { .. })) => {
                if self.respond_not_found {
                    chain.respond(response, StatusCode::NOT_FOUND, "not found");
                }
                Ok(())
            }
            Err(DispatchError::Endpoint { source }) => Err(source),
            Err(e) => Err(e.into()),
        }
    }
}

/// Fills in a default response when no handler produced one.
#[derive(Debug, Clone)]
pub struct EmptyResponseHandler {
    status: StatusCode,
    body: Bytes,
    headers: HeaderMap,
}

impl EmptyResponseHandler {
    pub fn new(status: StatusCode) -> Self {
        Self { status, body: Bytes::new(), headers: HeaderMap::new() }
    }

    pub fn body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// No status was set and the body is empty.
    pub fn is_empty_response(response: &Response) -> bool {
        response.is_status_unset() && response.body().is_empty()
    }
}

impl Default for EmptyResponseHandler {
    fn default() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }
}

impl<C: Context> Handler<C> for EmptyResponseHandler {
    fn handle(&self, _chain: &mut HandlerChain<C>, _context: &mut C, response: &mut Response) -> Result<(), HandlerError> {
        if Self::is_empty_response(response) {
            response.set_status(self.status);
            response.set_data(self.body.clone());
            response.update_headers(self.headers.clone());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorFormat {
    /// `{"code": .., "description": ..}`, plus the validation `errors` of bad requests.
    #[default]
    Json,
    /// The description as plain text.
    Text,
}

/// Turns http errors into responses.
///
/// Handles [`HttpError`] and the client errors among [`DispatchError`] and
/// [`RoutingError`]. Other errors are left to the remaining exception handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpErrorHandler {
    format: ErrorFormat,
}

struct ErrorResponse<'a> {
    status: StatusCode,
    description: String,
    headers: HeaderMap,
    errors: Option<&'a [FieldError]>,
}

impl HttpErrorHandler {
    pub fn new(format: ErrorFormat) -> Self {
        Self { format }
    }

    fn error_response(error: &HandlerError) -> Option<ErrorResponse<'_>> {
        if let Some(http_error) = error.downcast_ref::<HttpError>() {
            return Some(ErrorResponse {
                status: http_error.status(),
                description: http_error.description().to_owned(),
                headers: http_error.headers().clone(),
                errors: None,
            });
        }

        if let Some(routing_error) = error.downcast_ref::<RoutingError>() {
            return Some(Self::routing_response(routing_error));
        }

        match error.downcast_ref::<DispatchError>()? {
            DispatchError::Routing(routing_error) => Some(Self::routing_response(routing_error)),
            e @ DispatchError::BadRequest { errors } => Some(ErrorResponse {
                status: e.status_code(),
                description: e.to_string(),
                headers: HeaderMap::new(),
                errors: Some(errors),
            }),
            _ => None,
        }
    }

    fn routing_response(error: &RoutingError) -> ErrorResponse<'_> {
        let mut headers = HeaderMap::new();
        if let RoutingError::MethodNotAllowed { allowed, .. } = error {
            let allowed = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
            if let Ok(value) = HeaderValue::from_str(&allowed) {
                headers.insert(ALLOW, value);
            }
        }
        ErrorResponse { status: error.status_code(), description: error.to_string(), headers, errors: None }
    }
}

impl<C: Context> ExceptionHandler<C> for HttpErrorHandler {
    fn handle_exception(
        &self,
        chain: &mut HandlerChain<C>,
        error: &HandlerError,
        _context: &mut C,
        response: &mut Response,
    ) -> Result<(), HandlerError> {
        let Some(error_response) = Self::error_response(error) else {
            return Ok(());
        };
        trace!(status = %error_response.status, "responding with http error");

        let ErrorResponse { status, description, headers, errors } = error_response;
        match self.format {
            ErrorFormat::Json => {
                let mut payload = json!({"code": status.as_u16(), "description": description});
                if let Some(errors) = errors {
                    payload["errors"] = serde_json::to_value(errors)?;
                }
                chain.respond_with_headers(response, status, payload, headers);
            }
            ErrorFormat::Text => chain.respond_with_headers(response, status, description, headers),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::gateway::chain::{ChainOptions, Handlers, handler_fn};
    use crate::router::{RawEndpoint, Resource, raw_endpoint};
    use http::header::CONTENT_TYPE;
    use switchyard_http::protocol::Request;

    fn handle(handlers: Handlers, method: Method, path: &str) -> Response {
        let mut chain = HandlerChain::new(Arc::new(handlers), ChainOptions::default());
        let request = http::Request::builder().method(method).uri(path).body(()).unwrap();
        let mut context = RequestContext::from_request(Request::from(request));
        let mut response = Response::new();
        chain.handle(&mut context, &mut response).unwrap();
        response
    }

    fn failing_with(error: fn() -> HandlerError) -> Arc<dyn Handler> {
        Arc::new(handler_fn(move |_chain: &mut HandlerChain, _context: &mut RequestContext, _response: &mut Response| {
            Err(error())
        }))
    }

    fn router() -> Arc<Router<RawEndpoint>> {
        let router = Router::new();
        router
            .add(Resource::new("/items").get(raw_endpoint(|_, _| {
                let mut response = Response::with_status(StatusCode::OK);
                response.set_data("items");
                Ok(response)
            })))
            .unwrap();
        router
            .add(("/forbidden", raw_endpoint(|_, _| Err(HttpError::forbidden("no access").into()))))
            .unwrap();
        Arc::new(router)
    }

    #[test]
    fn router_handler_serves_routes() {
        let handlers = Handlers {
            request: vec![Arc::new(RouterHandler::new(router()))],
            response: vec![Arc::new(EmptyResponseHandler::default())],
            ..Handlers::new()
        };

        let mut response = handle(handlers, Method::GET, "/items");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.data().unwrap(), "items");
    }

    #[test]
    fn endpoint_response_without_status_is_ok() {
        let router = Router::new();
        router.add(("/items", raw_endpoint(|_, _| Ok(Response::new())))).unwrap();
        let handlers = Handlers {
            request: vec![Arc::new(RouterHandler::new(Arc::new(router)))],
            response: vec![Arc::new(EmptyResponseHandler::default())],
            ..Handlers::new()
        };

        let mut response = handle(handlers, Method::DELETE, "/items");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.is_status_unset());
        assert!(response.data().unwrap().is_empty());
    }

    #[test]
    fn not_found_falls_through_to_empty_response() {
        let handlers = Handlers {
            request: vec![Arc::new(RouterHandler::new(router()))],
            response: vec![Arc::new(EmptyResponseHandler::new(StatusCode::NOT_FOUND).body("nothing here"))],
            ..Handlers::new()
        };

        let mut response = handle(handlers, Method::GET, "/missing");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.data().unwrap(), "nothing here");
    }

    #[test]
    fn respond_not_found() {
        let handlers =
            Handlers { request: vec![Arc::new(RouterHandler::new(router()).respond_not_found(true))], ..Handlers::new() };

        let mut response = handle(handlers, Method::GET, "/missing");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.data().unwrap(), "not found");
    }

    #[test]
    fn method_not_allowed_sets_allow() {
        let handlers = Handlers {
            request: vec![Arc::new(RouterHandler::new(router()))],
            exception: vec![Arc::new(HttpErrorHandler::default())],
            ..Handlers::new()
        };

        let mut response = handle(handlers, Method::DELETE, "/items");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, HEAD");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.data().unwrap(), r#"{"code":405,"description":"method DELETE is not allowed for /items"}"#);
    }

    #[test]
    fn endpoint_http_errors_are_rendered() {
        let handlers = Handlers {
            request: vec![Arc::new(RouterHandler::new(router()))],
            exception: vec![Arc::new(HttpErrorHandler::new(ErrorFormat::Text))],
            ..Handlers::new()
        };

        let mut response = handle(handlers, Method::GET, "/forbidden");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.data().unwrap(), "no access");
    }

    #[test]
    fn bad_requests_list_errors() {
        let handlers = Handlers {
            request: vec![failing_with(|| {
                DispatchError::bad_request(vec![FieldError::new("json_invalid", vec!["body".into()], "EOF")]).into()
            })],
            exception: vec![Arc::new(HttpErrorHandler::default())],
            ..Handlers::new()
        };

        let mut response = handle(handlers, Method::POST, "/");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(&response.data().unwrap()).unwrap();
        assert_eq!(body["errors"][0]["type"], "json_invalid");
        assert_eq!(body["code"], 400);
    }

    #[test]
    fn other_errors_are_left_alone() {
        let handlers = Handlers {
            request: vec![failing_with(|| "database unavailable".into())],
            exception: vec![Arc::new(HttpErrorHandler::default())],
            ..Handlers::new()
        };

        let response = handle(handlers, Method::GET, "/");
        assert!(EmptyResponseHandler::is_empty_response(&response));
    }
}
