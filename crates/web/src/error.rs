//! Error types of the gateway, the router and the dispatchers.
//!
//! Handler failures travel through the chain as [`HandlerError`], a boxed error that
//! exception handlers downcast to the concrete kinds defined here.

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use std::error::Error;
use thiserror::Error;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// The error type request handlers return and exception handlers receive.
pub type HandlerError = BoxError;

/// Matching a request against the url map failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no route matches {method} {path}")]
    NotFound { method: Method, path: String },

    #[error("method {method} is not allowed for {path}")]
    MethodNotAllowed { method: Method, path: String, allowed: Vec<Method> },
}

impl RoutingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

/// One entry of a structured validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    #[serde(rename = "type")]
    pub kind: String,
    pub loc: Vec<String>,
    pub msg: String,
}

impl FieldError {
    pub fn new<K: Into<String>, M: Into<String>>(kind: K, loc: Vec<String>, msg: M) -> Self {
        Self { kind: kind.into(), loc, msg: msg.into() }
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// The request body could not be bound to the structured parameter of the endpoint.
    #[error("bad request: {} validation error(s)", .errors.len())]
    BadRequest { errors: Vec<FieldError> },

    #[error("unsupported endpoint result type: {kind}")]
    UnsupportedResultType { kind: &'static str },

    #[error("invalid endpoint arguments: {reason}")]
    InvalidArguments { reason: String },

    /// The endpoint itself failed.
    #[error("endpoint failed: {source}")]
    Endpoint { source: BoxError },
}

impl DispatchError {
    pub fn bad_request(errors: Vec<FieldError>) -> Self {
        Self::BadRequest { errors }
    }

    pub fn invalid_arguments<S: ToString>(str: S) -> Self {
        Self::InvalidArguments { reason: str.to_string() }
    }

    pub fn endpoint<E: Into<BoxError>>(e: E) -> Self {
        Self::Endpoint { source: e.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Routing(e) => e.status_code(),
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::UnsupportedResultType { .. } | Self::InvalidArguments { .. } | Self::Endpoint { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Registering or removing routes failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("no such route: {rule}")]
    NoSuchRoute { rule: String },

    #[error("invalid rule pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("unknown converter '{name}' in rule '{pattern}'")]
    UnknownConverter { name: String, pattern: String },

    #[error("invalid arguments for converter '{name}': {reason}")]
    InvalidConverterArguments { name: String, reason: String },
}

impl RouteError {
    pub fn invalid_pattern<P: ToString, S: ToString>(pattern: P, reason: S) -> Self {
        Self::InvalidPattern { pattern: pattern.to_string(), reason: reason.to_string() }
    }

    pub fn invalid_converter_arguments<N: ToString, S: ToString>(name: N, reason: S) -> Self {
        Self::InvalidConverterArguments { name: name.to_string(), reason: reason.to_string() }
    }
}

/// Looking up a context attribute failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("attribute '{key}' is not set")]
    AttributeNotSet { key: String },

    #[error("attribute '{key}' is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

/// An error that maps directly onto an http response.
///
/// Handlers return it to abort the request with a given status, e.g.
/// `Err(HttpError::forbidden("missing token").into())`.
#[derive(Error, Debug, Clone)]
#[error("{} {}", .status.as_u16(), .description)]
pub struct HttpError {
    status: StatusCode,
    description: String,
    headers: HeaderMap,
}

impl HttpError {
    pub fn new<S: Into<String>>(status: StatusCode, description: S) -> Self {
        Self { status, description: description.into(), headers: HeaderMap::new() }
    }

    pub fn bad_request<S: Into<String>>(description: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, description)
    }

    pub fn forbidden<S: Into<String>>(description: S) -> Self {
        Self::new(StatusCode::FORBIDDEN, description)
    }

    pub fn not_found<S: Into<String>>(description: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, description)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Running the gateway from async code failed.
#[derive(Error, Debug)]
pub enum ServingError {
    #[error("the gateway no longer accepts requests")]
    Closed,

    #[error("handler chain failed: {source}")]
    Handler { source: HandlerError },

    #[error("blocking worker failed: {source}")]
    Worker {
        #[from]
        source: tokio::task::JoinError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_status_codes() {
        let not_found = DispatchError::from(RoutingError::NotFound { method: Method::GET, path: "/x".into() });
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.to_string(), "no route matches GET /x");

        let bad_request = DispatchError::bad_request(vec![FieldError::new("json_invalid", vec![], "EOF")]);
        assert_eq!(bad_request.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(bad_request.to_string(), "bad request: 1 validation error(s)");

        assert_eq!(DispatchError::endpoint("boom").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn field_error_serializes_type_key() {
        let error = FieldError::new("missing", vec!["body".into(), "name".into()], "Field required");
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json, serde_json::json!({"type": "missing", "loc": ["body", "name"], "msg": "Field required"}));
    }

    #[test]
    fn http_error_is_a_handler_error() {
        let error: HandlerError = HttpError::forbidden("missing token").into();
        let http_error = error.downcast_ref::<HttpError>().unwrap();
        assert_eq!(http_error.status(), StatusCode::FORBIDDEN);
        assert_eq!(error.to_string(), "403 missing token");
    }
}
