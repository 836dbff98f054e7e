//! Web primitives of the switchyard gateway.
//!
//! This crate holds the values that travel through a gateway: the [`protocol::Request`] a
//! transport builds for every incoming request, the [`protocol::Response`] the handler chain
//! populates, and the [`websocket`] types used to accept or reject upgrade requests.
//!
//! Transports own the wire: http parsing, TLS and websocket framing are not done here. A
//! transport converts its representation into an `http::Request`, hands the body over either
//! buffered or as a blocking reader, and writes back what [`protocol::Response::into_http`]
//! returns.
//!
//! # Example
//!
//! ```
//! use http::StatusCode;
//! use switchyard_http::protocol::{Request, Response};
//!
//! let request = Request::from(http::Request::post("/items?verbose=1").body(r#"{"name": "ball"}"#).unwrap());
//! assert_eq!(request.query_string(), "verbose=1");
//!
//! let doc: serde_json::Value = request.json().unwrap();
//!
//! let mut response = Response::with_status(StatusCode::CREATED);
//! response.set_json(&doc).unwrap();
//!
//! let (response, _on_close) = response.into_http();
//! assert_eq!(response.status(), StatusCode::CREATED);
//! ```

pub mod protocol;
pub mod websocket;

mod utils;
pub(crate) use utils::ensure;
