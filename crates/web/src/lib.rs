//! A handler chain gateway with a copy-on-write router.
//!
//! A [`Gateway`] holds four handler lists: request handlers, response handlers,
//! finalizers and exception handlers. Every request gets its own [`HandlerChain`] running
//! these lists over a [`RequestContext`] and a [`Response`](switchyard_http::protocol::Response).
//! Routing is one request handler among others: a [`RouterHandler`] matches the request
//! against a [`Router`] and dispatches it to an endpoint.
//!
//! # Example
//!
//! ```
//! use http::StatusCode;
//! use std::sync::Arc;
//! use switchyard_http::protocol::Request;
//! use switchyard_web::dispatch::{HandlerEndpoint, Path, endpoint, handler_dispatcher};
//! use switchyard_web::{EmptyResponseHandler, Gateway, HttpErrorHandler, Router, RouterHandler};
//!
//! #[derive(serde::Deserialize)]
//! struct ItemPath {
//!     id: i64,
//! }
//!
//! fn get_item(_request: &Request, Path(path): Path<ItemPath>) -> serde_json::Value {
//!     serde_json::json!({ "id": path.id })
//! }
//!
//! let router: Router<HandlerEndpoint> = Router::builder(handler_dispatcher()).build();
//! router.add(("/items/<int:id>", endpoint(get_item))).unwrap();
//!
//! let gateway: Gateway = Gateway::builder()
//!     .request_handler(RouterHandler::new(Arc::new(router)))
//!     .response_handler(EmptyResponseHandler::default())
//!     .exception_handler(HttpErrorHandler::default())
//!     .build();
//!
//! let mut response = gateway.handle(Request::from(http::Request::get("/items/42").body(()).unwrap())).unwrap();
//! assert_eq!(response.status(), StatusCode::OK);
//! assert_eq!(response.data().unwrap(), r#"{"id":42}"#);
//!
//! let response = gateway.handle(Request::from(http::Request::get("/items/abc").body(()).unwrap())).unwrap();
//! assert_eq!(response.status(), StatusCode::NOT_FOUND);
//! ```

pub mod context;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod router;
pub mod serving;

pub use context::{Context, RequestContext};
pub use error::{DispatchError, HandlerError, HttpError, RouteError, RoutingError};
pub use gateway::{
    ChainOptions, EmptyResponseHandler, ExceptionHandler, Gateway, GatewayBuilder, Handler, HandlerChain,
    HttpErrorHandler, RouterHandler,
};
pub use router::Router;
pub use serving::BlockingBridge;
