//! Typed endpoint arguments.
//!
//! Every argument of a structured endpoint after the request implements [`FromCall`]:
//!
//! ```
//! use serde::Deserialize;
//! use switchyard_http::protocol::Request;
//! use switchyard_web::dispatch::{Json, Path, Query, endpoint};
//!
//! #[derive(Deserialize)]
//! struct ItemPath {
//!     id: i64,
//! }
//!
//! #[derive(Deserialize)]
//! struct Paging {
//!     limit: Option<u32>,
//! }
//!
//! fn list(_request: &Request, Path(path): Path<ItemPath>, Query(paging): Query<Paging>) -> String {
//!     format!("item {} limit {:?}", path.id, paging.limit)
//! }
//!
//! let endpoint = endpoint(list);
//! ```

use crate::dispatch::{BodyParameter, CallArgs, Signature};
use crate::error::{DispatchError, FieldError};
use crate::router::PathArgs;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Builds one endpoint argument from the request, the path arguments and the bound body.
pub trait FromCall: Sized {
    /// Records what the argument needs from the dispatcher, e.g. a parsed body.
    fn declare(_signature: &mut Signature) {}

    fn from_call(args: &CallArgs<'_>) -> Result<Self, DispatchError>;
}

impl FromCall for PathArgs {
    fn from_call(args: &CallArgs<'_>) -> Result<Self, DispatchError> {
        Ok(args.path().clone())
    }
}

/// The path arguments deserialized into `T`, one field per capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Path<T>(pub T);

impl<T: DeserializeOwned> FromCall for Path<T> {
    fn from_call(args: &CallArgs<'_>) -> Result<Self, DispatchError> {
        args.path().deserialize().map(Path).map_err(DispatchError::invalid_arguments)
    }
}

/// The query string deserialized into `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Query<T>(pub T);

impl<T: DeserializeOwned> FromCall for Query<T> {
    fn from_call(args: &CallArgs<'_>) -> Result<Self, DispatchError> {
        args.request().query().map(Query).map_err(|e| {
            DispatchError::bad_request(vec![FieldError::new("query_invalid", vec!["query".to_owned()], e.to_string())])
        })
    }
}

/// The json request body deserialized into `T`.
///
/// Returned from an endpoint, the value is serialized back into a json response.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: DeserializeOwned> FromCall for Json<T> {
    fn declare(signature: &mut Signature) {
        signature.declare_body(BodyParameter::new(std::any::type_name::<T>()));
    }

    fn from_call(args: &CallArgs<'_>) -> Result<Self, DispatchError> {
        bind_body(args).map(Json)
    }
}

/// A type describing its own json schema.
pub trait JsonSchema {
    fn json_schema() -> Value;
}

/// Like [`Json`], but the body is checked against `T::json_schema()` first when the
/// dispatcher validates schemas.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated<T>(pub T);

impl<T: DeserializeOwned + JsonSchema> FromCall for Validated<T> {
    fn declare(signature: &mut Signature) {
        signature.declare_body(BodyParameter::new(std::any::type_name::<T>()).with_schema(T::json_schema()));
    }

    fn from_call(args: &CallArgs<'_>) -> Result<Self, DispatchError> {
        bind_body(args).map(Validated)
    }
}

fn bind_body<T: DeserializeOwned>(args: &CallArgs<'_>) -> Result<T, DispatchError> {
    let body = args
        .body()
        .ok_or_else(|| DispatchError::invalid_arguments("the endpoint declares no request body"))?;

    T::deserialize(body).map_err(|e| {
        DispatchError::bad_request(vec![FieldError::new("value_error", vec!["body".to_owned()], e.to_string())])
    })
}
