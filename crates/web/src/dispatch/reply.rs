//! Coercion of endpoint results into responses.

use crate::dispatch::{Json, Validated};
use crate::error::{BoxError, DispatchError};
use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use switchyard_http::protocol::Response;

/// What a structured endpoint returned, before it becomes a [`Response`].
#[derive(Debug)]
pub enum Reply {
    Response(Response),
    Json(Value),
    Text(String),
    Bytes(Bytes),
    Empty,
}

impl Reply {
    /// Objects and arrays become json responses, strings and bytes raw bodies, null an
    /// empty response. Scalars have no response form.
    ///
    /// Responses returned as they are keep their status, all others are `200 OK`.
    pub fn into_response(self) -> Result<Response, DispatchError> {
        let mut response = Response::with_status(StatusCode::OK);
        match self {
            Reply::Response(response) => return Ok(response),
            Reply::Json(value @ (Value::Object(_) | Value::Array(_))) => response.set_json_value(&value),
            Reply::Json(Value::Null) | Reply::Empty => {}
            Reply::Json(Value::String(text)) | Reply::Text(text) => response.set_data(text),
            Reply::Json(Value::Bool(_)) => return Err(DispatchError::UnsupportedResultType { kind: "boolean" }),
            Reply::Json(Value::Number(_)) => return Err(DispatchError::UnsupportedResultType { kind: "number" }),
            Reply::Bytes(bytes) => response.set_data(bytes),
        }
        Ok(response)
    }
}

/// Return types of structured endpoints.
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, DispatchError>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, DispatchError> {
        Ok(self)
    }
}

impl IntoReply for Response {
    fn into_reply(self) -> Result<Reply, DispatchError> {
        Ok(Reply::Response(self))
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, DispatchError> {
        Ok(Reply::Text(self))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, DispatchError> {
        Ok(Reply::Text(self.to_owned()))
    }
}

impl IntoReply for Bytes {
    fn into_reply(self) -> Result<Reply, DispatchError> {
        Ok(Reply::Bytes(self))
    }
}

impl IntoReply for Vec<u8> {
    fn into_reply(self) -> Result<Reply, DispatchError> {
        Ok(Reply::Bytes(Bytes::from(self)))
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, DispatchError> {
        Ok(Reply::Empty)
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> Result<Reply, DispatchError> {
        Ok(Reply::Json(self))
    }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, DispatchError> {
        serde_json::to_value(&self.0).map(Reply::Json).map_err(DispatchError::endpoint)
    }
}

impl<T: Serialize> IntoReply for Validated<T> {
    fn into_reply(self) -> Result<Reply, DispatchError> {
        Json(self.0).into_reply()
    }
}

impl<R: IntoReply> IntoReply for Option<R> {
    fn into_reply(self) -> Result<Reply, DispatchError> {
        match self {
            Some(reply) => reply.into_reply(),
            None => Ok(Reply::Empty),
        }
    }
}

impl<R: IntoReply, E: Into<BoxError>> IntoReply for Result<R, E> {
    fn into_reply(self) -> Result<Reply, DispatchError> {
        self.map_err(DispatchError::endpoint)?.into_reply()
    }
}
