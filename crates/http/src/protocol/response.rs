//! The response value populated by the handler chain.
//!
//! Unlike `http::Response`, the status is optional: a response nobody produced yet has no
//! status and reads as `200 OK`, which lets response handlers fill in defaults without
//! overriding an explicit `200` set by an endpoint.

use crate::protocol::body::ResponseBody;
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;
use std::{fmt, io, mem};

type CloseCallback = Box<dyn FnOnce() + Send>;

/// Cleanup callbacks that run once the response has been sent or abandoned.
///
/// Callbacks run exactly once, either through [`CloseCallbacks::run`] or when dropped.
#[derive(Default)]
pub struct CloseCallbacks {
    callbacks: Vec<CloseCallback>,
}

impl CloseCallbacks {
    pub fn push<F>(&mut self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    pub fn append(&mut self, other: &mut CloseCallbacks) {
        self.callbacks.append(&mut other.callbacks);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn run(&mut self) {
        for callback in mem::take(&mut self.callbacks) {
            callback();
        }
    }
}

impl Drop for CloseCallbacks {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for CloseCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseCallbacks").field("len", &self.callbacks.len()).finish()
    }
}

#[derive(Debug, Default)]
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: ResponseBody,
    on_close: CloseCallbacks,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: StatusCode) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    /// Creates a response carrying `doc` serialized as json.
    pub fn for_json<T: Serialize + ?Sized>(doc: &T) -> Result<Self, serde_json::Error> {
        let mut response = Self::with_status(StatusCode::OK);
        response.set_json(doc)?;
        Ok(response)
    }

    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn is_status_unset(&self) -> bool {
        self.status.is_none()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn unset_status(&mut self) {
        self.status = None;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    pub fn set_body<B: Into<ResponseBody>>(&mut self, body: B) {
        self.body = body.into();
    }

    pub fn take_body(&mut self) -> ResponseBody {
        mem::take(&mut self.body)
    }

    pub fn set_data<B: Into<Bytes>>(&mut self, data: B) {
        self.body = ResponseBody::once(data.into());
    }

    /// Serializes `doc` into the body and sets the `application/json` content type.
    pub fn set_json<T: Serialize + ?Sized>(&mut self, doc: &T) -> Result<(), serde_json::Error> {
        let bytes = serde_json::to_vec(doc)?;
        self.set_data(bytes);
        self.set_json_content_type();
        Ok(())
    }

    pub fn set_json_value(&mut self, doc: &serde_json::Value) {
        self.set_data(doc.to_string());
        self.set_json_content_type();
    }

    fn set_json_content_type(&mut self) {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    /// Returns the whole body, buffering a streamed body on the way.
    pub fn data(&mut self) -> io::Result<Bytes> {
        if let Some(bytes) = self.body.as_bytes() {
            return Ok(bytes.clone());
        }

        let bytes = self.take_body().into_bytes()?;
        self.body = ResponseBody::once(bytes.clone());
        Ok(bytes)
    }

    /// Replaces the values of every header present in `headers`, keeping all the others.
    pub fn update_headers(&mut self, headers: HeaderMap) {
        let mut current = None;
        for (name, value) in headers {
            match name {
                Some(name) => {
                    self.headers.insert(name.clone(), value);
                    current = Some(name);
                }
                // further values of the previous header
                None => {
                    if let Some(name) = &current {
                        self.headers.append(name.clone(), value);
                    }
                }
            }
        }
    }

    /// Takes over the status, body and close callbacks of `other` and merges its headers.
    pub fn update_from(&mut self, mut other: Response) {
        self.status = other.status;
        self.body = other.take_body();
        self.on_close.append(&mut other.on_close);
        self.update_headers(mem::take(&mut other.headers));
    }

    pub fn call_on_close<F>(&mut self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_close.push(callback);
    }

    /// Runs the close callbacks registered so far.
    pub fn close(&mut self) {
        self.on_close.run();
    }

    /// Converts into an `http::Response` for the transport, which becomes responsible for the
    /// close callbacks.
    pub fn into_http(mut self) -> (http::Response<ResponseBody>, CloseCallbacks) {
        let mut response = http::Response::new(self.take_body());
        *response.status_mut() = self.status();
        *response.headers_mut() = mem::take(&mut self.headers);

        if let Some(length) = response.body().size_hint()
            && !response.headers().contains_key(CONTENT_LENGTH)
        {
            response.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(length));
        }

        (response, mem::take(&mut self.on_close))
    }
}
