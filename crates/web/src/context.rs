//! The per-request state handed to every handler of a chain.

use crate::error::ContextError;
use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use switchyard_http::protocol::Request;

/// State created by the gateway for every request.
///
/// Custom contexts wrap a [`RequestContext`] or build their own attribute storage.
pub trait Context: Send + 'static {
    fn from_request(request: Request) -> Self;

    fn request(&self) -> &Request;
}

/// A request plus a bag of attributes that handlers use to pass values down the chain.
///
/// ```
/// use switchyard_http::protocol::Request;
/// use switchyard_web::context::{Context, RequestContext};
///
/// let mut context = RequestContext::from_request(Request::from(http::Request::get("/").body(()).unwrap()));
/// context.set("account", String::from("000000000000"));
///
/// assert_eq!(context.get::<String>("account").map(String::as_str), Some("000000000000"));
/// assert!(context.must_get::<String>("region").is_err());
/// ```
pub struct RequestContext {
    request: Request,
    attributes: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl RequestContext {
    pub fn new(request: Request) -> Self {
        Self { request, attributes: HashMap::new() }
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn into_request(self) -> Request {
        self.request
    }

    /// Sets attribute `key`, replacing any earlier value.
    pub fn set<K: Into<String>, T: Any + Send + Sync>(&mut self, key: K, value: T) {
        self.attributes.insert(key.into(), Box::new(value));
    }

    /// The value of `key`, or `None` when it is unset or holds another type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.attributes.get(key).and_then(|value| value.downcast_ref())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.attributes.get_mut(key).and_then(|value| value.downcast_mut())
    }

    /// The value of `key`, failing when it is unset or holds another type.
    pub fn must_get<T: Any>(&self, key: &str) -> Result<&T, ContextError> {
        let value = self.attributes.get(key).ok_or_else(|| ContextError::AttributeNotSet { key: key.to_owned() })?;
        value.downcast_ref().ok_or_else(|| ContextError::TypeMismatch { key: key.to_owned(), expected: type_name::<T>() })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Removes `key`, returning whether it was set.
    pub fn remove(&mut self, key: &str) -> bool {
        self.attributes.remove(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }
}

impl Context for RequestContext {
    fn from_request(request: Request) -> Self {
        Self::new(request)
    }

    fn request(&self) -> &Request {
        &self.request
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("RequestContext").field("request", &self.request).field("attributes", &keys).finish()
    }
}
