//! The request value handed to the gateway by transport adapters.
//!
//! A [`Request`] is built from an `http::Request<B>` and stays read-only for handlers, except
//! for its environment: an [`Extensions`] bag where transports leave extras such as the
//! [`RawUri`] as it appeared on the wire, the [`OriginalHeaders`] casing, or the websocket
//! channel of an upgrade request.

use crate::protocol::BodyError;
use crate::protocol::body::RequestBody;
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use http::{Extensions, HeaderMap, HeaderName, Method, Uri, Version};
use serde::de::DeserializeOwned;
use std::borrow::Cow;

/// The request target exactly as received, before any normalization by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUri(pub String);

/// Header names in the casing they had on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginalHeaders {
    names: Vec<String>,
}

impl OriginalHeaders {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { names: names.into_iter().map(Into::into).collect() }
    }

    /// Returns the wire casing of `name`, if the header was received.
    pub fn original_name(&self, name: &HeaderName) -> Option<&str> {
        self.names.iter().map(String::as_str).find(|candidate| candidate.eq_ignore_ascii_case(name.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: RequestBody,
    environment: Extensions,
}

impl<B> From<http::Request<B>> for Request
where
    B: Into<RequestBody>,
{
    fn from(request: http::Request<B>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body: body.into(),
            environment: parts.extensions,
        }
    }
}

impl Request {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub(crate) fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The host the request was sent to: the `Host` header, falling back to the uri authority.
    pub fn host(&self) -> &str {
        self.headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .or_else(|| self.uri.authority().map(http::uri::Authority::as_str))
            .unwrap_or_default()
    }

    pub fn scheme(&self) -> &str {
        self.uri.scheme_str().unwrap_or("http")
    }

    /// The path in its percent-encoded form.
    pub fn raw_path(&self) -> &str {
        match self.environment.get::<RawUri>() {
            Some(RawUri(raw)) => strip_raw_target(raw),
            None => self.uri.path(),
        }
    }

    /// The percent-decoded path. Invalid utf-8 sequences leave the raw path untouched.
    pub fn path(&self) -> Cow<'_, str> {
        let raw = self.raw_path();
        urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
    }

    pub fn query_string(&self) -> &str {
        self.uri.query().unwrap_or_default()
    }

    pub fn query<T: DeserializeOwned>(&self) -> Result<T, serde_urlencoded::de::Error> {
        serde_urlencoded::from_str(self.query_string())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers.get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
    }

    pub fn content_type(&self) -> Option<mime::Mime> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()?.parse().ok()
    }

    /// Reads the body. The underlying source is consumed once and the bytes are cached.
    pub fn data(&self) -> Result<&Bytes, BodyError> {
        self.body.data()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, BodyError> {
        serde_json::from_slice(self.data()?).map_err(BodyError::invalid_body)
    }

    pub fn environment(&self) -> &Extensions {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Extensions {
        &mut self.environment
    }

    pub fn original_headers(&self) -> Option<&OriginalHeaders> {
        self.environment.get::<OriginalHeaders>()
    }
}

/// Reduces a raw request target (origin or absolute form) to its path.
fn strip_raw_target(raw: &str) -> &str {
    let target = raw.split_once(['?', '#']).map_or(raw, |(path, _)| path);

    match target.split_once("://") {
        Some((_scheme, rest)) if !target.starts_with('/') => rest.find('/').map_or("/", |index| &rest[index..]),
        _ => target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn request(uri: &str) -> Request {
        Request::from(http::Request::get(uri).header(HOST, "localhost:8080").body(()).unwrap())
    }

    #[test]
    fn raw_and_decoded_path() {
        let request = request("/files/a%2Fb%20c?x=1");

        assert_eq!(request.raw_path(), "/files/a%2Fb%20c");
        assert_eq!(request.path(), "/files/a/b c");
        assert_eq!(request.query_string(), "x=1");
    }

    #[test]
    fn raw_uri_from_environment_wins() {
        let mut request = request("/normalized/path");
        request.environment_mut().insert(RawUri("/original%2Fpath?q=1".to_string()));
        assert_eq!(request.raw_path(), "/original%2Fpath");

        request.environment_mut().insert(RawUri("http://example.com/absolute%20form".to_string()));
        assert_eq!(request.raw_path(), "/absolute%20form");
    }

    #[test]
    fn host_from_header_or_authority() {
        assert_eq!(request("/").host(), "localhost:8080");

        let request = Request::from(http::Request::get("http://example.org/x").body(()).unwrap());
        assert_eq!(request.host(), "example.org");
        assert_eq!(request.scheme(), "http");

        let request = Request::from(http::Request::get("/x").body(()).unwrap());
        assert_eq!(request.host(), "");
    }

    #[test]
    fn query_deserialization() {
        #[derive(Deserialize)]
        struct Paging {
            page: u32,
            size: Option<u32>,
        }

        let paging: Paging = request("/items?page=3").query().unwrap();
        assert_eq!(paging.page, 3);
        assert_eq!(paging.size, None);
    }

    #[test]
    fn json_body() {
        #[derive(Deserialize)]
        struct Item {
            name: String,
        }

        let request = Request::from(
            http::Request::post("/items").header(CONTENT_LENGTH, "16").body(r#"{"name": "ball"}"#).unwrap(),
        );

        assert_eq!(request.content_length(), Some(16));
        let item: Item = request.json().unwrap();
        assert_eq!(item.name, "ball");
        // cached, readable again
        assert_eq!(request.data().unwrap().len(), 16);
    }

    #[test]
    fn invalid_json_body() {
        let request = Request::from(http::Request::post("/items").body("{").unwrap());
        let result: Result<serde_json::Value, _> = request.json();
        assert!(matches!(result, Err(BodyError::InvalidBody { .. })));
    }

    #[test]
    fn original_header_casing() {
        let mut request = request("/");
        request.environment_mut().insert(OriginalHeaders::new(["X-Custom-Header", "Host"]));

        let original = request.original_headers().unwrap();
        assert_eq!(original.original_name(&HeaderName::from_static("x-custom-header")), Some("X-Custom-Header"));
        assert_eq!(original.original_name(&HeaderName::from_static("accept")), None);
    }
}
