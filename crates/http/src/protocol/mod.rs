//! Request and response values exchanged between transports and the gateway.
//!
//! - [`Request`]: method, uri, headers, a lazily read body and an environment bag
//! - [`Response`]: an optional status, headers, a buffered or streamed body and close callbacks
//! - [`body`]: the payload types of both
//! - [`BodyError`]: failures while reading a request body

mod request;
pub use request::OriginalHeaders;
pub use request::RawUri;
pub use request::Request;

mod response;
pub use response::CloseCallbacks;
pub use response::Response;

mod error;
pub use error::BodyError;

pub mod body;
