//! Request and response payloads.
//!
//! - [`RequestBody`]: the request payload, buffered or read lazily from a blocking source
//! - [`ResponseBody`]: the response payload, a single buffer or an iterator of chunks

mod request_body;
mod response_body;

pub use request_body::RequestBody;
pub use response_body::ResponseBody;
