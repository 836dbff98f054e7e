use std::io;
use thiserror::Error;

/// Errors raised while reading a request body.
#[derive(Error, Debug)]
pub enum BodyError {
    #[error("request body has already been consumed")]
    Consumed,

    #[error("request body source is unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl BodyError {
    pub fn unavailable<S: ToString>(str: S) -> Self {
        Self::Unavailable { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
