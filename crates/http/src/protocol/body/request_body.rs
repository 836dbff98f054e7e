//! Lazily readable request body.
//!
//! Transport adapters hand the body over either as an in-memory buffer or as a blocking
//! [`Read`] source. The source is drained at most once, on first access, and the bytes
//! are cached so that later handlers in the chain can read the same payload again.

use crate::protocol::BodyError;
use bytes::Bytes;
use once_cell::sync::OnceCell;
use std::fmt;
use std::io::Read;
use std::sync::Mutex;

type BodySource = Box<dyn Read + Send>;

pub struct RequestBody {
    cached: OnceCell<Bytes>,
    source: Mutex<Option<BodySource>>,
}

impl RequestBody {
    pub fn empty() -> Self {
        Self::once(Bytes::new())
    }

    pub fn once(bytes: Bytes) -> Self {
        Self { cached: OnceCell::with_value(bytes), source: Mutex::new(None) }
    }

    /// Creates a body that reads from `reader` the first time the data is requested.
    pub fn reader<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self { cached: OnceCell::new(), source: Mutex::new(Some(Box::new(reader))) }
    }

    /// Returns true once the body bytes are available without touching the source.
    pub fn is_buffered(&self) -> bool {
        self.cached.get().is_some()
    }

    /// Reads the whole body, draining the source on the first call.
    ///
    /// A source that failed while being read is gone, later calls return
    /// [`BodyError::Consumed`].
    pub fn data(&self) -> Result<&Bytes, BodyError> {
        self.cached.get_or_try_init(|| {
            let mut guard = self.source.lock().map_err(BodyError::unavailable)?;
            let mut reader = guard.take().ok_or(BodyError::Consumed)?;

            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            Ok(Bytes::from(buf))
        })
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cached.get() {
            Some(bytes) => f.debug_struct("RequestBody").field("len", &bytes.len()).finish(),
            None => f.debug_struct("RequestBody").field("len", &"unread").finish(),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::once(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::once(Bytes::from(bytes))
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        Self::once(Bytes::from(value))
    }
}

impl From<&'static str> for RequestBody {
    fn from(value: &'static str) -> Self {
        Self::once(Bytes::from_static(value.as_bytes()))
    }
}

impl From<&'static [u8]> for RequestBody {
    fn from(value: &'static [u8]) -> Self {
        Self::once(Bytes::from_static(value))
    }
}

impl From<()> for RequestBody {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away"))
        }
    }

    #[test]
    fn reader_is_drained_once_and_cached() {
        let body = RequestBody::reader(io::Cursor::new(b"hello world".to_vec()));
        assert!(!body.is_buffered());

        assert_eq!(body.data().unwrap().as_ref(), b"hello world");
        assert!(body.is_buffered());
        assert_eq!(body.data().unwrap().as_ref(), b"hello world");
    }

    #[test]
    fn failed_reader_is_not_restartable() {
        let body = RequestBody::reader(FailingReader);

        assert!(matches!(body.data(), Err(BodyError::Io { .. })));
        assert!(matches!(body.data(), Err(BodyError::Consumed)));
    }

    #[test]
    fn empty_body() {
        let body = RequestBody::from(());
        assert!(body.data().unwrap().is_empty());
    }
}
