use bytes::{Bytes, BytesMut};
use std::fmt;
use std::io;

type ChunkStream = Box<dyn Iterator<Item = io::Result<Bytes>> + Send>;

/// Response payload, either a single buffer or a lazily produced chunk stream.
pub struct ResponseBody {
    inner: Kind,
}

enum Kind {
    Once(Option<Bytes>),
    Stream(ChunkStream),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { inner: Kind::Once(None) }
    }

    pub fn once(bytes: Bytes) -> Self {
        Self { inner: Kind::Once(Some(bytes)) }
    }

    pub fn stream<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = io::Result<Bytes>>,
        I::IntoIter: Send + 'static,
    {
        Self { inner: Kind::Stream(Box::new(chunks.into_iter())) }
    }

    /// Returns true when the body is a buffer without content. A stream is never empty.
    pub fn is_empty(&self) -> bool {
        match &self.inner {
            Kind::Once(None) => true,
            Kind::Once(Some(bytes)) => bytes.is_empty(),
            Kind::Stream(_) => false,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.inner, Kind::Stream(_))
    }

    /// The buffered bytes, or `None` when the body is a stream.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        static EMPTY: Bytes = Bytes::from_static(b"");
        match &self.inner {
            Kind::Once(Some(bytes)) => Some(bytes),
            Kind::Once(None) => Some(&EMPTY),
            Kind::Stream(_) => None,
        }
    }

    /// Collects the remaining content into one buffer.
    pub fn into_bytes(self) -> io::Result<Bytes> {
        match self.inner {
            Kind::Once(bytes) => Ok(bytes.unwrap_or_default()),
            Kind::Stream(chunks) => {
                let mut buf = BytesMut::new();
                for chunk in chunks {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    /// Exact content length, unknown for streams.
    pub fn size_hint(&self) -> Option<usize> {
        match &self.inner {
            Kind::Once(None) => Some(0),
            Kind::Once(Some(bytes)) => Some(bytes.len()),
            Kind::Stream(_) => None,
        }
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Kind::Once(bytes) => f.debug_tuple("ResponseBody::Once").field(bytes).finish(),
            Kind::Stream(_) => f.write_str("ResponseBody::Stream"),
        }
    }
}

impl Iterator for ResponseBody {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Kind::Once(option_bytes) => option_bytes.take().filter(|bytes| !bytes.is_empty()).map(Ok),
            Kind::Stream(chunks) => chunks.next(),
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::once(bytes)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::once(Bytes::from(bytes))
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        Self::once(Bytes::from(value))
    }
}

impl From<()> for ResponseBody {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

impl From<Option<Bytes>> for ResponseBody {
    fn from(option: Option<Bytes>) -> Self {
        match option {
            Some(bytes) => Self::once(bytes),
            None => Self::empty(),
        }
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        if value.is_empty() { Self::empty() } else { Self::once(Bytes::from_static(value.as_bytes())) }
    }
}
