use std::fmt;
use std::io;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

/// An opened remote body: the declared length plus the chunk stream.
pub struct TransferBody {
    /// Total size from `Content-Length`, when the server declared one.
    pub content_length: Option<u64>,
    /// Body chunks in arrival order. Chunk sizes are whatever the
    /// connection delivers; callers re-buffer as they see fit.
    pub stream: BoxStream<'static, io::Result<Bytes>>,
}

impl TransferBody {
    pub fn new<S>(content_length: Option<u64>, stream: S) -> Self
    where
        S: futures_util::Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            content_length,
            stream: stream.boxed(),
        }
    }

    /// Declared length, treating an explicit zero as unknown.
    pub fn known_length(&self) -> Option<u64> {
        self.content_length.filter(|len| *len > 0)
    }
}

impl fmt::Debug for TransferBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferBody")
            .field("content_length", &self.content_length)
            .field("stream", &"[stream]")
            .finish()
    }
}
