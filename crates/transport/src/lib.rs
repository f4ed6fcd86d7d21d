//! Streamed HTTP transport for large model files.
//!
//! This crate provides the network half of model acquisition: open a plain
//! GET, report the declared length (if any), and hand back the body as a
//! stream of byte chunks. Connect/read timeouts and a bounded retry on
//! transient failures live here, so callers only ever see a final outcome.
//!
//! # Example
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use modeldock_transport::{HttpTransport, Transport, TransportConfig};
//!
//! # async fn demo() -> Result<(), modeldock_transport::TransportError> {
//! let transport = HttpTransport::new(TransportConfig::default())?;
//! let mut body = transport.open("https://example.com/model.gguf").await?;
//! println!("declared length: {:?}", body.content_length);
//! while let Some(chunk) = body.stream.next().await {
//!     let chunk = chunk?;
//!     println!("got {} bytes", chunk.len());
//! }
//! # Ok(())
//! # }
//! ```

mod body;
mod http;
mod retry;

pub use body::TransferBody;
pub use http::{HttpTransport, TransportConfig};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a transport once its own retries are exhausted.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("Request failed after {attempts} attempt(s): {message}")]
    Request {
        attempts: u32,
        timed_out: bool,
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("Server responded with status {status} after {attempts} attempt(s)")]
    Status { status: u16, attempts: u32 },

    /// Reading the body failed mid-stream.
    #[error("Body read failed: {0}")]
    Body(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the failure was a timeout at any stage.
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Request { timed_out, .. } => *timed_out,
            TransportError::Body(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

/// A source of remote model bytes.
///
/// Implementations must be cheap to share across tasks; the download
/// executor holds one behind an `Arc` for the lifetime of the manager.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a streamed GET for `url`.
    async fn open(&self, url: &str) -> Result<TransferBody, TransportError>;
}
