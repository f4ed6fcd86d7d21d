use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, info, warn};

use crate::{RetryPolicy, TransferBody, Transport, TransportError};

/// Timeouts and retry behaviour for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    /// Maximum idle time between two body reads.
    pub read_timeout: Duration,
    /// Whole-request deadline. `None` for multi-GB files where any fixed
    /// deadline would be arbitrary.
    pub total_timeout: Option<Duration>,
    pub retry: RetryPolicy,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            total_timeout: None,
            retry: RetryPolicy::default(),
            user_agent: format!("modeldock/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(config.user_agent);

        if let Some(total) = config.total_timeout {
            builder = builder.timeout(total);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            client,
            retry: config.retry,
        })
    }

    fn is_retryable(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &str) -> Result<TransferBody, TransportError> {
        let mut attempt: u32 = 0;

        loop {
            debug!("GET {} (attempt {})", url, attempt + 1);

            match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => {
                    let content_length = response.content_length();
                    info!(
                        "Opened {} (status {}, length {:?})",
                        url,
                        response.status(),
                        content_length
                    );

                    let stream = response.bytes_stream().map(|chunk| {
                        chunk.map_err(|e| {
                            if e.is_timeout() {
                                io::Error::new(io::ErrorKind::TimedOut, e)
                            } else {
                                io::Error::other(e)
                            }
                        })
                    });

                    return Ok(TransferBody::new(content_length, stream));
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !(RetryPolicy::is_retryable_status(status)
                        && self.retry.allows_retry(attempt))
                    {
                        return Err(TransportError::Status {
                            status,
                            attempts: attempt + 1,
                        });
                    }
                    warn!("GET {} answered {}, retrying", url, status);
                }
                Err(e) => {
                    if !(Self::is_retryable(&e) && self.retry.allows_retry(attempt)) {
                        return Err(TransportError::Request {
                            attempts: attempt + 1,
                            timed_out: e.is_timeout(),
                            message: e.to_string(),
                        });
                    }
                    warn!("GET {} failed: {}, retrying", url, e);
                }
            }

            tokio::time::sleep(self.retry.delay_for(attempt)).await;
            attempt += 1;
        }
    }
}
