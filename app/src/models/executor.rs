use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use modeldock_transport::{Transport, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use super::catalog::ModelDescriptor;
use super::events::{ProgressReporter, TransferProgress};
use super::finalizer::{self, ContentHash};
use super::layout::{self, ModelLayout};

/// Fixed read size for the transfer loop; cancellation is checked between reads
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
/// Throughput report interval when the server sent no length
pub const DEFAULT_INDETERMINATE_INTERVAL: Duration = Duration::from_millis(750);

/// Minimum progress delta between two known-size reports
const PROGRESS_STEP: f64 = 0.01;
/// At or above this fraction a report is always sent
const COMPLETE_THRESHOLD: f64 = 0.999;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferSettings {
    pub chunk_size: usize,
    pub indeterminate_interval: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            indeterminate_interval: DEFAULT_INDETERMINATE_INTERVAL,
        }
    }
}

/// How a transfer ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Bytes streamed and the file promoted
    Completed,
    /// Final file already on disk, nothing fetched
    AlreadyPresent,
    /// Cancellation observed between chunks; the temp file is left in place
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to read response body: {0}")]
    Read(#[source] io::Error),
    #[error("failed to write temp file: {0}")]
    Write(#[source] io::Error),
    #[error("stream ended after {received} of {expected} bytes")]
    Incomplete { expected: u64, received: u64 },
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("failed to finalize download: {0}")]
    Finalize(String),
    #[error("download task panicked: {0}")]
    Panicked(String),
}

impl DownloadError {
    /// Short text suitable for the `errorMessage` field
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(TransportError::Status { status, .. }) => {
                format!("Server responded with HTTP {}", status)
            }
            Self::Transport(e) if e.is_timeout() => "Connection timed out".to_string(),
            Self::Transport(_) | Self::Read(_) => {
                "Network error, check your connection and try again".to_string()
            }
            Self::Write(_) => "Could not write to the models folder".to_string(),
            Self::Incomplete { .. } => "Download was interrupted".to_string(),
            Self::ChecksumMismatch { .. } => "Downloaded file is corrupted".to_string(),
            Self::Finalize(_) => "Could not save the downloaded model".to_string(),
            Self::Panicked(_) => "Download failed unexpectedly".to_string(),
        }
    }
}

/// Streams one model into its temp file and hands it to the finalizer.
///
/// The executor only ever reports through its [`ProgressReporter`]; it never
/// writes to the state store. Cancellation is cooperative: the token is
/// checked before opening and after every chunk, never mid-read.
#[derive(Clone)]
pub struct TransferExecutor {
    transport: Arc<dyn Transport>,
    layout: ModelLayout,
    settings: TransferSettings,
}

impl TransferExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        layout: ModelLayout,
        settings: TransferSettings,
    ) -> Self {
        Self {
            transport,
            layout,
            settings: TransferSettings {
                chunk_size: settings.chunk_size.max(1),
                ..settings
            },
        }
    }

    pub fn layout(&self) -> &ModelLayout {
        &self.layout
    }

    pub async fn run(
        &self,
        model: &ModelDescriptor,
        cancel: &CancellationToken,
        reporter: &ProgressReporter,
    ) -> Result<TransferOutcome, DownloadError> {
        let final_path = self.layout.final_path(&model.filename);
        let temp_path = self.layout.temp_path(&model.filename);

        if layout::exists(&final_path).await {
            info!("{} already present, skipping transfer", model.filename);
            return Ok(TransferOutcome::AlreadyPresent);
        }

        self.layout.ensure_dir().await.map_err(DownloadError::Write)?;
        // Restarts are from byte zero
        layout::remove_if_exists(&temp_path)
            .await
            .map_err(DownloadError::Write)?;

        if cancel.is_cancelled() {
            return Ok(TransferOutcome::Cancelled);
        }

        info!("Downloading {} from {}", model.filename, model.source_url);
        let body = self.transport.open(&model.source_url).await?;
        let total = body.known_length();
        reporter.report(TransferProgress::Opened {
            indeterminate: total.is_none(),
        });

        let file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(DownloadError::Write)?;
        let mut writer = BufWriter::new(file);
        let mut reader = StreamReader::new(body.stream);
        let mut buffer = vec![0u8; self.settings.chunk_size];
        let mut tracker =
            ProgressTracker::new(total, Instant::now(), self.settings.indeterminate_interval);
        let mut hash = model.sha256.as_ref().map(|_| ContentHash::default());

        loop {
            if cancel.is_cancelled() {
                writer.flush().await.map_err(DownloadError::Write)?;
                info!(
                    "{} cancelled after {} bytes",
                    model.filename,
                    tracker.bytes()
                );
                return Ok(TransferOutcome::Cancelled);
            }

            let read = reader.read(&mut buffer).await.map_err(DownloadError::Read)?;
            if read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..read])
                .await
                .map_err(DownloadError::Write)?;
            if let Some(hash) = hash.as_mut() {
                hash.update(&buffer[..read]);
            }

            if let Some(progress) = tracker.record(read as u64, Instant::now()) {
                reporter.report(progress);
            }
        }

        writer.flush().await.map_err(DownloadError::Write)?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(DownloadError::Write)?;

        if cancel.is_cancelled() {
            return Ok(TransferOutcome::Cancelled);
        }

        if let Some(expected) = total {
            if tracker.bytes() < expected {
                warn!(
                    "{}: body ended early ({}/{} bytes)",
                    model.filename,
                    tracker.bytes(),
                    expected
                );
                return Err(DownloadError::Incomplete {
                    expected,
                    received: tracker.bytes(),
                });
            }
        }

        debug!("{}: {} bytes written, finalizing", model.filename, tracker.bytes());
        let digest = hash.map(ContentHash::finish);
        finalizer::promote(&self.layout, model, digest.as_deref()).await?;
        Ok(TransferOutcome::Completed)
    }
}

/// Decides when a chunk produces a progress report.
///
/// Known size: report on the first chunk, whenever progress has moved at
/// least one percentage point since the last report, and on reaching
/// completion. Unknown size: report throughput every `interval`.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    total: Option<u64>,
    bytes: u64,
    last_fraction: Option<f64>,
    last_report_at: Instant,
    last_report_bytes: u64,
    interval: Duration,
}

impl ProgressTracker {
    pub(crate) fn new(total: Option<u64>, now: Instant, interval: Duration) -> Self {
        Self {
            total,
            bytes: 0,
            last_fraction: None,
            last_report_at: now,
            last_report_bytes: 0,
            interval,
        }
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }

    pub(crate) fn record(&mut self, n: u64, now: Instant) -> Option<TransferProgress> {
        self.bytes += n;

        match self.total {
            Some(total) => {
                let fraction = (self.bytes as f64 / total as f64).clamp(0.0, 1.0);
                let due = match self.last_fraction {
                    None => true,
                    Some(last) => {
                        fraction - last >= PROGRESS_STEP
                            || (fraction >= COMPLETE_THRESHOLD && fraction > last)
                    }
                };
                if !due {
                    return None;
                }

                let bytes_per_second = self.throughput(now);
                let remaining = total.saturating_sub(self.bytes);
                self.last_fraction = Some(fraction);
                Some(TransferProgress::Progress {
                    fraction,
                    bytes_per_second,
                    eta_seconds: (bytes_per_second > 0).then(|| remaining / bytes_per_second),
                })
            }
            None => {
                if now.duration_since(self.last_report_at) < self.interval {
                    return None;
                }
                Some(TransferProgress::Throughput {
                    bytes_per_second: self.throughput(now),
                })
            }
        }
    }

    /// Bytes per second since the previous report; resets the window.
    fn throughput(&mut self, now: Instant) -> u64 {
        let delta_bytes = self.bytes - self.last_report_bytes;
        let delta_ms = now.duration_since(self.last_report_at).as_millis().max(1) as u64;
        self.last_report_at = now;
        self.last_report_bytes = self.bytes;
        delta_bytes.saturating_mul(1000) / delta_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fraction_of(progress: Option<TransferProgress>) -> Option<f64> {
        match progress {
            Some(TransferProgress::Progress { fraction, .. }) => Some(fraction),
            _ => None,
        }
    }

    #[test]
    fn first_chunk_always_reports() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Some(1_000_000), start, Duration::from_secs(1));
        assert_eq!(fraction_of(tracker.record(1, start)), Some(0.000001));
    }

    #[test]
    fn reports_only_on_whole_percent_steps() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Some(1000), start, Duration::from_secs(1));

        assert!(tracker.record(1, start).is_some());
        assert!(tracker.record(5, start).is_none());
        assert!(tracker.record(4, start).is_none());
        assert_eq!(fraction_of(tracker.record(2, start)), Some(0.012));
        assert!(tracker.record(9, start).is_none());
    }

    #[test]
    fn completion_always_reports() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Some(10_000), start, Duration::from_secs(1));

        assert!(tracker.record(9_985, start).is_some());
        // 0.9985 -> 0.9995 is below one step but crosses the completion threshold
        assert_eq!(fraction_of(tracker.record(10, start)), Some(0.9995));
        assert_eq!(fraction_of(tracker.record(5, start)), Some(1.0));
        // Nothing left to report once at 1.0
        assert!(tracker.record(0, start).is_none());
    }

    #[test]
    fn reported_fractions_never_decrease() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Some(100_000), start, Duration::from_secs(1));
        let mut last = 0.0;
        for i in 0..200u64 {
            let now = start + Duration::from_millis(i * 10);
            if let Some(fraction) = fraction_of(tracker.record(500 + i, now)) {
                assert!(fraction >= last);
                assert!(fraction <= 1.0);
                last = fraction;
            }
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn throughput_and_eta_use_the_window_since_last_report() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Some(10_000), start, Duration::from_secs(1));

        let report = tracker.record(1_000, start + Duration::from_millis(500));
        assert_eq!(
            report,
            Some(TransferProgress::Progress {
                fraction: 0.1,
                bytes_per_second: 2_000,
                eta_seconds: Some(4),
            })
        );
    }

    #[test]
    fn indeterminate_mode_reports_on_interval() {
        let start = Instant::now();
        let interval = Duration::from_millis(750);
        let mut tracker = ProgressTracker::new(None, start, interval);

        assert!(tracker.record(1_000, start + Duration::from_millis(100)).is_none());
        assert!(tracker.record(1_000, start + Duration::from_millis(700)).is_none());
        assert_eq!(
            tracker.record(1_000, start + Duration::from_millis(1_000)),
            Some(TransferProgress::Throughput {
                bytes_per_second: 3_000
            })
        );
        assert!(tracker.record(1_000, start + Duration::from_millis(1_500)).is_none());
    }

    #[test]
    fn user_messages_are_short_and_specific() {
        let test_cases = vec![
            (
                DownloadError::Transport(TransportError::Status {
                    status: 404,
                    attempts: 1,
                }),
                "Server responded with HTTP 404",
            ),
            (
                DownloadError::Transport(TransportError::Request {
                    attempts: 4,
                    timed_out: true,
                    message: "operation timed out".to_string(),
                }),
                "Connection timed out",
            ),
            (
                DownloadError::Incomplete {
                    expected: 10,
                    received: 5,
                },
                "Download was interrupted",
            ),
            (
                DownloadError::ChecksumMismatch {
                    expected: "aa".to_string(),
                    actual: "bb".to_string(),
                },
                "Downloaded file is corrupted",
            ),
        ];

        for (error, expected) in test_cases {
            assert_eq!(error.user_message(), expected, "for {:?}", error);
        }
    }
}
