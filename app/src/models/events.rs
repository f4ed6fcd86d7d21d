//! Progress events sent from the transfer executor to the scheduler.
//!
//! The executor never touches the state store itself. It reports through an
//! unbounded channel, tagged with the attempt id it was launched with, and
//! the scheduler applies the event only if that attempt is still the active
//! one. Events from a cancelled or deleted attempt are dropped on arrival.

use log::trace;
use tokio::sync::mpsc::UnboundedSender;

/// What the executor observed since its last report
#[derive(Debug, Clone, PartialEq)]
pub enum TransferProgress {
    /// Response headers arrived; the mode for the rest of the attempt is known
    Opened { indeterminate: bool },
    /// Known-size mode: fraction done plus throughput since the last report
    Progress {
        fraction: f64,
        bytes_per_second: u64,
        eta_seconds: Option<u64>,
    },
    /// Indeterminate mode: throughput only
    Throughput { bytes_per_second: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferEvent {
    pub attempt: u64,
    pub filename: String,
    pub progress: TransferProgress,
}

/// Sending half handed to one executor run
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    attempt: u64,
    filename: String,
    tx: UnboundedSender<TransferEvent>,
}

impl ProgressReporter {
    pub fn new(attempt: u64, filename: String, tx: UnboundedSender<TransferEvent>) -> Self {
        Self {
            attempt,
            filename,
            tx,
        }
    }

    pub fn report(&self, progress: TransferProgress) {
        trace!("{} attempt {}: {:?}", self.filename, self.attempt, progress);
        // The scheduler outlives every executor except during shutdown,
        // where a lost progress event is irrelevant.
        let _ = self.tx.send(TransferEvent {
            attempt: self.attempt,
            filename: self.filename.clone(),
            progress,
        });
    }
}
