use std::io;

use tokio::sync::oneshot;

use super::manager::ManagerError;

/// Commands accepted by the download scheduler.
/// Sent through an unbounded channel and processed strictly in order.
#[derive(Debug)]
pub enum Command {
    /// Queue a model for download (no-op if already queued or active)
    Start { filename: String },
    /// Withdraw a queued model, or signal the active transfer to stop
    Cancel { filename: String },
    /// Stop any transfer for the model and remove its local files.
    /// `done`, when given, receives the outcome of the removal.
    Delete {
        filename: String,
        done: Option<oneshot::Sender<io::Result<()>>>,
    },
    /// Re-scan the models directory and rebuild the records
    Refresh {
        done: oneshot::Sender<Result<(), ManagerError>>,
    },
    /// Cancel everything and stop the loop
    Shutdown { done: oneshot::Sender<()> },
}

impl Command {
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Start { filename }
            | Self::Cancel { filename }
            | Self::Delete { filename, .. } => Some(filename),
            Self::Refresh { .. } | Self::Shutdown { .. } => None,
        }
    }
}
