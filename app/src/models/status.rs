//! Download state machine - single source of truth for valid transitions
//!
//! State diagram (per model):
//! ```text
//! Idle ──Enqueue──> Queued ──Begin──> Downloading ──Complete──> Downloaded
//!  ▲                  │                  │    │
//!  │               Withdraw          Cancelled Fail
//!  │                  │                  │    ▼
//!  └──────────────────┴──────────────────┘  Error ──Enqueue──> Queued
//!
//! Any ──Delete──> Idle
//! Any ──DeleteFailed──> Error
//! ```

use serde::{Deserialize, Serialize};

/// Download status of a single model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
pub enum DownloadStatus {
    #[default]
    Idle,
    Queued,
    Downloading,
    Downloaded,
    Error,
}

impl DownloadStatus {
    /// A status no transfer will move on its own
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Idle | Self::Downloaded | Self::Error)
    }
}

/// Events that can trigger status transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DownloadEvent {
    /// Start requested, model joins the queue
    Enqueue,
    /// Queue head handed to the executor
    Begin,
    /// Cancel requested before the transfer started
    Withdraw,
    /// Transfer finished and the file was promoted
    Complete,
    /// Executor acknowledged cancellation
    Cancelled,
    /// Transfer or promotion failed
    Fail,
    /// Local files removed
    Delete,
    /// Local files could not be removed
    DeleteFailed,
}

/// Reason a transition was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{attempted_event} event rejected in {current_status} status")]
pub struct TransitionRejection {
    pub current_status: DownloadStatus,
    pub attempted_event: DownloadEvent,
}

/// Pure function: compute the next status, or reject the event.
pub fn transition(
    current: DownloadStatus,
    event: DownloadEvent,
) -> Result<DownloadStatus, TransitionRejection> {
    use DownloadEvent as E;
    use DownloadStatus as S;

    let next = match (current, event) {
        (_, E::Delete) => Some(S::Idle),
        (_, E::DeleteFailed) => Some(S::Error),
        (S::Idle | S::Error, E::Enqueue) => Some(S::Queued),
        (S::Queued, E::Begin) => Some(S::Downloading),
        (S::Queued, E::Withdraw) => Some(S::Idle),
        (S::Downloading, E::Complete) => Some(S::Downloaded),
        (S::Downloading, E::Cancelled) => Some(S::Idle),
        (S::Downloading, E::Fail) => Some(S::Error),
        _ => None,
    };

    next.ok_or(TransitionRejection {
        current_status: current,
        attempted_event: event,
    })
}
