mod catalog;
mod commands;
pub mod events;
mod executor;
mod finalizer;
mod layout;
mod manager;
mod reconciler;
mod scheduler;
mod status;
mod store;

pub use catalog::{Catalog, CatalogError, ModelCategory, ModelDescriptor};
pub use executor::{DownloadError, TransferExecutor, TransferOutcome, TransferSettings};
pub use layout::{ModelLayout, TEMP_SUFFIX};
pub use manager::{ManagerError, ModelManager};
pub use status::{transition, DownloadEvent, DownloadStatus, TransitionRejection};

use std::sync::Arc;

use serde::Serialize;

/// Per-model view handed to the UI (descriptor + download state merged).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelState {
    pub model: Arc<ModelDescriptor>,
    pub status: DownloadStatus,
    /// Fraction in [0, 1]; meaningful while downloading with a known size
    pub progress: f64,
    /// True when the server did not declare a length
    pub progress_indeterminate: bool,
    pub bytes_per_second: Option<u64>,
    pub eta_seconds: Option<u64>,
    /// A temp file exists that no running transfer owns
    pub has_partial_file: bool,
    /// Set only in `Error`
    pub error_message: Option<String>,
    /// Transient note such as "Queued", cleared on the next status change
    pub status_message: Option<String>,
}

impl ModelState {
    pub fn idle(model: ModelDescriptor) -> Self {
        Self {
            model: Arc::new(model),
            status: DownloadStatus::Idle,
            progress: 0.0,
            progress_indeterminate: false,
            bytes_per_second: None,
            eta_seconds: None,
            has_partial_file: false,
            error_message: None,
            status_message: None,
        }
    }

    pub fn downloaded(model: ModelDescriptor) -> Self {
        Self {
            status: DownloadStatus::Downloaded,
            progress: 1.0,
            ..Self::idle(model)
        }
    }

    pub fn filename(&self) -> &str {
        &self.model.filename
    }

    /// Forget everything specific to a transfer attempt
    pub(crate) fn clear_transfer(&mut self) {
        self.progress_indeterminate = false;
        self.bytes_per_second = None;
        self.eta_seconds = None;
    }
}
