use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use modeldock_transport::Transport;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::catalog::{Catalog, ModelDescriptor};
use super::commands::Command;
use super::executor::{TransferExecutor, TransferSettings};
use super::layout::ModelLayout;
use super::reconciler;
use super::scheduler::Scheduler;
use super::store::StateStore;
use super::ModelState;

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("model {0} is not in the catalog")]
    UnknownModel(String),
    #[error("failed to scan models directory: {0}")]
    Reconcile(#[source] io::Error),
    #[error("could not delete {filename}: {source}")]
    Delete {
        filename: String,
        #[source]
        source: io::Error,
    },
    #[error("download scheduler is no longer running")]
    Stopped,
}

/// Manages model downloads, storage, and status tracking.
///
/// Thin handle over the scheduler task: every mutating call is a command
/// posted to the scheduler, processed in the order received. Observers read
/// snapshots from a `watch` channel.
pub struct ModelManager {
    command_tx: mpsc::UnboundedSender<Command>,
    models: watch::Receiver<Vec<ModelState>>,
    catalog: Arc<Catalog>,
    layout: ModelLayout,
    scheduler: JoinHandle<()>,
}

impl ModelManager {
    /// Scan the models directory, publish the initial snapshot and spawn the
    /// scheduler. Must be called inside a tokio runtime.
    pub async fn start(
        catalog: Catalog,
        layout: ModelLayout,
        transport: Arc<dyn Transport>,
        settings: TransferSettings,
    ) -> Result<Self, ManagerError> {
        let initial = reconciler::reconcile(&layout, &catalog, None)
            .await
            .map_err(ManagerError::Reconcile)?;
        info!(
            "Models directory: {:?} ({} models, {} stale temp files removed)",
            layout.models_dir(),
            catalog.len(),
            initial.swept.len()
        );

        let catalog = Arc::new(catalog);
        let store = StateStore::new(initial.states);
        let models = store.subscribe();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let executor = TransferExecutor::new(transport, layout.clone(), settings);
        let scheduler = Scheduler::new(command_rx, store, catalog.clone(), executor);

        Ok(Self {
            command_tx,
            models,
            catalog,
            layout,
            scheduler: tokio::spawn(scheduler.run()),
        })
    }

    /// Live per-model state; the current snapshot is available immediately.
    pub fn observe_models(&self) -> watch::Receiver<Vec<ModelState>> {
        self.models.clone()
    }

    pub fn snapshot(&self) -> Vec<ModelState> {
        self.models.borrow().clone()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn models_dir(&self) -> &Path {
        self.layout.models_dir()
    }

    /// Re-scan disk. Resolves once the new snapshot has been published.
    pub async fn refresh(&self) -> Result<(), ManagerError> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Refresh { done })?;
        rx.await.map_err(|_| ManagerError::Stopped)?
    }

    pub fn start_download(&self, model: &ModelDescriptor) -> Result<(), ManagerError> {
        let filename = self.known(model)?;
        self.send(Command::Start { filename })
    }

    pub fn cancel_download(&self, model: &ModelDescriptor) -> Result<(), ManagerError> {
        let filename = self.known(model)?;
        self.send(Command::Cancel { filename })
    }

    pub fn delete_local(&self, model: &ModelDescriptor) -> Result<(), ManagerError> {
        let filename = self.known(model)?;
        self.send(Command::Delete {
            filename,
            done: None,
        })
    }

    /// Like [`delete_local`](Self::delete_local), but resolves once the files
    /// are gone and reports a failed removal. The model's record is left in
    /// `Error` in that case.
    pub async fn delete_and_wait(&self, model: &ModelDescriptor) -> Result<(), ManagerError> {
        let filename = self.known(model)?;
        let (done, rx) = oneshot::channel();
        self.send(Command::Delete {
            filename: filename.clone(),
            done: Some(done),
        })?;
        rx.await
            .map_err(|_| ManagerError::Stopped)?
            .map_err(|source| ManagerError::Delete { filename, source })
    }

    /// Path of the final file if it is on disk right now
    pub fn local_path_for(&self, model: &ModelDescriptor) -> Option<PathBuf> {
        let path = self.layout.final_path(&model.filename);
        path.is_file().then_some(path)
    }

    /// Cancel the active transfer, drop the queue and wait for the scheduler
    /// to exit.
    pub async fn shutdown(self) -> Result<(), ManagerError> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Shutdown { done })?;
        let _ = rx.await;
        self.scheduler.await.map_err(|_| ManagerError::Stopped)
    }

    fn known(&self, model: &ModelDescriptor) -> Result<String, ManagerError> {
        if self.catalog.contains(&model.filename) {
            Ok(model.filename.clone())
        } else {
            Err(ManagerError::UnknownModel(model.filename.clone()))
        }
    }

    fn send(&self, command: Command) -> Result<(), ManagerError> {
        self.command_tx
            .send(command)
            .map_err(|_| ManagerError::Stopped)
    }
}
