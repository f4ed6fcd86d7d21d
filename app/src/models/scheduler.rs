use std::collections::{HashSet, VecDeque};
use std::io;
use std::ops::ControlFlow;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::catalog::Catalog;
use super::commands::Command;
use super::events::{ProgressReporter, TransferEvent, TransferProgress};
use super::executor::{DownloadError, TransferExecutor, TransferOutcome};
use super::layout;
use super::manager::ManagerError;
use super::reconciler;
use super::status::{transition, DownloadEvent, DownloadStatus};
use super::store::StateStore;
use super::ModelState;

/// Result of one spawned transfer, including whether it left a temp file
struct TransferReport {
    result: Result<TransferOutcome, DownloadError>,
    has_partial_file: bool,
}

struct ActiveTransfer {
    filename: String,
    attempt: u64,
    cancel: CancellationToken,
    task: JoinHandle<TransferReport>,
}

/// Owns the queue, the active transfer and the state store.
///
/// Every mutation happens on this task, one command or event at a time, so
/// "at most one model downloading" holds without locks.
pub struct Scheduler {
    command_rx: UnboundedReceiver<Command>,
    progress_tx: UnboundedSender<TransferEvent>,
    progress_rx: UnboundedReceiver<TransferEvent>,
    store: StateStore,
    catalog: Arc<Catalog>,
    executor: TransferExecutor,
    active: Option<ActiveTransfer>,
    queue: VecDeque<String>,
    pending: HashSet<String>,
    next_attempt: u64,
}

impl Scheduler {
    pub fn new(
        command_rx: UnboundedReceiver<Command>,
        store: StateStore,
        catalog: Arc<Catalog>,
        executor: TransferExecutor,
    ) -> Self {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        Self {
            command_rx,
            progress_tx,
            progress_rx,
            store,
            catalog,
            executor,
            active: None,
            queue: VecDeque::new(),
            pending: HashSet::new(),
            next_attempt: 0,
        }
    }

    /// Main loop - consumes self, runs until Shutdown or all senders drop
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = self.progress_rx.recv() => self.apply_progress(event),
                joined = join_active(&mut self.active) => self.on_transfer_finished(joined),
            }
        }
        debug!("Download scheduler stopped");
    }

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        if let Some(filename) = command.filename() {
            if !self.catalog.contains(filename) {
                warn!("Ignoring {:?}: {} is not in the catalog", command, filename);
                return ControlFlow::Continue(());
            }
        }

        match command {
            Command::Start { filename } => self.handle_start(filename),
            Command::Cancel { filename } => self.handle_cancel(&filename),
            Command::Delete { filename, done } => {
                let result = self.handle_delete(&filename).await;
                if let Some(done) = done {
                    let _ = done.send(result);
                }
            }
            Command::Refresh { done } => {
                let result = self.handle_refresh().await;
                let _ = done.send(result);
            }
            Command::Shutdown { done } => {
                self.shutdown().await;
                let _ = done.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_start(&mut self, filename: String) {
        if self.is_active(&filename) || self.pending.contains(&filename) {
            debug!("{} is already queued or downloading", filename);
            return;
        }

        // A leftover temp file stays unowned until the transfer begins
        let queued = self.apply(&filename, DownloadEvent::Enqueue, |s| {
            s.progress = 0.0;
            s.status_message = Some("Queued".to_string());
        });
        if !queued {
            return;
        }

        info!("Queued {}", filename);
        self.pending.insert(filename.clone());
        self.queue.push_back(filename);
        self.advance();
    }

    fn handle_cancel(&mut self, filename: &str) {
        if let Some(active) = self.active.as_ref().filter(|a| a.filename == filename) {
            info!("Cancellation requested for {}", filename);
            active.cancel.cancel();
            return;
        }

        if self.pending.remove(filename) {
            self.queue.retain(|f| f != filename);
            self.apply(filename, DownloadEvent::Withdraw, |_| {});
            info!("Removed {} from the queue", filename);
            return;
        }

        debug!("Nothing to cancel for {}", filename);
    }

    async fn handle_delete(&mut self, filename: &str) -> io::Result<()> {
        let mut freed_slot = false;
        if self.is_active(filename) {
            if let Some(active) = self.active.take() {
                active.cancel.cancel();
                match active.task.await {
                    Ok(report) => debug!(
                        "{} transfer stopped for delete: {:?}",
                        filename,
                        report.result.map_err(|e| e.to_string())
                    ),
                    Err(e) => warn!("{} transfer task failed during delete: {}", filename, e),
                }
                freed_slot = true;
            }
        }

        if self.pending.remove(filename) {
            self.queue.retain(|f| f != filename);
        }

        let layout = self.executor.layout();
        let mut failure = None;
        for path in [layout.final_path(filename), layout.temp_path(filename)] {
            if let Err(e) = layout::remove_if_exists(&path).await {
                error!("Failed to delete {:?}: {}", path, e);
                failure = Some(e);
            }
        }

        let result = match failure {
            None => {
                self.apply(filename, DownloadEvent::Delete, |s| {
                    s.progress = 0.0;
                    s.has_partial_file = false;
                    s.clear_transfer();
                });
                info!("Deleted local files for {}", filename);
                Ok(())
            }
            Some(e) => {
                self.apply(filename, DownloadEvent::DeleteFailed, |s| {
                    s.clear_transfer();
                    s.error_message = Some(format!("Could not delete model files: {}", e));
                });
                Err(e)
            }
        };

        if freed_slot {
            self.advance();
        }
        result
    }

    async fn handle_refresh(&mut self) -> Result<(), ManagerError> {
        let active = self.active.as_ref().map(|a| a.filename.clone());
        let reconciliation = reconciler::reconcile(
            self.executor.layout(),
            &self.catalog,
            active.as_deref(),
        )
        .await
        .map_err(ManagerError::Reconcile)?;

        // In-flight records describe work the scheduler still owns
        let current = self.store.snapshot();
        let merged = reconciliation
            .states
            .into_iter()
            .map(|fresh| {
                let keep = active.as_deref() == Some(fresh.filename())
                    || self.pending.contains(fresh.filename());
                if keep {
                    current
                        .iter()
                        .find(|s| s.filename() == fresh.filename())
                        .cloned()
                        .unwrap_or(fresh)
                } else {
                    fresh
                }
            })
            .collect();
        self.store.replace(merged);
        Ok(())
    }

    /// Launch the queue head if nothing is running
    fn advance(&mut self) {
        if self.active.is_some() {
            return;
        }

        while let Some(filename) = self.queue.pop_front() {
            self.pending.remove(&filename);
            let Some(model) = self.catalog.get(&filename).cloned() else {
                continue;
            };

            let began = self.apply(&filename, DownloadEvent::Begin, |s| {
                s.progress = 0.0;
                s.has_partial_file = false;
                s.clear_transfer();
            });
            if !began {
                continue;
            }

            self.next_attempt += 1;
            let attempt = self.next_attempt;
            let cancel = CancellationToken::new();
            let reporter =
                ProgressReporter::new(attempt, filename.clone(), self.progress_tx.clone());
            let executor = self.executor.clone();
            let token = cancel.clone();

            let task = tokio::spawn(async move {
                let result = executor.run(&model, &token, &reporter).await;
                let has_partial_file =
                    layout::exists(&executor.layout().temp_path(&model.filename)).await;
                TransferReport {
                    result,
                    has_partial_file,
                }
            });

            info!("Started {} (attempt {})", filename, attempt);
            self.active = Some(ActiveTransfer {
                filename,
                attempt,
                cancel,
                task,
            });
            return;
        }
    }

    fn apply_progress(&mut self, event: TransferEvent) {
        let current = self
            .active
            .as_ref()
            .is_some_and(|a| a.attempt == event.attempt && a.filename == event.filename);
        if !current {
            debug!("Dropping stale progress for {} (attempt {})", event.filename, event.attempt);
            return;
        }

        self.store.update(&event.filename, |s| {
            if s.status != DownloadStatus::Downloading {
                return;
            }
            match event.progress {
                TransferProgress::Opened { indeterminate } => {
                    s.progress_indeterminate = indeterminate;
                    s.progress = 0.0;
                }
                TransferProgress::Progress {
                    fraction,
                    bytes_per_second,
                    eta_seconds,
                } => {
                    s.progress_indeterminate = false;
                    s.progress = fraction.max(s.progress);
                    s.bytes_per_second = Some(bytes_per_second);
                    s.eta_seconds = eta_seconds;
                }
                TransferProgress::Throughput { bytes_per_second } => {
                    s.progress_indeterminate = true;
                    s.bytes_per_second = Some(bytes_per_second);
                    s.eta_seconds = None;
                }
            }
        });
    }

    fn on_transfer_finished(&mut self, joined: Result<TransferReport, JoinError>) {
        let Some(active) = self.active.take() else {
            return;
        };
        let filename = active.filename;

        // Progress queued behind the join belongs to a finished attempt
        while let Ok(event) = self.progress_rx.try_recv() {
            debug!("Discarding late progress for {} (attempt {})", event.filename, event.attempt);
        }

        let (result, has_partial_file) = match joined {
            Ok(report) => (report.result, report.has_partial_file),
            Err(e) => (Err(DownloadError::Panicked(e.to_string())), false),
        };

        match result {
            Ok(TransferOutcome::Completed | TransferOutcome::AlreadyPresent) => {
                self.apply(&filename, DownloadEvent::Complete, |s| {
                    s.progress = 1.0;
                    s.has_partial_file = false;
                    s.clear_transfer();
                });
                info!("{} downloaded", filename);
            }
            Ok(TransferOutcome::Cancelled) => {
                self.apply(&filename, DownloadEvent::Cancelled, |s| {
                    s.has_partial_file = has_partial_file;
                    s.clear_transfer();
                });
                info!("{} cancelled", filename);
            }
            Err(e) => {
                error!("{} failed: {}", filename, e);
                let message = e.user_message();
                self.apply(&filename, DownloadEvent::Fail, |s| {
                    s.has_partial_file = has_partial_file;
                    s.clear_transfer();
                    s.error_message = Some(message);
                });
            }
        }

        self.advance();
    }

    async fn shutdown(&mut self) {
        for filename in std::mem::take(&mut self.queue) {
            self.pending.remove(&filename);
            self.apply(&filename, DownloadEvent::Withdraw, |_| {});
        }

        if let Some(active) = self.active.as_ref() {
            info!("Shutting down, cancelling {}", active.filename);
            active.cancel.cancel();
            let joined = join_active(&mut self.active).await;
            self.on_transfer_finished(joined);
        }
    }

    /// Run one state-machine transition, then let `extra` adjust the record.
    /// Returns false (and logs) when the transition is rejected.
    fn apply(
        &self,
        filename: &str,
        event: DownloadEvent,
        extra: impl FnOnce(&mut ModelState),
    ) -> bool {
        let Some(current) = self.store.status_of(filename) else {
            warn!("No record for {}", filename);
            return false;
        };

        match transition(current, event) {
            Ok(next) => {
                self.store.update(filename, |s| {
                    if s.status != next {
                        s.status_message = None;
                    }
                    if next != DownloadStatus::Error {
                        s.error_message = None;
                    }
                    s.status = next;
                    extra(s);
                });
                true
            }
            Err(rejection) => {
                warn!("{}: {}", filename, rejection);
                false
            }
        }
    }

    fn is_active(&self, filename: &str) -> bool {
        self.active.as_ref().is_some_and(|a| a.filename == filename)
    }
}

/// Resolves when the active transfer's task ends; pending forever when idle.
async fn join_active(active: &mut Option<ActiveTransfer>) -> Result<TransferReport, JoinError> {
    match active {
        Some(transfer) => (&mut transfer.task).await,
        None => std::future::pending().await,
    }
}
