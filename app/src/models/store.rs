use tokio::sync::watch;

use super::status::DownloadStatus;
use super::ModelState;

/// Holds one record per model and publishes whole-list snapshots.
///
/// There is exactly one writer: the scheduler task owns the store. Readers
/// get a `watch::Receiver`, which replays the latest snapshot on subscribe
/// and never exposes a half-updated list.
#[derive(Debug)]
pub struct StateStore {
    tx: watch::Sender<Vec<ModelState>>,
}

impl StateStore {
    pub fn new(initial: Vec<ModelState>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ModelState>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Vec<ModelState> {
        self.tx.borrow().clone()
    }

    pub fn status_of(&self, filename: &str) -> Option<DownloadStatus> {
        self.tx
            .borrow()
            .iter()
            .find(|s| s.filename() == filename)
            .map(|s| s.status)
    }

    /// Apply `transform` to the record for `filename` and publish a new
    /// snapshot if anything changed. Returns false for unknown filenames.
    pub fn update(&self, filename: &str, transform: impl FnOnce(&mut ModelState)) -> bool {
        let mut found = false;
        self.tx.send_if_modified(|list| {
            let Some(state) = list.iter_mut().find(|s| s.filename() == filename) else {
                return false;
            };
            found = true;
            let before = state.clone();
            transform(state);
            *state != before
        });

        debug_assert!(
            self.tx
                .borrow()
                .iter()
                .filter(|s| s.status == DownloadStatus::Downloading)
                .count()
                <= 1,
            "more than one model is downloading"
        );

        found
    }

    /// Replace the whole list (used by the reconciler)
    pub fn replace(&self, list: Vec<ModelState>) {
        self.tx.send_replace(list);
    }
}
