//! Shared fixtures: a scripted in-memory transport and a manager harness.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use modeldock_lib::models::{
    Catalog, DownloadStatus, ModelCategory, ModelDescriptor, ModelLayout, ModelManager,
    ModelState, TransferSettings,
};
use modeldock_transport::{TransferBody, Transport, TransportError};

pub const WAIT: Duration = Duration::from_secs(10);

pub fn url(filename: &str) -> String {
    format!("https://models.test/{}", filename)
}

pub fn descriptor(filename: &str) -> ModelDescriptor {
    ModelDescriptor {
        name: format!("Test {}", filename),
        filename: filename.to_string(),
        source_url: url(filename),
        size_bytes: 1024,
        description: String::new(),
        quantization: "Q4_K_M".to_string(),
        capabilities: String::new(),
        category: ModelCategory::Compact,
        sha256: None,
    }
}

pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// What the next `open` of a URL returns
pub enum Script {
    /// Whole body available immediately, delivered in `chunk`-sized pieces
    Body {
        content_length: Option<u64>,
        data: Vec<u8>,
        chunk: usize,
    },
    /// Body chunks pushed by the test through a [`Gate`]
    Gated {
        content_length: Option<u64>,
        rx: mpsc::UnboundedReceiver<io::Result<Bytes>>,
    },
    Fail(TransportError),
}

impl Script {
    pub fn body(data: Vec<u8>) -> Self {
        Script::Body {
            content_length: Some(data.len() as u64),
            data,
            chunk: 4096,
        }
    }

    pub fn gated(content_length: Option<u64>) -> (Self, Gate) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Script::Gated { content_length, rx }, Gate { tx })
    }

    pub fn status(status: u16) -> Self {
        Script::Fail(TransportError::Status {
            status,
            attempts: 1,
        })
    }
}

/// Test-side handle of a gated body. Dropping it ends the stream.
pub struct Gate {
    tx: mpsc::UnboundedSender<io::Result<Bytes>>,
}

impl Gate {
    /// Returns false once the reader side is gone
    pub fn push(&self, data: &[u8]) -> bool {
        self.tx.send(Ok(Bytes::copy_from_slice(data))).is_ok()
    }

    pub fn fail(&self, message: &str) {
        let _ = self.tx.send(Err(io::Error::other(message.to_string())));
    }

    /// Keep pushing `chunk` every `every` until the transfer drops the body.
    /// Cancellation is only observed between chunks, so cancel and delete
    /// tests need a steady trickle.
    pub fn trickle(self, chunk: Vec<u8>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            while self.push(&chunk) {
                tokio::time::sleep(every).await;
            }
        })
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    opened: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn script(&self, url: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(script);
    }

    /// URLs in the order they were opened
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, url: &str) -> Result<TransferBody, TransportError> {
        self.opened.lock().unwrap().push(url.to_string());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front());

        match script {
            Some(Script::Body {
                content_length,
                data,
                chunk,
            }) => {
                let chunks: Vec<io::Result<Bytes>> = data
                    .chunks(chunk.max(1))
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                Ok(TransferBody::new(content_length, stream::iter(chunks)))
            }
            Some(Script::Gated { content_length, rx }) => {
                let body = stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                Ok(TransferBody::new(content_length, body))
            }
            Some(Script::Fail(e)) => Err(e),
            None => Err(TransportError::Status {
                status: 404,
                attempts: 1,
            }),
        }
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub layout: ModelLayout,
    pub transport: Arc<ScriptedTransport>,
    pub manager: ModelManager,
}

impl Harness {
    /// Catalog `a.gguf`, `b.gguf`, `c.gguf` in a fresh temp directory
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::start_in(dir).await
    }

    /// Start over an existing directory (files may already be present)
    pub async fn start_in(dir: tempfile::TempDir) -> Self {
        let models = vec![descriptor("a.gguf"), descriptor("b.gguf"), descriptor("c.gguf")];
        Self::start_with(dir, models).await
    }

    pub async fn start_with(dir: tempfile::TempDir, models: Vec<ModelDescriptor>) -> Self {
        let layout = ModelLayout::new(dir.path().join("models"));
        let transport = Arc::new(ScriptedTransport::default());
        let manager = ModelManager::start(
            Catalog::new(models).unwrap(),
            layout.clone(),
            transport.clone(),
            TransferSettings {
                chunk_size: 1024,
                indeterminate_interval: Duration::from_millis(20),
            },
        )
        .await
        .unwrap();

        Self {
            dir,
            layout,
            transport,
            manager,
        }
    }

    pub fn model(&self, filename: &str) -> ModelDescriptor {
        self.manager.catalog().get(filename).cloned().unwrap()
    }

    pub fn final_path(&self, filename: &str) -> PathBuf {
        self.layout.final_path(filename)
    }

    pub fn temp_path(&self, filename: &str) -> PathBuf {
        self.layout.temp_path(filename)
    }

    pub fn state(&self, filename: &str) -> ModelState {
        find(&self.manager.snapshot(), filename)
    }

    /// Wait until `count` opens have been recorded
    pub async fn wait_opened(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.transport.opened().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {} opens", count));
    }
}

pub fn find(states: &[ModelState], filename: &str) -> ModelState {
    states
        .iter()
        .find(|s| s.filename() == filename)
        .cloned()
        .unwrap_or_else(|| panic!("no record for {}", filename))
}

pub async fn wait_until(
    rx: &mut watch::Receiver<Vec<ModelState>>,
    what: &str,
    predicate: impl FnMut(&Vec<ModelState>) -> bool,
) {
    tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", what))
        .map(|_| ())
        .unwrap_or_else(|_| panic!("state store closed while waiting for {}", what));
}

pub async fn wait_status(
    rx: &mut watch::Receiver<Vec<ModelState>>,
    filename: &str,
    status: DownloadStatus,
) {
    let what = format!("{} to be {}", filename, status);
    wait_until(rx, &what, |states| {
        states
            .iter()
            .any(|s| s.filename() == filename && s.status == status)
    })
    .await;
}

/// Records the highest number of simultaneously downloading models seen in
/// any published snapshot.
pub fn watch_downloading_count(mut rx: watch::Receiver<Vec<ModelState>>) -> Arc<AtomicUsize> {
    let max = Arc::new(AtomicUsize::new(0));
    let seen = max.clone();
    tokio::spawn(async move {
        loop {
            let count = rx
                .borrow_and_update()
                .iter()
                .filter(|s| s.status == DownloadStatus::Downloading)
                .count();
            seen.fetch_max(count, Ordering::SeqCst);
            if rx.changed().await.is_err() {
                break;
            }
        }
    });
    max
}
