//! Promotes a fully written temp file to its final name.

use std::path::PathBuf;

use log::{info, warn};
use sha2::{Digest, Sha256};

use super::catalog::ModelDescriptor;
use super::executor::DownloadError;
use super::layout::{self, ModelLayout};

/// SHA-256 of a transfer, fed chunk by chunk as the executor writes the temp
/// file so promotion never has to read a multi-gigabyte file back.
#[derive(Default)]
pub(crate) struct ContentHash(Sha256);

impl ContentHash {
    pub(crate) fn update(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    /// Lowercase hex digest
    pub(crate) fn finish(self) -> String {
        format!("{:x}", self.0.finalize())
    }
}

/// Verify (when a checksum is declared), replace any existing final file,
/// rename the temp file into place and confirm the result exists.
///
/// `digest` is the hash of the bytes that went into the temp file; it must be
/// present whenever the descriptor declares a checksum.
pub async fn promote(
    layout: &ModelLayout,
    model: &ModelDescriptor,
    digest: Option<&str>,
) -> Result<PathBuf, DownloadError> {
    let temp_path = layout.temp_path(&model.filename);
    let final_path = layout.final_path(&model.filename);

    if !layout::exists(&temp_path).await {
        return Err(DownloadError::Finalize(format!(
            "temp file {:?} is missing",
            temp_path
        )));
    }

    if let Some(expected) = &model.sha256 {
        let actual = digest.ok_or_else(|| {
            DownloadError::Finalize(format!("no checksum computed for {}", model.filename))
        })?;
        if !actual.eq_ignore_ascii_case(expected) {
            warn!(
                "{}: checksum mismatch (expected {}, got {})",
                model.filename, expected, actual
            );
            if let Err(e) = layout::remove_if_exists(&temp_path).await {
                warn!("Failed to remove corrupt {:?}: {}", temp_path, e);
            }
            return Err(DownloadError::ChecksumMismatch {
                expected: expected.clone(),
                actual: actual.to_string(),
            });
        }
        info!("{}: checksum verified", model.filename);
    }

    layout::remove_if_exists(&final_path).await.map_err(|e| {
        DownloadError::Finalize(format!("failed to replace {:?}: {}", final_path, e))
    })?;

    tokio::fs::rename(&temp_path, &final_path)
        .await
        .map_err(|e| DownloadError::Finalize(format!("failed to rename temp file: {}", e)))?;

    if !layout::exists(&final_path).await {
        return Err(DownloadError::Finalize(format!(
            "{:?} missing after rename",
            final_path
        )));
    }

    info!("{} ready at {:?}", model.filename, final_path);
    Ok(final_path)
}
