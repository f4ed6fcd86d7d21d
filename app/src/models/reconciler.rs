use std::io;
use std::path::PathBuf;

use log::{debug, info, warn};

use super::catalog::Catalog;
use super::layout::{self, ModelLayout};
use super::ModelState;

#[derive(Debug)]
pub struct Reconciliation {
    /// One fresh record per catalog entry, in catalog order
    pub states: Vec<ModelState>,
    /// Temp files removed by the sweep
    pub swept: Vec<PathBuf>,
}

/// Rebuild the per-model records from what is on disk.
///
/// Every `*.downloading` file in the models directory is treated as
/// abandoned and removed, except the temp file of `active` (the model
/// currently being transferred, if any). Removal failures are logged and
/// skipped.
pub async fn reconcile(
    layout: &ModelLayout,
    catalog: &Catalog,
    active: Option<&str>,
) -> io::Result<Reconciliation> {
    layout.ensure_dir().await?;

    let protected = active.map(|filename| layout.temp_path(filename));
    let mut swept = Vec::new();
    let mut entries = tokio::fs::read_dir(layout.models_dir()).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_temp = entry
            .file_name()
            .to_str()
            .is_some_and(ModelLayout::is_temp_name);
        if !is_temp || protected.as_ref() == Some(&path) {
            continue;
        }

        match layout::remove_if_exists(&path).await {
            Ok(true) => {
                debug!("Removed stale temp file {:?}", path);
                swept.push(path);
            }
            Ok(false) => {}
            Err(e) => warn!("Failed to remove stale temp file {:?}: {}", path, e),
        }
    }

    if !swept.is_empty() {
        info!("Swept {} abandoned download(s)", swept.len());
    }

    let mut states = Vec::with_capacity(catalog.len());
    for model in catalog.entries() {
        let final_path = layout.final_path(&model.filename);
        let is_downloaded = tokio::fs::metadata(&final_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        states.push(if is_downloaded {
            ModelState::downloaded(model.clone())
        } else {
            ModelState::idle(model.clone())
        });
    }

    Ok(Reconciliation { states, swept })
}
