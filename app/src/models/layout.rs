use std::io;
use std::path::{Path, PathBuf};

/// Suffix of in-progress files. It is the only signal the reconciler uses
/// to recognise a transfer abandoned by an earlier process.
pub const TEMP_SUFFIX: &str = ".downloading";

/// On-disk naming for the models directory:
/// - final file: `models_dir/{filename}`
/// - in-progress file: `models_dir/{filename}.downloading`
#[derive(Debug, Clone)]
pub struct ModelLayout {
    models_dir: PathBuf,
}

impl ModelLayout {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn final_path(&self, filename: &str) -> PathBuf {
        self.models_dir.join(filename)
    }

    pub fn temp_path(&self, filename: &str) -> PathBuf {
        self.models_dir.join(format!("{}{}", filename, TEMP_SUFFIX))
    }

    /// Create the models directory if it doesn't exist
    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.models_dir).await
    }

    pub fn is_temp_name(name: &str) -> bool {
        name.ends_with(TEMP_SUFFIX)
    }
}

/// Remove a file, treating "already gone" as success.
pub async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Existence check that doesn't block the runtime.
pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
