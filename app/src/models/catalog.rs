use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::layout::TEMP_SUFFIX;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Which class of device a model is sized for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelCategory {
    Desktop,
    Mobile,
    Compact,
}

/// Static information about a model available for download.
/// Loaded once and never changes at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    /// Human-readable name (e.g., "Llama 3.2 1B Instruct")
    pub name: String,
    /// Filename on disk, also the unique key of the model
    pub filename: String,
    /// Download URL
    pub source_url: String,
    /// Expected size in bytes. Only a hint for display; the server's
    /// declared length drives progress.
    pub size_bytes: u64,
    /// Markdown description of the model
    #[serde(default)]
    pub description: String,
    /// Quantization method (e.g., "Q4_K_M", "F16")
    #[serde(default)]
    pub quantization: String,
    /// Emoji badges for capabilities
    #[serde(default)]
    pub capabilities: String,
    pub category: ModelCategory,
    /// SHA-256 checksum (hex string), verified before the file is promoted
    #[serde(default)]
    pub sha256: Option<String>,
}

impl ModelDescriptor {
    /// Size hint formatted as GiB, e.g. "4.9 GiB"
    pub fn size_readable(&self) -> String {
        format!("{:.1} GiB", self.size_bytes as f64 / GIB)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog is empty")]
    Empty,
    #[error("Duplicate filename in catalog: {0}")]
    DuplicateFilename(String),
    #[error("Invalid model filename: {0:?}")]
    InvalidFilename(String),
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read-only list of downloadable models, keyed by filename.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<ModelDescriptor>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate or unsafe filenames.
    pub fn new(entries: Vec<ModelDescriptor>) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            if !is_valid_filename(&entry.filename) {
                return Err(CatalogError::InvalidFilename(entry.filename.clone()));
            }
            if !seen.insert(entry.filename.as_str()) {
                return Err(CatalogError::DuplicateFilename(entry.filename.clone()));
            }
        }

        Ok(Self { entries })
    }

    /// Load a catalog from a JSON array of descriptors
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<ModelDescriptor> = serde_json::from_str(&raw)?;
        Self::new(entries)
    }

    /// The curated catalog shipped with the app
    pub fn builtin() -> Self {
        Self {
            entries: builtin_models(),
        }
    }

    pub fn get(&self, filename: &str) -> Option<&ModelDescriptor> {
        self.entries.iter().find(|e| e.filename == filename)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.get(filename).is_some()
    }

    pub fn entries(&self) -> &[ModelDescriptor] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A filename must stay inside the models directory and must not collide
/// with the in-progress naming scheme.
fn is_valid_filename(filename: &str) -> bool {
    !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.ends_with(TEMP_SUFFIX)
}

fn gib(value: f64) -> u64 {
    (value * GIB) as u64
}

fn builtin_models() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor {
            name: "Llama 3 Groq 8B Tool Use".into(),
            filename: "Llama-3-Groq-8B-Tool-Use-Q4_K_M.gguf".into(),
            source_url: "https://huggingface.co/bartowski/Llama-3-Groq-8B-Tool-Use-GGUF/resolve/main/Llama-3-Groq-8B-Tool-Use-Q4_K_M.gguf".into(),
            size_bytes: gib(4.9),
            description: "## Llama 3 Groq 8B Tool Use\n\nLlama 3 fine-tuned for tool calling and function execution.".into(),
            quantization: "Q4_K_M".into(),
            capabilities: "📝 🔧 🖥️".into(),
            category: ModelCategory::Desktop,
            sha256: None,
        },
        ModelDescriptor {
            name: "Gemma 3n E4B IT".into(),
            filename: "gemma-3n-E4B-it-Q4_K_M.gguf".into(),
            source_url: "https://huggingface.co/unsloth/gemma-3n-E4B-it-GGUF/resolve/main/gemma-3n-E4B-it-Q4_K_M.gguf?download=true".into(),
            size_bytes: gib(4.5),
            description: "## Gemma 3n E4B Instruction Tuned\n\nCompact 4B instruction-tuned model with a good balance of speed and quality.".into(),
            quantization: "Q4_K_M".into(),
            capabilities: "📝 🔧 📱".into(),
            category: ModelCategory::Mobile,
            sha256: None,
        },
        ModelDescriptor {
            name: "Gemma 3n E2B IT".into(),
            filename: "gemma-3n-E2B-it-Q5_K_M.gguf".into(),
            source_url: "https://huggingface.co/unsloth/gemma-3n-E2B-it-GGUF/resolve/main/gemma-3n-E2B-it-Q5_K_M.gguf?download=true".into(),
            size_bytes: gib(3.3),
            description: "## Gemma 3n E2B Instruction Tuned\n\nLightweight 2B model with a low memory footprint, aimed at mobile and edge devices.".into(),
            quantization: "Q5_K_M".into(),
            capabilities: "📝 🔧 📱".into(),
            category: ModelCategory::Mobile,
            sha256: None,
        },
        ModelDescriptor {
            name: "Llama 3.2 3B Instruct".into(),
            filename: "Llama-3.2-3B-Instruct-Q5_K_M.gguf".into(),
            source_url: "https://huggingface.co/unsloth/Llama-3.2-3B-Instruct-GGUF/resolve/main/Llama-3.2-3B-Instruct-Q5_K_M.gguf?download=true".into(),
            size_bytes: gib(2.3),
            description: "## Llama 3.2 3B Instruct\n\nCompact instruction-tuned model from the Llama 3.2 series.".into(),
            quantization: "Q5_K_M".into(),
            capabilities: "📝 🔧 🖥️".into(),
            category: ModelCategory::Desktop,
            sha256: None,
        },
        ModelDescriptor {
            name: "Llama 3.2 1B Instruct".into(),
            filename: "Llama-3.2-1B-Instruct-Q5_K_M.gguf".into(),
            source_url: "https://huggingface.co/unsloth/Llama-3.2-1B-Instruct-GGUF/resolve/main/Llama-3.2-1B-Instruct-Q5_K_M.gguf?download=true".into(),
            size_bytes: gib(0.9),
            description: "## Llama 3.2 1B Instruct\n\nSmallest Llama 3.2 model, good for simple conversational tasks.".into(),
            quantization: "Q5_K_M".into(),
            capabilities: "📝 📟".into(),
            category: ModelCategory::Compact,
            sha256: None,
        },
        ModelDescriptor {
            name: "Gemma 3 270m IT".into(),
            filename: "gemma-3-270m-it-F16.gguf".into(),
            source_url: "https://huggingface.co/unsloth/gemma-3-270m-it-GGUF/resolve/main/gemma-3-270m-it-F16.gguf?download=true".into(),
            size_bytes: gib(0.5),
            description: "## Gemma 3 270M Instruction Tuned\n\nUltra-lightweight model, handy for testing and development.".into(),
            quantization: "F16".into(),
            capabilities: "📝 📟".into(),
            category: ModelCategory::Compact,
            sha256: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(filename: &str) -> ModelDescriptor {
        ModelDescriptor {
            name: filename.to_uppercase(),
            filename: filename.into(),
            source_url: format!("https://example.com/{}", filename),
            size_bytes: 1024,
            description: String::new(),
            quantization: String::new(),
            capabilities: String::new(),
            category: ModelCategory::Compact,
            sha256: None,
        }
    }

    #[test]
    fn builtin_catalog_has_unique_filenames() {
        let catalog = Catalog::builtin();
        let rebuilt = Catalog::new(catalog.entries().to_vec());
        assert!(rebuilt.is_ok(), "builtin catalog should validate");
        assert_eq!(catalog.len(), 6);
    }

    #[test]
    fn lookup_by_filename() {
        let catalog = Catalog::new(vec![descriptor("a.gguf"), descriptor("b.gguf")]).unwrap();
        assert_eq!(catalog.get("b.gguf").unwrap().name, "B.GGUF");
        assert!(catalog.get("c.gguf").is_none());
        assert!(catalog.contains("a.gguf"));
    }

    #[test]
    fn rejects_invalid_catalogs() {
        let test_cases = vec![
            ("empty", vec![]),
            ("duplicate", vec![descriptor("a.gguf"), descriptor("a.gguf")]),
            ("path traversal", vec![descriptor("../a.gguf")]),
            ("temp suffix", vec![descriptor("a.gguf.downloading")]),
            ("empty filename", vec![descriptor("")]),
        ];

        for (description, entries) in test_cases {
            assert!(
                Catalog::new(entries).is_err(),
                "{}: catalog should be rejected",
                description
            );
        }
    }

    #[test]
    fn parses_camel_case_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"[{
                "name": "Tiny",
                "filename": "tiny.gguf",
                "sourceUrl": "https://example.com/tiny.gguf",
                "sizeBytes": 2048,
                "category": "compact",
                "sha256": "abc"
            }]"#,
        )
        .unwrap();

        let catalog = Catalog::from_json_file(&path).unwrap();
        let tiny = catalog.get("tiny.gguf").unwrap();
        assert_eq!(tiny.size_bytes, 2048);
        assert_eq!(tiny.category, ModelCategory::Compact);
        assert_eq!(tiny.sha256.as_deref(), Some("abc"));
        assert!(tiny.description.is_empty());
    }

    #[test]
    fn size_is_formatted_in_gib() {
        let catalog = Catalog::builtin();
        let llama = catalog.get("Llama-3-Groq-8B-Tool-Use-Q4_K_M.gguf").unwrap();
        assert_eq!(llama.size_readable(), "4.9 GiB");
    }
}
