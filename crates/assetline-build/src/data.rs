//! Per-page data resolution for templates.
//!
//! Every page sees two optional JSON documents: a shared globals document
//! and a document named after the template's file stem. Missing documents
//! are not errors. Nothing is cached; each call reads from disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

/// Default name of the shared data document.
pub const DEFAULT_GLOBALS_FILE: &str = "data.json";

/// Data handed to a template render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplateContext {
    /// Shared data, `None` when the globals document does not exist
    pub globals: Option<Value>,

    /// Page data, `None` when the page has no document
    pub context: Option<Value>,
}

/// Errors reading or parsing a data document.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Failed to read data document {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed data document {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl DataError {
    /// The document that failed.
    pub fn path(&self) -> &Path {
        match self {
            DataError::Read { path, .. } | DataError::Parse { path, .. } => path,
        }
    }
}

/// Resolves template data documents inside a data directory.
#[derive(Debug, Clone)]
pub struct DataResolver {
    data_dir: PathBuf,
    globals_file: String,
}

impl DataResolver {
    /// Create a resolver for `data_dir` with the given globals file name.
    pub fn new(data_dir: impl Into<PathBuf>, globals_file: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            globals_file: globals_file.into(),
        }
    }

    /// Location of the shared document.
    pub fn globals_path(&self) -> PathBuf {
        self.data_dir.join(&self.globals_file)
    }

    /// Location of the document for `template`: its file stem with a
    /// `.json` extension, looked up directly in the data directory.
    pub fn context_path(&self, template: &Path) -> Option<PathBuf> {
        let stem = template.file_stem()?;
        let mut name = stem.to_os_string();
        name.push(".json");
        Some(self.data_dir.join(name))
    }

    /// Build the context for one template render.
    pub fn resolve(&self, template: &Path) -> Result<TemplateContext, DataError> {
        Ok(TemplateContext {
            globals: self.load_globals()?,
            context: self.load_context(template)?,
        })
    }

    /// Load the shared document alone.
    pub fn load_globals(&self) -> Result<Option<Value>, DataError> {
        load_document(&self.globals_path())
    }

    /// Load the page document for `template` alone.
    pub fn load_context(&self, template: &Path) -> Result<Option<Value>, DataError> {
        match self.context_path(template) {
            Some(path) => load_document(&path),
            None => Ok(None),
        }
    }
}

/// Read and parse a JSON document, `None` if it does not exist.
fn load_document(path: &Path) -> Result<Option<Value>, DataError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("No data document at {}", path.display());
            return Ok(None);
        }
        Err(e) => {
            return Err(DataError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let value = serde_json::from_str(&content).map_err(|e| DataError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(Some(value))
}
