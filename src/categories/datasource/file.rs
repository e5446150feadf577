//! Files and byte stores
//!
//! A [`File`] is a logical path plus a declared format. A [`FileStore`] turns a
//! file into raw bytes; the ingestion layer never touches storage directly.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Declared format of a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Delimited text with a header row
    Csv,
    /// JSON document
    Json,
}

impl FileKind {
    /// Guess the kind from a path's extension (case-insensitive)
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(FileKind::Csv),
            "json" => Some(FileKind::Json),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileKind::Csv => f.write_str("csv"),
            FileKind::Json => f.write_str("json"),
        }
    }
}

/// A source file: logical path and declared kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct File {
    /// Full logical path, `/`-separated
    pub path: String,
    /// Declared format
    pub kind: FileKind,
}

impl File {
    pub fn new(path: impl Into<String>, kind: FileKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Build a file whose kind is taken from the extension
    pub fn from_path(path: impl Into<String>) -> Option<Self> {
        let path = path.into();
        let kind = FileKind::from_path(&path)?;
        Some(Self { path, kind })
    }

    /// Cache key
    pub fn full_path(&self) -> &str {
        &self.path
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Identifier for the variable this file materializes as
    pub fn derive_variable_name(&self) -> String {
        crate::core::variable::derive_variable_name(self.name())
    }
}

/// Byte store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileStoreError {
    /// Nothing stored under the path
    #[error("File not found: {0}")]
    NotFound(String),

    /// Storage failed while reading
    #[error("IO error reading {path}: {message}")]
    Io { path: String, message: String },
}

/// Byte-fetch capability consumed by ingestion
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Fetch the raw bytes of a file
    async fn get_file_data(&self, file: &File) -> Result<Vec<u8>, FileStoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-process byte store keyed by path
///
/// Counts fetches, which makes it useful for checking cache behavior.
#[derive(Clone, Default)]
pub struct MemoryFileStore {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    fetches: Arc<AtomicUsize>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the bytes under `path`
    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.write().insert(path.into(), bytes.into());
    }

    /// Delete the bytes under `path`
    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        self.files.write().remove(path)
    }

    /// Number of `get_file_data` calls served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn get_file_data(&self, file: &File) -> Result<Vec<u8>, FileStoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.files
            .read()
            .get(file.full_path())
            .cloned()
            .ok_or_else(|| FileStoreError::NotFound(file.path.clone()))
    }
}

// ---------------------------------------------------------------------------
// Directory store
// ---------------------------------------------------------------------------

/// Reads files relative to a root directory
#[derive(Debug, Clone)]
pub struct DirectoryFileStore {
    root: PathBuf,
}

impl DirectoryFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a logical path under the root. Absolute paths and `..`
    /// segments are refused so lookups cannot leave the root.
    fn resolve(&self, logical: &str) -> Option<PathBuf> {
        let relative = Path::new(logical.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(resolved)
    }
}

#[async_trait]
impl FileStore for DirectoryFileStore {
    async fn get_file_data(&self, file: &File) -> Result<Vec<u8>, FileStoreError> {
        let path = self
            .resolve(file.full_path())
            .ok_or_else(|| FileStoreError::NotFound(file.path.clone()))?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FileStoreError::NotFound(file.path.clone()),
            _ => FileStoreError::Io {
                path: file.path.clone(),
                message: e.to_string(),
            },
        })
    }
}
