//! Workspace - a document's store together with its file access
//!
//! The workspace owns the parsed-file cache, so two documents never share
//! cached data and dropping the workspace drops the cache.

use std::sync::Arc;

use crate::categories::datasource::{CsvOptions, File, FileCache, FileInfo, FileStore, IngestError};
use crate::core::model::CellularModel;
use crate::core::store::{ModelStore, StoreError};

/// Blocks of one document plus the capability to read its files
#[derive(Clone)]
pub struct Workspace {
    store: ModelStore,
    files: Arc<dyn FileStore>,
    cache: FileCache,
}

impl Workspace {
    /// Open a document against a byte store
    pub fn new(model: CellularModel, files: Arc<dyn FileStore>) -> Result<Self, StoreError> {
        Self::with_csv_options(model, files, CsvOptions::default())
    }

    /// Open a document with a non-default CSV dialect
    pub fn with_csv_options(
        model: CellularModel,
        files: Arc<dyn FileStore>,
        csv: CsvOptions,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            store: ModelStore::new(model)?,
            files,
            cache: FileCache::new(csv),
        })
    }

    /// The document's block store
    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// The byte store
    pub fn files(&self) -> &Arc<dyn FileStore> {
        &self.files
    }

    /// The parsed-file cache
    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    /// Ingest a file through the cache
    pub async fn ingest(&self, file: &File) -> Result<Arc<FileInfo>, IngestError> {
        self.cache.ingest(file, self.files.clone()).await
    }
}
