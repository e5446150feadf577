//! Parsed-file cache
//!
//! Memoizes [`FileInfo`] by full path. The cache belongs to one workspace and
//! is dropped with it. Concurrent ingests of the same uncached path share a
//! single fetch+parse: the first caller installs a shared future, later
//! callers await that same future.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::file::{File, FileKind, FileStore, FileStoreError};
use super::parser::{parse_csv, parse_json, CsvOptions, FileInfo, ParseError};

type LoadResult = Result<Arc<FileInfo>, IngestError>;
type PendingFuture = Shared<BoxFuture<'static, LoadResult>>;

/// Ingestion errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// The byte store has nothing under the path
    #[error("File not found: {path}")]
    NotFound { path: String },

    /// The byte store failed
    #[error("IO error reading {path}: {message}")]
    Io { path: String, message: String },

    /// The bytes do not match the declared kind
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },
}

impl IngestError {
    /// Error kind label used in run results
    pub fn kind_name(&self) -> &'static str {
        match self {
            IngestError::NotFound { .. } => "NotFound",
            IngestError::Io { .. } => "IOError",
            IngestError::Parse { .. } => "ParseError",
        }
    }

    /// Path of the file that failed
    pub fn path(&self) -> &str {
        match self {
            IngestError::NotFound { path }
            | IngestError::Io { path, .. }
            | IngestError::Parse { path, .. } => path,
        }
    }
}

impl From<FileStoreError> for IngestError {
    fn from(err: FileStoreError) -> Self {
        match err {
            FileStoreError::NotFound(path) => IngestError::NotFound { path },
            FileStoreError::Io { path, message } => IngestError::Io { path, message },
        }
    }
}

struct PendingLoad {
    ticket: u64,
    future: PendingFuture,
}

#[derive(Default)]
struct CacheState {
    ready: HashMap<String, Arc<FileInfo>>,
    pending: HashMap<String, PendingLoad>,
    next_ticket: u64,
}

/// Per-workspace cache of parsed files
#[derive(Clone)]
pub struct FileCache {
    state: Arc<Mutex<CacheState>>,
    csv: CsvOptions,
}

impl FileCache {
    /// Create an empty cache parsing CSV with `csv`
    pub fn new(csv: CsvOptions) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            csv,
        }
    }

    /// Return the cached [`FileInfo`] for `file`, fetching and parsing it on a miss.
    ///
    /// A hit never touches `store`. Failures are returned to every waiting
    /// caller and are not cached, so a retry after fixing the file succeeds.
    pub async fn ingest(&self, file: &File, store: Arc<dyn FileStore>) -> LoadResult {
        let future = {
            let mut state = self.state.lock();
            if let Some(info) = state.ready.get(file.full_path()) {
                debug!(path = %file.path, "file cache hit");
                return Ok(info.clone());
            }
            match state.pending.get(file.full_path()) {
                Some(pending) => {
                    debug!(path = %file.path, "joining in-flight load");
                    pending.future.clone()
                }
                None => {
                    debug!(path = %file.path, "file cache miss");
                    let ticket = state.next_ticket;
                    state.next_ticket += 1;
                    let future = load(
                        Arc::downgrade(&self.state),
                        ticket,
                        file.clone(),
                        store,
                        self.csv,
                    )
                    .boxed()
                    .shared();
                    state.pending.insert(
                        file.path.clone(),
                        PendingLoad {
                            ticket,
                            future: future.clone(),
                        },
                    );
                    future
                }
            }
        };
        future.await
    }

    /// CSV dialect used when parsing
    pub fn csv_options(&self) -> CsvOptions {
        self.csv
    }

    /// Cached entry for a path, without loading
    pub fn get(&self, path: &str) -> Option<Arc<FileInfo>> {
        self.state.lock().ready.get(path).cloned()
    }

    /// Drop the entry for `path`. A load already in flight for the path still
    /// completes for its callers but is not committed to the cache.
    pub fn invalidate(&self, path: &str) -> bool {
        let mut state = self.state.lock();
        let pending = state.pending.remove(path).is_some();
        let ready = state.ready.remove(path).is_some();
        pending || ready
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.ready.clear();
        state.pending.clear();
    }

    /// Number of committed entries
    pub fn len(&self) -> usize {
        self.state.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a load for `path` is in flight
    pub fn is_pending(&self, path: &str) -> bool {
        self.state.lock().pending.contains_key(path)
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new(CsvOptions::default())
    }
}

async fn load(
    state: Weak<Mutex<CacheState>>,
    ticket: u64,
    file: File,
    store: Arc<dyn FileStore>,
    csv: CsvOptions,
) -> LoadResult {
    let result = fetch_and_parse(&file, store.as_ref(), &csv).await.map(Arc::new);

    if let Some(state) = state.upgrade() {
        let mut state = state.lock();
        let still_current = state
            .pending
            .get(file.full_path())
            .is_some_and(|p| p.ticket == ticket);
        if still_current {
            state.pending.remove(file.full_path());
            if let Ok(info) = &result {
                state.ready.insert(file.path.clone(), info.clone());
            }
        }
    }

    match &result {
        Ok(info) => info!(path = %file.path, kind = %file.kind, ty = %info.ty, "built file info"),
        Err(e) => warn!(path = %file.path, error = %e, "file ingestion failed"),
    }
    result
}

async fn fetch_and_parse(
    file: &File,
    store: &dyn FileStore,
    csv: &CsvOptions,
) -> Result<FileInfo, IngestError> {
    let bytes = store.get_file_data(file).await?;
    let parsed = match file.kind {
        FileKind::Csv => parse_csv(&bytes, csv),
        FileKind::Json => parse_json(&bytes),
    };
    parsed.map_err(|source| IngestError::Parse {
        path: file.path.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::datasource::file::MemoryFileStore;
    use crate::core::types::{Column, Type};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Store that answers after a delay, to keep loads in flight
    struct SlowStore {
        inner: MemoryFileStore,
        delay: Duration,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl FileStore for SlowStore {
        async fn get_file_data(&self, file: &File) -> Result<Vec<u8>, FileStoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.inner.get_file_data(file).await
        }
    }

    fn slow_store(path: &str, bytes: &[u8]) -> Arc<SlowStore> {
        let inner = MemoryFileStore::new();
        inner.insert(path, bytes.to_vec());
        Arc::new(SlowStore {
            inner,
            delay: Duration::from_millis(20),
            fetches: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_hit_returns_same_arc_without_fetch() {
        let store = MemoryFileStore::new();
        store.insert("t.json", br#"[{"a":1,"b":"x"},{"a":2,"b":"y"}]"#.to_vec());
        let cache = FileCache::default();
        let file = File::new("t.json", FileKind::Json);
        let dyn_store: Arc<dyn FileStore> = Arc::new(store.clone());

        let first = cache.ingest(&file, dyn_store.clone()).await.unwrap();
        let second = cache.ingest(&file, dyn_store).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.fetch_count(), 1);
        assert_eq!(
            first.ty,
            Type::table(vec![
                Column::new("a", Type::Number),
                Column::new("b", Type::String)
            ])
        );
    }

    #[tokio::test]
    async fn test_concurrent_loads_are_coalesced() {
        let store = slow_store("big.json", b"[1,2,3]");
        let cache = FileCache::default();
        let file = File::new("big.json", FileKind::Json);

        let calls = (0..5).map(|_| cache.ingest(&file, store.clone()));
        let results = futures::future::join_all(calls).await;

        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().unwrap();
        for r in &results {
            assert!(Arc::ptr_eq(first, r.as_ref().unwrap()));
        }
        assert!(!cache.is_pending("big.json"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_the_error() {
        let store = slow_store("bad.json", b"{nope");
        let cache = FileCache::default();
        let file = File::new("bad.json", FileKind::Json);

        let (a, b) = tokio::join!(
            cache.ingest(&file, store.clone()),
            cache.ingest(&file, store.clone())
        );
        assert!(matches!(a, Err(IngestError::Parse { .. })));
        assert_eq!(a, b);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
        assert!(!cache.is_pending("bad.json"));
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let store = MemoryFileStore::new();
        store.insert("f.json", b"[1,".to_vec());
        let cache = FileCache::default();
        let file = File::new("f.json", FileKind::Json);
        let dyn_store: Arc<dyn FileStore> = Arc::new(store.clone());

        let err = cache.ingest(&file, dyn_store.clone()).await.unwrap_err();
        assert_eq!(err.kind_name(), "ParseError");
        assert_eq!(err.path(), "f.json");
        assert!(cache.get("f.json").is_none());

        store.insert("f.json", b"[1,2]".to_vec());
        let info = cache.ingest(&file, dyn_store).await.unwrap();
        assert_eq!(info.ty, Type::array(Type::Number));
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_maps_to_not_found() {
        let cache = FileCache::default();
        let file = File::new("nope.csv", FileKind::Csv);
        let err = cache
            .ingest(&file, Arc::new(MemoryFileStore::new()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            IngestError::NotFound {
                path: "nope.csv".into()
            }
        );
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let store = MemoryFileStore::new();
        store.insert("n.json", b"1".to_vec());
        let cache = FileCache::default();
        let file = File::new("n.json", FileKind::Json);
        let dyn_store: Arc<dyn FileStore> = Arc::new(store.clone());

        cache.ingest(&file, dyn_store.clone()).await.unwrap();
        store.insert("n.json", b"\"one\"".to_vec());

        // Same path, stale bytes until invalidated.
        let stale = cache.ingest(&file, dyn_store.clone()).await.unwrap();
        assert_eq!(stale.ty, Type::Number);

        assert!(cache.invalidate("n.json"));
        let fresh = cache.ingest(&file, dyn_store).await.unwrap();
        assert_eq!(fresh.ty, Type::String);
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_during_load_skips_commit() {
        let store = slow_store("s.json", b"true");
        let cache = FileCache::default();
        let file = File::new("s.json", FileKind::Json);

        let (loaded, invalidated) = tokio::join!(cache.ingest(&file, store.clone()), async {
            tokio::task::yield_now().await;
            cache.invalidate("s.json")
        });

        assert!(invalidated);
        assert_eq!(loaded.unwrap().ty, Type::Boolean);
        assert!(cache.get("s.json").is_none());
    }

    #[tokio::test]
    async fn test_csv_options_are_applied() {
        let store = MemoryFileStore::new();
        store.insert("t.csv", b"a|b\n1|x\n".to_vec());
        let cache = FileCache::new(CsvOptions {
            delimiter: '|',
            ..Default::default()
        });
        let info = cache
            .ingest(&File::new("t.csv", FileKind::Csv), Arc::new(store))
            .await
            .unwrap();
        assert_eq!(
            info.ty,
            Type::table(vec![
                Column::new("a", Type::Number),
                Column::new("b", Type::String)
            ])
        );
    }
}
