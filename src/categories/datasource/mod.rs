//! Data source blocks
//!
//! A data source block materializes one external file as a single typed
//! output variable. It has no inputs.

pub mod cache;
pub mod file;
pub mod parser;

pub use cache::{FileCache, IngestError};
pub use file::{DirectoryFileStore, File, FileKind, FileStore, FileStoreError, MemoryFileStore};
pub use parser::{CsvOptions, FileInfo, ParseError};

use crate::core::block::{Block, BlockKind};
use crate::core::variable::Variable;
use crate::runtime::workspace::Workspace;

/// Ingest `file` and build a data source block for it.
///
/// The block gets a fresh ID, the file name as its display name, and one
/// output variable named after the file and typed by the ingested data.
/// The block is not added to the store.
pub async fn create_datasource(file: &File, workspace: &Workspace) -> Result<Block, IngestError> {
    let info = workspace.ingest(file).await?;
    let mut block = Block::new(
        file.name(),
        BlockKind::DataSource {
            path: file.path.clone(),
            source_kind: file.kind,
        },
    );
    block.outputs = vec![Variable::new(file.derive_variable_name(), info.ty.clone())];
    Ok(block)
}
