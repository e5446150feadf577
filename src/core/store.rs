//! Model Store - the single owner of a document's blocks
//!
//! The store keeps blocks in display order behind an `Arc<RwLock<..>>`, so
//! clones share one canonical collection. Every mutation is applied under the
//! write lock and observers are notified only after the lock is released.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::block::{Block, BlockError, BlockPatch};
use super::events::{ModelEvent, Observers, Subscription};
use super::model::CellularModel;
use super::BlockId;

struct StoreState {
    title: String,
    blocks: Vec<Block>,
}

impl StoreState {
    fn position(&self, id: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }
}

/// Observable, ordered block collection for one document
#[derive(Clone)]
pub struct ModelStore {
    state: Arc<RwLock<StoreState>>,
    observers: Observers,
}

impl ModelStore {
    /// Create a store from an initial document snapshot
    ///
    /// The snapshot is held to the same rules as [`add_block`](Self::add_block):
    /// block IDs are unique and every block is valid.
    ///
    /// # Example
    /// ```
    /// use cellular::core::{CellularModel, ModelStore};
    ///
    /// let store = ModelStore::new(CellularModel::new("Hello World")).unwrap();
    /// assert_eq!(store.title(), "Hello World");
    /// assert!(store.is_empty());
    /// ```
    pub fn new(model: CellularModel) -> Result<Self, StoreError> {
        let mut seen = HashSet::with_capacity(model.blocks.len());
        for block in &model.blocks {
            block.validate()?;
            if !seen.insert(block.id) {
                return Err(StoreError::DuplicateBlock(block.id));
            }
        }
        Ok(Self {
            state: Arc::new(RwLock::new(StoreState {
                title: model.title,
                blocks: model.blocks,
            })),
            observers: Observers::new(),
        })
    }

    /// Subscribe to committed mutations and recorded run results
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ModelEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    /// Deliver an event to observers. Used by the runtime for run results.
    pub(crate) fn notify(&self, event: ModelEvent) {
        self.observers.notify(&event);
    }

    /// Append a block
    ///
    /// # Returns
    /// * `Ok(())` if the block was added
    /// * `Err(StoreError)` if a block with the same ID exists or the block is invalid
    pub fn add_block(&self, block: Block) -> Result<(), StoreError> {
        block.validate()?;
        let id = block.id;
        {
            let mut state = self.state.write();
            if state.position(id).is_some() {
                return Err(StoreError::DuplicateBlock(id));
            }
            state.blocks.push(block);
        }
        debug!(block_id = %id, "block added");
        self.notify(ModelEvent::BlockAdded(id));
        Ok(())
    }

    /// Get a copy of a block by ID
    pub fn get_block(&self, id: BlockId) -> Result<Block, StoreError> {
        let state = self.state.read();
        state
            .position(id)
            .map(|idx| state.blocks[idx].clone())
            .ok_or(StoreError::NotFound(id))
    }

    /// Merge a patch into a block and return the updated block
    ///
    /// Fields absent from the patch keep their values; the ID never changes.
    pub fn update_block(&self, id: BlockId, patch: BlockPatch) -> Result<Block, StoreError> {
        let updated = self.apply_patch(id, patch)?;
        self.notify(ModelEvent::BlockUpdated(id));
        Ok(updated)
    }

    /// Apply a patch without notifying. The caller delivers
    /// `BlockUpdated` once its own locks are released.
    pub(crate) fn apply_patch(&self, id: BlockId, patch: BlockPatch) -> Result<Block, StoreError> {
        let updated = {
            let mut state = self.state.write();
            let idx = state.position(id).ok_or(StoreError::NotFound(id))?;
            let block = &mut state.blocks[idx];
            block.apply(patch)?;
            block.clone()
        };
        debug!(block_id = %id, "block updated");
        Ok(updated)
    }

    /// Remove a block
    ///
    /// Blocks that read from the removed block are left in place; their
    /// references dangle and surface as unresolved inputs when run.
    pub fn remove_block(&self, id: BlockId) -> Result<Block, StoreError> {
        let removed = {
            let mut state = self.state.write();
            let idx = state.position(id).ok_or(StoreError::NotFound(id))?;
            state.blocks.remove(idx)
        };
        debug!(block_id = %id, "block removed");
        self.notify(ModelEvent::BlockRemoved(id));
        Ok(removed)
    }

    /// All blocks in display order
    pub fn blocks(&self) -> Vec<Block> {
        self.state.read().blocks.clone()
    }

    /// Check if a block with the given ID exists
    pub fn contains(&self, id: BlockId) -> bool {
        self.state.read().position(id).is_some()
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.state.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Document title
    pub fn title(&self) -> String {
        self.state.read().title.clone()
    }

    /// Rename the document
    pub fn set_title(&self, title: impl Into<String>) {
        self.state.write().title = title.into();
        self.notify(ModelEvent::TitleChanged);
    }

    /// Persistable copy of the document
    pub fn snapshot(&self) -> CellularModel {
        let state = self.state.read();
        CellularModel {
            title: state.title.clone(),
            blocks: state.blocks.clone(),
        }
    }
}

/// Store error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Block with given ID was not found
    #[error("Block not found: {0}")]
    NotFound(BlockId),

    /// Attempted to add a block whose ID is already present
    #[error("Duplicate block ID: {0}")]
    DuplicateBlock(BlockId),

    /// The block or patch violates a block invariant
    #[error(transparent)]
    InvalidBlock(#[from] BlockError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::BlockKind;
    use crate::core::types::Type;
    use crate::core::variable::Variable;
    use parking_lot::Mutex;

    fn script(name: &str) -> Block {
        Block::new(
            name,
            BlockKind::Script {
                title: name.into(),
                script: String::new(),
            },
        )
    }

    #[test]
    fn test_add_get_remove() {
        let store = ModelStore::new(CellularModel::new("doc")).unwrap();
        let block = script("a");
        let id = block.id;

        store.add_block(block.clone()).unwrap();
        assert_eq!(store.get_block(id).unwrap(), block);
        assert_eq!(store.len(), 1);

        store.remove_block(id).unwrap();
        assert_eq!(store.get_block(id), Err(StoreError::NotFound(id)));
        assert_eq!(store.remove_block(id), Err(StoreError::NotFound(id)));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let store = ModelStore::new(CellularModel::new("doc")).unwrap();
        let block = script("a");
        store.add_block(block.clone()).unwrap();
        assert_eq!(
            store.add_block(block.clone()),
            Err(StoreError::DuplicateBlock(block.id))
        );
    }

    #[test]
    fn test_order_is_preserved() {
        let store = ModelStore::new(CellularModel::new("doc")).unwrap();
        let blocks: Vec<Block> = ["a", "b", "c"].into_iter().map(script).collect();
        for b in &blocks {
            store.add_block(b.clone()).unwrap();
        }
        store.remove_block(blocks[1].id).unwrap();
        let names: Vec<String> = store.blocks().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_update_unknown_block() {
        let store = ModelStore::new(CellularModel::new("doc")).unwrap();
        let id = BlockId::new();
        assert_eq!(
            store.update_block(id, BlockPatch::name("x")),
            Err(StoreError::NotFound(id))
        );
    }

    #[test]
    fn test_observers_see_committed_state() {
        let store = ModelStore::new(CellularModel::new("doc")).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let reader = store.clone();
        let log = seen.clone();
        let _sub = store.subscribe(move |event| {
            // The mutation is visible by the time observers run.
            if let Some(id) = event.block_id() {
                log.lock().push((event.clone(), reader.contains(id)));
            }
        });

        let block = script("a");
        let id = block.id;
        store.add_block(block).unwrap();
        store.update_block(id, BlockPatch::name("renamed")).unwrap();
        store.remove_block(id).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                (ModelEvent::BlockAdded(id), true),
                (ModelEvent::BlockUpdated(id), true),
                (ModelEvent::BlockRemoved(id), false),
            ]
        );
    }

    #[test]
    fn test_failed_mutation_does_not_notify() {
        let store = ModelStore::new(CellularModel::new("doc")).unwrap();
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let _sub = store.subscribe(move |_| *c.lock() += 1);

        let _ = store.remove_block(BlockId::new());
        let _ = store.update_block(BlockId::new(), BlockPatch::name("x"));
        assert_eq!(*count.lock(), 0);
    }

    #[test]
    fn test_snapshot_matches_document() {
        let mut model = CellularModel::new("doc");
        model.blocks.push(script("a"));
        let store = ModelStore::new(model.clone()).unwrap();
        store.set_title("renamed");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.title, "renamed");
        assert_eq!(snapshot.blocks, model.blocks);
    }

    #[test]
    fn test_new_rejects_duplicate_ids() {
        let block = script("a");
        let mut model = CellularModel::new("doc");
        model.blocks = vec![block.clone(), block.clone()];
        assert_eq!(
            ModelStore::new(model).err(),
            Some(StoreError::DuplicateBlock(block.id))
        );
    }

    #[test]
    fn test_new_rejects_invalid_block() {
        let mut block = script("a");
        block.outputs = vec![
            Variable::new("x", Type::Number),
            Variable::new("x", Type::Number),
        ];
        let mut model = CellularModel::new("doc");
        model.blocks.push(block);
        assert!(matches!(
            ModelStore::new(model),
            Err(StoreError::InvalidBlock(BlockError::DuplicateVariable { .. }))
        ));
    }
}
