use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{Block, BlockId, DocumentBlocks};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::DocumentEngine;
use crate::{error::EngineError, registry::SuggestionItem};

struct EngineState {
    blocks: DocumentBlocks,
    cursor: Option<BlockId>,
    replace_count: usize,
}

/// Document engine kept entirely in memory.
///
/// Backs the stdin host and the tests. Blocks without an id get a fresh
/// UUID when they enter the document, the way the browser editor does.
pub struct InMemoryDocumentEngine {
    inner: Mutex<EngineState>,
}

impl InMemoryDocumentEngine {
    pub fn new(mut blocks: DocumentBlocks) -> Self {
        assign_ids(&mut blocks);
        Self {
            inner: Mutex::new(EngineState {
                blocks,
                cursor: None,
                replace_count: 0,
            }),
        }
    }

    /// Moves the text cursor into the block with `id`.
    pub async fn set_cursor(&self, id: &BlockId) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if find_block(&guard.blocks, id).is_none() {
            return Err(EngineError::BlockNotFound(id.clone()).into());
        }
        guard.cursor = Some(id.clone());
        Ok(())
    }

    /// Number of whole-document replacements applied so far.
    pub async fn replace_count(&self) -> usize {
        self.inner.lock().await.replace_count
    }
}

impl Default for InMemoryDocumentEngine {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl DocumentEngine for InMemoryDocumentEngine {
    async fn document(&self) -> Result<DocumentBlocks> {
        Ok(self.inner.lock().await.blocks.clone())
    }

    async fn replace_all_blocks(&self, mut blocks: DocumentBlocks) -> Result<()> {
        assign_ids(&mut blocks);
        let mut guard = self.inner.lock().await;
        let cursor_survives = guard
            .cursor
            .as_ref()
            .is_some_and(|id| find_block(&blocks, id).is_some());
        if !cursor_survives {
            guard.cursor = None;
        }
        guard.blocks = blocks;
        guard.replace_count += 1;
        Ok(())
    }

    async fn cursor_block(&self) -> Result<Block> {
        let guard = self.inner.lock().await;
        let block = match &guard.cursor {
            Some(id) => find_block(&guard.blocks, id),
            None => guard.blocks.first(),
        };
        block.cloned().ok_or_else(|| EngineError::EmptyDocument.into())
    }

    async fn insert_blocks_after(&self, mut blocks: DocumentBlocks, anchor: &Block) -> Result<()> {
        let anchor_id = anchor.id.as_ref().ok_or(EngineError::MissingBlockId)?;
        assign_ids(&mut blocks);
        let mut guard = self.inner.lock().await;
        let mut pending = Some(blocks);
        if !insert_after(&mut guard.blocks, anchor_id, &mut pending) {
            return Err(EngineError::BlockNotFound(anchor_id.clone()).into());
        }
        Ok(())
    }

    fn filter_suggestions(&self, items: Vec<SuggestionItem>, query: &str) -> Vec<SuggestionItem> {
        let query = query.trim().to_lowercase();
        items
            .into_iter()
            .filter(|item| {
                let entry = item.entry();
                entry.title.to_lowercase().contains(&query)
                    || entry
                        .aliases
                        .iter()
                        .any(|alias| alias.to_lowercase().contains(&query))
            })
            .collect()
    }
}

fn assign_ids(blocks: &mut [Block]) {
    for block in blocks {
        if block.id.is_none() {
            block.id = Some(BlockId(Uuid::new_v4().to_string()));
        }
        assign_ids(&mut block.children);
    }
}

fn find_block<'a>(blocks: &'a [Block], id: &BlockId) -> Option<&'a Block> {
    blocks.iter().find_map(|block| {
        if block.id.as_ref() == Some(id) {
            Some(block)
        } else {
            find_block(&block.children, id)
        }
    })
}

fn insert_after(
    blocks: &mut Vec<Block>,
    anchor: &BlockId,
    pending: &mut Option<DocumentBlocks>,
) -> bool {
    if let Some(index) = blocks
        .iter()
        .position(|block| block.id.as_ref() == Some(anchor))
    {
        if let Some(inserted) = pending.take() {
            blocks.splice(index + 1..index + 1, inserted);
        }
        return true;
    }
    blocks
        .iter_mut()
        .any(|block| insert_after(&mut block.children, anchor, pending))
}
