//! Seam to the block editor that owns the live document.

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{Block, DocumentBlocks};

use crate::registry::SuggestionItem;

mod memory;

pub use memory::InMemoryDocumentEngine;

/// Operations the gadget needs from the editing surface.
///
/// The gadget never edits blocks itself; every document change goes through
/// this trait.
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    async fn document(&self) -> Result<DocumentBlocks>;

    /// Replaces every block of the document in one step.
    ///
    /// Engines may assign ids to blocks that arrive without one, so a later
    /// `document()` need not equal `blocks` and id-less content is never
    /// recognised as an echo.
    async fn replace_all_blocks(&self, blocks: DocumentBlocks) -> Result<()>;

    /// The block holding the text cursor.
    async fn cursor_block(&self) -> Result<Block>;

    async fn insert_blocks_after(&self, blocks: DocumentBlocks, anchor: &Block) -> Result<()>;

    /// Ranks and filters suggestion items for a slash-menu query.
    fn filter_suggestions(&self, items: Vec<SuggestionItem>, query: &str) -> Vec<SuggestionItem>;
}

/// Inserts `block` directly after the block under the cursor.
pub async fn insert_after_cursor(engine: &dyn DocumentEngine, block: Block) -> Result<()> {
    let anchor = engine.cursor_block().await?;
    engine.insert_blocks_after(vec![block], &anchor).await
}
