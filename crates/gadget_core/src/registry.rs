//! Slash-menu view over the registered command entries.

use std::{fmt, sync::Arc};

use anyhow::Result;
use shared::domain::CommandEntry;

use crate::{
    engine::{insert_after_cursor, DocumentEngine},
    store::StateStore,
};

/// A command entry paired with the effect of picking it from the menu.
#[derive(Clone)]
pub struct SuggestionItem {
    entry: CommandEntry,
    engine: Arc<dyn DocumentEngine>,
}

impl SuggestionItem {
    pub fn entry(&self) -> &CommandEntry {
        &self.entry
    }

    pub fn title(&self) -> &str {
        &self.entry.title
    }

    /// Inserts the entry's block template after the cursor block.
    pub async fn activate(&self) -> Result<()> {
        insert_after_cursor(self.engine.as_ref(), self.entry.block.clone()).await
    }
}

impl fmt::Debug for SuggestionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuggestionItem")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct CommandRegistry {
    store: StateStore,
    engine: Arc<dyn DocumentEngine>,
}

impl CommandRegistry {
    pub fn new(store: StateStore, engine: Arc<dyn DocumentEngine>) -> Self {
        Self { store, engine }
    }

    /// Entries matching `query`, ranked by the document engine.
    pub fn query(&self, query: &str) -> Vec<SuggestionItem> {
        let items = self
            .store
            .snapshot()
            .command_entries
            .into_values()
            .map(|entry| SuggestionItem {
                entry,
                engine: Arc::clone(&self.engine),
            })
            .collect();
        self.engine.filter_suggestions(items, query)
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
