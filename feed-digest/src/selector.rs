use crate::traits::ItemStore;
use crate::types::{ItemWithEnrichment, Result, Window};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_MAX_UNDELIVERED: usize = 20;

/// Window-scoped, score-ordered reads over enriched items.
#[derive(Clone)]
pub struct Selector {
    store: Arc<dyn ItemStore>,
    max_undelivered: usize,
}

impl Selector {
    pub fn new(store: Arc<dyn ItemStore>, max_undelivered: usize) -> Self {
        Self {
            store,
            max_undelivered: max_undelivered.max(1),
        }
    }

    /// Enriched items published inside the window, best first.
    pub async fn ranked(&self, window: Window, limit: Option<usize>) -> Result<Vec<ItemWithEnrichment>> {
        let items = self.store.ranked_enriched(window, limit).await?;
        debug!(%window, count = items.len(), "ranked selection");
        Ok(items)
    }

    /// Same ordering as [`Selector::ranked`], without anything already delivered.
    pub async fn undelivered(&self, window: Window) -> Result<Vec<ItemWithEnrichment>> {
        let items = self
            .store
            .undelivered_ranked(window, self.max_undelivered)
            .await?;
        debug!(%window, count = items.len(), "undelivered selection");
        Ok(items)
    }

    /// String-keyed variant for callers holding a raw window name.
    pub async fn ranked_by_name(&self, window: &str, limit: Option<usize>) -> Result<Vec<ItemWithEnrichment>> {
        let window: Window = window.parse()?;
        self.ranked(window, limit).await
    }

    pub fn max_undelivered(&self) -> usize {
        self.max_undelivered
    }
}
