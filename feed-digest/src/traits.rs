use crate::types::{
    Enrichment, Item, ItemId, ItemWithEnrichment, NewItem, RawFeedItem, Result, Source, Window,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Durable record of sources, harvested items and their enrichments.
///
/// Every write is keyed and idempotent; implementations serialize concurrent
/// writers themselves.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert or overwrite sources by domain. Rank and score are replaced, never accumulated.
    async fn upsert_sources(&self, sources: &[Source]) -> Result<()>;

    /// All sources ordered by rank.
    async fn list_sources(&self) -> Result<Vec<Source>>;

    /// Returns `true` when the URL was new and a row was written.
    async fn insert_item_if_absent(&self, item: &NewItem) -> Result<bool>;

    async fn items_in_window(&self, window: Window) -> Result<Vec<Item>>;

    /// Items in the window that have no enrichment row yet.
    async fn unenriched_items(&self, window: Window) -> Result<Vec<Item>>;

    /// Scored items in the window whose synopsis is still empty, best first.
    async fn unsummarized_items(&self, window: Window) -> Result<Vec<ItemWithEnrichment>>;

    /// Enriched items in the window ordered by total score descending.
    async fn ranked_enriched(
        &self,
        window: Window,
        limit: Option<usize>,
    ) -> Result<Vec<ItemWithEnrichment>>;

    /// Like `ranked_enriched`, restricted to items not yet delivered.
    async fn undelivered_ranked(
        &self,
        window: Window,
        limit: usize,
    ) -> Result<Vec<ItemWithEnrichment>>;

    /// Upsert by item id. Overwrites every content field and leaves `delivered_at` alone.
    async fn upsert_enrichment(&self, enrichment: &Enrichment) -> Result<()>;

    /// Stamp `delivered_at` on items that do not have it yet.
    async fn mark_delivered(&self, ids: &[ItemId]) -> Result<()>;

    async fn item_with_enrichment(&self, id: ItemId) -> Result<Option<ItemWithEnrichment>>;

    async fn latest_items(&self, limit: usize) -> Result<Vec<Item>>;
}

/// A chat-style language model.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn backend_name(&self) -> String;

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Fetch-and-parse primitive for a single feed location.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn fetch_feed(&self, url: &str) -> Result<Vec<RawFeedItem>>;
}

/// A delivery channel for finished digests. Implementations handle their own
/// payload-size chunking.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel_name(&self) -> String;

    async fn send(&self, title: &str, body: &str) -> Result<()>;
}

/// Time source and sleep primitive, swappable in tests.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
