use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ItemId = i64;

/// A ranked origin (usually a blog domain) that items are harvested from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub domain: String,
    pub score: i64,
    pub author: String,
    pub rank: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub source: String,
    pub title: String,
    pub url: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
    pub harvested_at: DateTime<Utc>,
}

/// An item as produced by the harvester, before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub source: String,
    pub title: String,
    pub url: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
    pub harvested_at: DateTime<Utc>,
}

/// One entry of a retrieved feed, exactly as the transport parsed it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeedItem {
    pub title: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub link: Option<String>,
    pub alternate_links: Vec<String>,
}

pub const MIN_SUB_SCORE: u8 = 1;
pub const MAX_SUB_SCORE: u8 = 10;

/// The three model-assigned scores. The total is always derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubScores {
    pub relevance: u8,
    pub quality: u8,
    pub timeliness: u8,
}

impl SubScores {
    pub fn total(&self) -> u32 {
        u32::from(self.relevance) + u32::from(self.quality) + u32::from(self.timeliness)
    }

    pub fn in_range(&self) -> bool {
        [self.relevance, self.quality, self.timeliness]
            .iter()
            .all(|s| (MIN_SUB_SCORE..=MAX_SUB_SCORE).contains(s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub item_id: ItemId,
    pub scores: SubScores,
    pub category: String,
    pub keywords: Vec<String>,
    pub synopsis: String,
    pub translated_title: String,
    pub rationale: String,
    pub enriched_at: DateTime<Utc>,
    /// Set once by the delivery stage, never cleared.
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Enrichment {
    pub fn total_score(&self) -> u32 {
        self.scores.total()
    }

    pub fn is_summarized(&self) -> bool {
        !self.synopsis.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemWithEnrichment {
    pub item: Item,
    pub enrichment: Enrichment,
}

// Object style note:
// These are plain records. Behavior lives in the engine crate behind
// capability traits (store, model backend, transport, notifier) so that any
// presentation layer can depend on this crate alone.
