use crate::types::{DigestError, RawFeedItem, Result};
use feed_rs::parser;
use tracing::debug;

/// Parses RSS, Atom and JSON Feed documents into raw entries, preserving feed order.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_feed(&self, content: &[u8]) -> Result<Vec<RawFeedItem>> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content)
            .map_err(|e| DigestError::Parse(format!("Failed to parse feed: {}", e)))?;

        let entries: Vec<RawFeedItem> = feed.entries.into_iter().map(Self::parse_entry).collect();

        debug!("Parsed feed with {} entries", entries.len());
        Ok(entries)
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> RawFeedItem {
        // The primary link is the first one without a relation or marked alternate.
        let link = entry
            .links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .map(|l| l.href.clone());

        let alternate_links = entry.links.iter().map(|l| l.href.clone()).collect();

        RawFeedItem {
            title: entry.title.map(|t| t.content),
            published: entry.published,
            updated: entry.updated,
            summary: entry.summary.map(|s| s.content),
            content: entry.content.and_then(|c| c.body),
            link,
            alternate_links,
        }
    }
}
