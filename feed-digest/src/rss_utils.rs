//! Feed-specific helpers for the harvester

/// Candidate feed locations for a source domain
pub mod url {
    /// Well-known feed paths first, in order, then the bare root as last resort.
    pub fn candidate_feed_urls(scheme: &str, domain: &str, feed_paths: &[String]) -> Vec<String> {
        let root = format!("{}://{}", scheme, domain.trim_end_matches('/'));
        let mut candidates: Vec<String> = feed_paths
            .iter()
            .map(|path| format!("{}{}", root, path))
            .collect();
        candidates.push(root);
        candidates
    }
}

/// Entry normalization
pub mod feed {
    use crate::types::{NewItem, RawFeedItem};
    use chrono::{DateTime, Utc};

    /// Remove markup with one pass over the characters, tracking whether we
    /// are inside a tag.
    pub fn strip_tags(html: &str) -> String {
        let mut text = String::with_capacity(html.len());
        let mut in_tag = false;
        for c in html.chars() {
            match c {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => text.push(c),
                _ => {}
            }
        }
        text.trim().to_string()
    }

    /// Cap to `max_chars` characters, marking truncation with `...`.
    pub fn truncate(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
            None => text.to_string(),
        }
    }

    fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// Primary link, else the first non-empty alternate.
    pub fn entry_link(raw: &RawFeedItem) -> Option<&str> {
        non_empty(&raw.link).or_else(|| {
            raw.alternate_links
                .iter()
                .map(|l| l.trim())
                .find(|l| !l.is_empty())
        })
    }

    /// Turn a raw feed entry into a storable item. Entries without any link
    /// have no dedup key and are dropped.
    pub fn normalize_entry(
        raw: &RawFeedItem,
        source: &str,
        harvested_at: DateTime<Utc>,
        summary_max_chars: usize,
    ) -> Option<NewItem> {
        let url = entry_link(raw)?.to_string();

        let body = non_empty(&raw.summary)
            .or_else(|| non_empty(&raw.content))
            .unwrap_or("");

        Some(NewItem {
            source: source.to_string(),
            title: raw.title.as_deref().map(str::trim).unwrap_or("").to_string(),
            url,
            summary: truncate(&strip_tags(body), summary_max_chars),
            published_at: raw.published.or(raw.updated),
            harvested_at,
        })
    }
}
