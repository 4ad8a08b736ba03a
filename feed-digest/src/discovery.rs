use crate::types::{DigestError, DiscoveryConfig, Result, Source};
use crate::utils::cancel::or_cancel;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Builds the ranked source list from the HN popularity dataset: per-story
/// scores aggregated by domain plus an author lookup.
pub struct SourceDiscovery {
    client: Client,
    config: DiscoveryConfig,
}

impl SourceDiscovery {
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    pub async fn discover(&self, token: &CancellationToken) -> Result<Vec<Source>> {
        let base = self.config.base_url.trim_end_matches('/');

        info!("Fetching HN data from {}/hn-data.csv", base);
        let scores = parse_scores(&or_cancel(token, self.fetch_text(&format!("{base}/hn-data.csv"))).await?);

        info!("Fetching domain metadata from {}/domains-meta.csv", base);
        let authors =
            parse_authors(&or_cancel(token, self.fetch_text(&format!("{base}/domains-meta.csv"))).await?);

        let sources = rank_sources(scores, &authors, self.config.limit);
        info!("Found {} sources", sources.len());
        Ok(sources)
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DigestError::General(format!("GET {url}: status {status}")));
        }
        Ok(response.text().await?)
    }
}

/// Parse a headed CSV document into records. Quoted fields may contain
/// commas and newlines; unreadable records are skipped.
fn records(text: &str) -> Vec<csv::StringRecord> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes())
        .into_records()
        .filter_map(|record| match record {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("skipping csv record: {}", e);
                None
            }
        })
        .collect()
}

/// `domain,score,date` rows, header first. Scores are summed per domain;
/// malformed rows are skipped.
pub fn parse_scores(text: &str) -> HashMap<String, i64> {
    let mut scores = HashMap::new();
    for record in records(text) {
        let (Some(domain), Some(score)) = (record.get(0), record.get(1)) else {
            continue;
        };
        let Ok(score) = score.parse::<i64>() else {
            continue;
        };
        if domain.is_empty() {
            continue;
        }
        *scores.entry(domain.to_string()).or_insert(0) += score;
    }
    scores
}

/// `domain,author,...` rows, header first.
pub fn parse_authors(text: &str) -> HashMap<String, String> {
    records(text)
        .iter()
        .filter_map(|record| match (record.get(0), record.get(1)) {
            (Some(domain), Some(author)) if !domain.is_empty() => {
                Some((domain.to_string(), author.to_string()))
            }
            _ => None,
        })
        .collect()
}

/// Highest aggregate score first (ties by domain), truncated to `limit`,
/// with 1-based ranks.
pub fn rank_sources(
    scores: HashMap<String, i64>,
    authors: &HashMap<String, String>,
    limit: usize,
) -> Vec<Source> {
    let mut entries: Vec<(String, i64)> = scores.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    entries
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (domain, score))| Source {
            author: authors.get(&domain).cloned().unwrap_or_default(),
            domain,
            score,
            rank: u32::try_from(i + 1).unwrap_or(u32::MAX),
        })
        .collect()
}
