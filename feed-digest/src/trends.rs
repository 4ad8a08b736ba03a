use crate::llm_adapter::parse_model_json;
use crate::traits::ModelBackend;
use crate::types::{DigestError, ItemWithEnrichment, Result};
use crate::utils::cancel::or_cancel;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const TRENDS_SYSTEM_PROMPT: &str = r#"You are a technology trend analyst. Based on the following list of recently scored tech articles, identify 2-3 macro technology trends.

For each trend, provide:
- A concise title in Chinese (no pinyin, no parenthetical notes)
- A 2-3 sentence description in Chinese explaining the trend
- A list of related article titles from the input (use the exact original English titles)

Respond ONLY with valid JSON using standard ASCII double quotes. No text outside JSON string values:
{"trends":[{"title":"...","description":"...","articles":["Article Title 1"]}]}"#;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendReport {
    #[serde(default)]
    pub trends: Vec<Trend>,
}

impl TrendReport {
    pub fn is_empty(&self) -> bool {
        self.trends.is_empty()
    }
}

/// A cluster of related items. `articles` holds the exact item titles as the
/// model echoed them back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trend {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub articles: Vec<String>,
}

impl Trend {
    /// Positions in `items` whose title matches one of the cluster's articles
    /// exactly. Unmatched titles are ignored.
    pub fn resolve(&self, items: &[ItemWithEnrichment]) -> Vec<usize> {
        self.articles
            .iter()
            .filter_map(|title| items.iter().position(|i| &i.item.title == title))
            .collect()
    }
}

/// Clusters a ranked selection into a handful of themes with one model call.
pub struct TrendAggregator {
    backend: Arc<dyn ModelBackend>,
}

impl TrendAggregator {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    /// Single attempt. Failures go back to the caller, which decides whether
    /// to deliver without clusters.
    pub async fn aggregate(
        &self,
        items: &[ItemWithEnrichment],
        token: &CancellationToken,
    ) -> Result<TrendReport> {
        if items.is_empty() {
            return Ok(TrendReport::default());
        }

        let prompt = build_prompt(items);
        let raw = or_cancel(token, self.backend.complete(TRENDS_SYSTEM_PROMPT, &prompt)).await?;
        let report: TrendReport = parse_model_json(&raw)?;

        if report.trends.iter().any(|t| t.title.trim().is_empty()) {
            return Err(DigestError::MalformedOutput {
                reason: "trend without a title".to_string(),
                raw,
            });
        }

        info!("Identified {} trends over {} items", report.trends.len(), items.len());
        Ok(report)
    }
}

/// One numbered line per item, in ranked order.
pub fn build_prompt(items: &[ItemWithEnrichment]) -> String {
    let mut prompt = String::new();
    for (i, entry) in items.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "{}. [{}] {} (score: {}, category: {}, keywords: {})",
            i + 1,
            entry.item.source,
            entry.item.title,
            entry.enrichment.total_score(),
            entry.enrichment.category,
            entry.enrichment.keywords.join(", ")
        );
    }
    prompt
}
