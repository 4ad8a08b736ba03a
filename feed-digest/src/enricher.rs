use crate::llm_adapter::parse_model_json;
use crate::retry::RetryPolicy;
use crate::traits::{Clock, ItemStore, ModelBackend};
use crate::types::{
    DigestError, EnrichConfig, Enrichment, Item, ItemId, Result, SubScores, Window,
};
use crate::utils::cancel::{check, or_cancel};
use backoff::backoff::Backoff;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const SCORE_SYSTEM_PROMPT: &str = r#"You are a tech news analyst. Score this article on three dimensions (1-10):
- relevance: how relevant to software engineers and tech professionals
- quality: writing quality, depth, and informativeness
- timeliness: how current and timely the topic is

Also classify into one category (e.g. "AI/ML", "Systems", "Web", "Security", "DevOps", "Programming", "Data", "Cloud", "Open Source", "Career") and extract 3-5 keywords.

Respond ONLY with valid JSON using standard ASCII double quotes. No other text:
{"relevance":N,"quality":N,"timeliness":N,"category":"...","keywords":["...","..."]}"#;

pub const SUMMARY_SYSTEM_PROMPT: &str = r#"You are a bilingual (English/Chinese) tech content summarizer.
For the given article, produce:
1. A structured summary in English (4-6 sentences covering the key points)
2. A Chinese translation of the article title
3. A recommendation reason in Chinese (1-2 sentences explaining why this article is worth reading)

Respond ONLY with valid JSON using standard ASCII double quotes. No other text:
{"summary":"...","title_cn":"...","recommend_reason":"..."}"#;

/// Stage A output: scores and classification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScoreResult {
    pub relevance: u8,
    pub quality: u8,
    pub timeliness: u8,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ScoreResult {
    pub fn sub_scores(&self) -> SubScores {
        SubScores {
            relevance: self.relevance,
            quality: self.quality,
            timeliness: self.timeliness,
        }
    }
}

/// Stage B output: synopsis, translated title and rationale.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SummaryResult {
    #[serde(rename = "summary")]
    pub synopsis: String,
    #[serde(rename = "title_cn", default)]
    pub translated_title: String,
    #[serde(rename = "recommend_reason", default)]
    pub rationale: String,
}

impl SummaryResult {
    fn apply(self, enrichment: &mut Enrichment) {
        enrichment.synopsis = self.synopsis;
        enrichment.translated_title = self.translated_title;
        enrichment.rationale = self.rationale;
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnrichReport {
    pub candidates: usize,
    pub scored: usize,
    pub summarized: usize,
    /// (item id, error message)
    pub errors: Vec<(ItemId, String)>,
}

/// Scores and summarizes items through the model backend, one item at a time.
pub struct Enricher {
    store: Arc<dyn ItemStore>,
    backend: Arc<dyn ModelBackend>,
    clock: Arc<dyn Clock>,
    lookback: Window,
    retry: RetryPolicy,
}

impl Enricher {
    pub fn new(
        store: Arc<dyn ItemStore>,
        backend: Arc<dyn ModelBackend>,
        clock: Arc<dyn Clock>,
        config: &EnrichConfig,
    ) -> Self {
        Self {
            store,
            backend,
            clock,
            lookback: config.lookback,
            retry: RetryPolicy::new(
                config.summary_max_attempts,
                Duration::from_secs(config.summary_retry_delay_seconds),
            ),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn lookback(&self) -> Window {
        self.lookback
    }

    /// Stage A. A single attempt; any failure leaves the item for the next cycle.
    pub async fn score(&self, item: &Item, token: &CancellationToken) -> Result<ScoreResult> {
        let user_prompt = format!(
            "Title: {}\nSource: {}\nSummary: {}",
            item.title, item.source, item.summary
        );

        let raw = or_cancel(token, self.backend.complete(SCORE_SYSTEM_PROMPT, &user_prompt)).await?;
        let result: ScoreResult = parse_model_json(&raw)?;

        if !result.sub_scores().in_range() {
            return Err(DigestError::MalformedOutput {
                reason: format!(
                    "scores out of range: {}/{}/{}",
                    result.relevance, result.quality, result.timeliness
                ),
                raw,
            });
        }
        Ok(result)
    }

    /// Stage B with the bounded retry policy. Call and parse failures are
    /// retried alike.
    pub async fn summarize(&self, item: &Item, token: &CancellationToken) -> Result<SummaryResult> {
        let user_prompt = format!(
            "Title: {}\nSource: {}\nContent: {}",
            item.title, item.source, item.summary
        );

        let mut backoff = self.retry.backoff();
        loop {
            let attempt = backoff.failures() + 1;
            let outcome = async {
                let raw =
                    or_cancel(token, self.backend.complete(SUMMARY_SYSTEM_PROMPT, &user_prompt))
                        .await?;
                parse_model_json::<SummaryResult>(&raw)
            }
            .await;

            let error = match outcome {
                Ok(summary) => return Ok(summary),
                Err(DigestError::Cancelled) => return Err(DigestError::Cancelled),
                Err(e) => e,
            };

            warn!(
                item_id = item.id,
                "Summarize attempt {}/{} failed: {}", attempt, self.retry.max_attempts, error
            );

            match backoff.next_backoff() {
                Some(delay) => {
                    or_cancel(token, async {
                        self.clock.sleep(delay).await;
                        Ok(())
                    })
                    .await?
                }
                None => {
                    return Err(DigestError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(error),
                    })
                }
            }
        }
    }

    /// Run both stages for an item and write the merged result once. Returns
    /// whether the summary half succeeded.
    pub async fn enrich_item(&self, item: &Item, token: &CancellationToken) -> Result<bool> {
        let score = self.score(item, token).await?;

        let mut enrichment = Enrichment {
            item_id: item.id,
            scores: score.sub_scores(),
            category: score.category,
            keywords: score.keywords,
            synopsis: String::new(),
            translated_title: String::new(),
            rationale: String::new(),
            enriched_at: self.clock.now(),
            delivered_at: None,
        };

        let summarized = match self.summarize(item, token).await {
            Ok(summary) => {
                summary.apply(&mut enrichment);
                true
            }
            Err(DigestError::Cancelled) => return Err(DigestError::Cancelled),
            Err(e) => {
                warn!(item_id = item.id, "Keeping scores without summary: {}", e);
                false
            }
        };

        self.store.upsert_enrichment(&enrichment).await?;
        info!(
            item_id = item.id,
            total = enrichment.total_score(),
            category = %enrichment.category,
            "[{}] {}",
            enrichment.total_score(),
            item.title
        );
        Ok(summarized)
    }

    /// Enrich every item of the lookback window that has no enrichment yet.
    pub async fn enrich_new(&self, token: &CancellationToken) -> Result<EnrichReport> {
        self.enrich_new_in(self.lookback, token).await
    }

    pub async fn enrich_new_in(&self, window: Window, token: &CancellationToken) -> Result<EnrichReport> {
        let items = self.store.unenriched_items(window).await?;
        let mut report = EnrichReport {
            candidates: items.len(),
            ..Default::default()
        };

        info!("Enriching {} items from {} window", items.len(), window);

        for (i, item) in items.iter().enumerate() {
            check(token)?;
            debug!("[{}/{}] Scoring: {}", i + 1, items.len(), item.title);

            match self.enrich_item(item, token).await {
                Ok(summarized) => {
                    report.scored += 1;
                    if summarized {
                        report.summarized += 1;
                    }
                }
                Err(DigestError::Cancelled) => return Err(DigestError::Cancelled),
                Err(e) => {
                    warn!(item_id = item.id, "Skipping enrichment of {:?}: {}", item.title, e);
                    report.errors.push((item.id, e.to_string()));
                }
            }
        }

        info!("Done: {} scored, {} summarized", report.scored, report.summarized);
        Ok(report)
    }

    /// Second chance for items that were scored but never summarized.
    pub async fn retry_unsummarized(&self, token: &CancellationToken) -> Result<EnrichReport> {
        self.retry_unsummarized_in(self.lookback, token).await
    }

    pub async fn retry_unsummarized_in(
        &self,
        window: Window,
        token: &CancellationToken,
    ) -> Result<EnrichReport> {
        let pending = self.store.unsummarized_items(window).await?;
        let mut report = EnrichReport {
            candidates: pending.len(),
            ..Default::default()
        };

        if pending.is_empty() {
            return Ok(report);
        }
        info!("Retrying summaries for {} scored items", pending.len());

        for entry in pending {
            check(token)?;
            let item = &entry.item;

            let summary = match self.summarize(item, token).await {
                Ok(summary) => summary,
                Err(DigestError::Cancelled) => return Err(DigestError::Cancelled),
                Err(e) => {
                    warn!(item_id = item.id, "Retry summarize failed: {}", e);
                    report.errors.push((item.id, e.to_string()));
                    continue;
                }
            };

            let mut enrichment = entry.enrichment;
            summary.apply(&mut enrichment);

            match self.store.upsert_enrichment(&enrichment).await {
                Ok(()) => report.summarized += 1,
                Err(e) => {
                    warn!(item_id = item.id, "Failed to save summary: {}", e);
                    report.errors.push((item.id, e.to_string()));
                }
            }
        }

        info!("Retry done, {} summarized", report.summarized);
        Ok(report)
    }
}
