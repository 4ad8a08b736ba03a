use crate::rss_utils::{feed, url};
use crate::traits::{Clock, FeedTransport, ItemStore};
use crate::types::{DigestError, HarvestConfig, RawFeedItem, Result, Source};
use crate::utils::cancel::or_cancel;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Summary of one harvest pass over all sources.
#[derive(Debug, Clone, Default)]
pub struct HarvestReport {
    pub sources_attempted: usize,
    pub sources_succeeded: usize,
    pub items_found: usize,
    pub items_inserted: usize,
    /// (domain, error message)
    pub errors: Vec<(String, String)>,
}

#[derive(Debug)]
struct SourceOutcome {
    found: usize,
    inserted: usize,
}

/// Pulls the latest entries of every source through a bounded worker pool.
#[derive(Clone)]
pub struct Harvester {
    store: Arc<dyn ItemStore>,
    transport: Arc<dyn FeedTransport>,
    clock: Arc<dyn Clock>,
    config: Arc<HarvestConfig>,
}

impl Harvester {
    pub fn new(
        store: Arc<dyn ItemStore>,
        transport: Arc<dyn FeedTransport>,
        clock: Arc<dyn Clock>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            config: Arc::new(config),
        }
    }

    /// Harvest every source. Returns once all workers have finished, so callers
    /// observe a fully drained pool.
    pub async fn harvest(&self, sources: &[Source], token: &CancellationToken) -> HarvestReport {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut workers = JoinSet::new();

        info!(
            sources = sources.len(),
            concurrency = self.config.concurrency,
            "starting harvest"
        );

        for source in sources {
            let this = self.clone();
            let sem = semaphore.clone();
            let token = token.clone();
            let domain = source.domain.clone();

            workers.spawn(async move {
                let result = match sem.acquire_owned().await {
                    Ok(_permit) => this.harvest_source(&domain, &token).await,
                    Err(_) => Err(DigestError::Cancelled),
                };
                (domain, result)
            });
        }

        let mut report = HarvestReport {
            sources_attempted: sources.len(),
            ..Default::default()
        };

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((domain, Ok(outcome))) => {
                    report.sources_succeeded += 1;
                    report.items_found += outcome.found;
                    report.items_inserted += outcome.inserted;
                    debug!(%domain, found = outcome.found, inserted = outcome.inserted, "source harvested");
                }
                Ok((domain, Err(e))) => {
                    if !e.is_cancelled() {
                        warn!(%domain, "harvest failed: {}", e);
                    }
                    report.errors.push((domain, e.to_string()));
                }
                Err(e) => {
                    error!("harvest worker aborted: {}", e);
                    report.errors.push(("<worker>".to_string(), e.to_string()));
                }
            }
        }

        info!(
            "Harvested {}/{} sources: {} entries found, {} new items",
            report.sources_succeeded,
            report.sources_attempted,
            report.items_found,
            report.items_inserted
        );
        report
    }

    /// Retrieve, normalize and persist the entries of a single source.
    async fn harvest_source(&self, domain: &str, token: &CancellationToken) -> Result<SourceOutcome> {
        let entries = self.retrieve(domain, token).await?;
        let harvested_at = self.clock.now();

        let mut outcome = SourceOutcome {
            found: 0,
            inserted: 0,
        };

        for raw in entries.iter().take(self.config.max_items_per_source) {
            let Some(item) =
                feed::normalize_entry(raw, domain, harvested_at, self.config.summary_max_chars)
            else {
                debug!(%domain, "skipping entry without a link");
                continue;
            };
            outcome.found += 1;

            match self.store.insert_item_if_absent(&item).await {
                Ok(true) => outcome.inserted += 1,
                Ok(false) => {}
                Err(e) => warn!(%domain, url = %item.url, "failed to save item: {}", e),
            }
        }

        info!("Scraped {} entries from {} ({} new)", outcome.found, domain, outcome.inserted);
        Ok(outcome)
    }

    /// Walk the candidate locations in order and accept the first one whose
    /// capped entries include at least one storable item.
    pub async fn retrieve(&self, domain: &str, token: &CancellationToken) -> Result<Vec<RawFeedItem>> {
        let timeout = Duration::from_secs(self.config.request_timeout_seconds);
        let candidates =
            url::candidate_feed_urls(&self.config.scheme, domain, &self.config.feed_paths);

        for candidate in candidates {
            let attempt = async {
                match tokio::time::timeout(timeout, self.transport.fetch_feed(&candidate)).await {
                    Ok(result) => result,
                    Err(_) => Err(DigestError::Timeout {
                        url: candidate.clone(),
                        seconds: self.config.request_timeout_seconds,
                    }),
                }
            };

            match or_cancel(token, attempt).await {
                Ok(entries)
                    if entries
                        .iter()
                        .take(self.config.max_items_per_source)
                        .any(|e| feed::entry_link(e).is_some()) =>
                {
                    debug!(%domain, url = %candidate, entries = entries.len(), "feed found");
                    return Ok(entries);
                }
                Ok(entries) => debug!(
                    url = %candidate,
                    entries = entries.len(),
                    "feed has no linked entries"
                ),
                Err(DigestError::Cancelled) => return Err(DigestError::Cancelled),
                Err(e) => debug!(url = %candidate, "candidate failed: {}", e),
            }
        }

        Err(DigestError::NoFeed {
            domain: domain.to_string(),
        })
    }
}
