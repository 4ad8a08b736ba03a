use crate::config::Config;
use crate::digest::format_digest;
use crate::discovery::SourceDiscovery;
use crate::enricher::Enricher;
use crate::harvester::Harvester;
use crate::selector::Selector;
use crate::traits::{Clock, FeedTransport, ItemStore, ModelBackend, Notifier};
use crate::trends::{TrendAggregator, TrendReport};
use crate::types::{CycleReport, DigestError, PipelineConfig, Result, Stage, Window};
use crate::utils::cancel::{check, or_cancel};
use crate::utils::time::format_duration;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// Runs the stages of one digest cycle in order and records what happened.
///
/// Every stage persists its own results, so a cycle can be interrupted at any
/// point and the next one picks up where it left off.
pub struct Pipeline {
    store: Arc<dyn ItemStore>,
    harvester: Harvester,
    enricher: Enricher,
    selector: Selector,
    trends: TrendAggregator,
    notifier: Option<Arc<dyn Notifier>>,
    discovery: Option<SourceDiscovery>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ItemStore>,
        backend: Arc<dyn ModelBackend>,
        transport: Arc<dyn FeedTransport>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            harvester: Harvester::new(
                store.clone(),
                transport,
                clock.clone(),
                config.harvest.clone(),
            ),
            enricher: Enricher::new(store.clone(), backend.clone(), clock.clone(), &config.enrich),
            selector: Selector::new(store.clone(), config.pipeline.max_undelivered),
            trends: TrendAggregator::new(backend),
            notifier: None,
            discovery: None,
            store,
            clock,
            config: config.pipeline.clone(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Runs before harvesting when `refresh_sources` is set or the store has
    /// no sources yet.
    pub fn with_discovery(mut self, discovery: SourceDiscovery) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn harvester(&self) -> &Harvester {
        &self.harvester
    }

    pub fn enricher(&self) -> &Enricher {
        &self.enricher
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn trends(&self) -> &TrendAggregator {
        &self.trends
    }

    pub fn has_notifier(&self) -> bool {
        self.notifier.is_some()
    }

    /// Run one full cycle. Stage failures are recorded in the report; the
    /// cycle only stops early on cancellation or when nothing is left to send.
    pub async fn run_cycle(&self, token: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::new(self.clock.now());
        let span = info_span!("cycle", cycle_id = %report.cycle_id);

        async {
            info!("Starting pipeline cycle");
            match self.run_stages(&mut report, token).await {
                Ok(()) => {}
                Err(DigestError::Cancelled) => {
                    warn!("Cycle cancelled");
                    report.cancelled = true;
                }
                Err(e) => error!("Cycle aborted: {}", e),
            }

            let elapsed = self.clock.now() - report.started_at;
            info!(
                harvested = report.harvested,
                enriched = report.enriched,
                summarized = report.summarized,
                delivered = report.delivered,
                errors = report.errors.len(),
                "Cycle finished in {}",
                format_duration(elapsed)
            );
        }
        .instrument(span)
        .await;

        report
    }

    async fn run_stages(&self, report: &mut CycleReport, token: &CancellationToken) -> Result<()> {
        self.discover_stage(report, token).await?;
        check(token)?;

        self.harvest_stage(report, token).await?;
        check(token)?;

        match self.enricher.enrich_new(token).await {
            Ok(r) => {
                report.enriched += r.scored;
                report.summarized += r.summarized;
            }
            Err(DigestError::Cancelled) => return Err(DigestError::Cancelled),
            Err(e) => {
                warn!("Enrich stage failed: {}", e);
                report.record(Stage::Enrich, e);
            }
        }

        match self.enricher.retry_unsummarized(token).await {
            Ok(r) => report.summarized += r.summarized,
            Err(DigestError::Cancelled) => return Err(DigestError::Cancelled),
            Err(e) => {
                warn!("Summary retry stage failed: {}", e);
                report.record(Stage::RetrySummaries, e);
            }
        }

        check(token)?;
        self.deliver(self.config.delivery_window, report, token).await
    }

    async fn discover_stage(&self, report: &mut CycleReport, token: &CancellationToken) -> Result<()> {
        let Some(discovery) = &self.discovery else {
            return Ok(());
        };

        if !self.config.refresh_sources {
            match self.store.list_sources().await {
                Ok(existing) if !existing.is_empty() => return Ok(()),
                Ok(_) => info!("No sources stored yet, running discovery"),
                Err(e) => {
                    report.record(Stage::Discover, e);
                    return Ok(());
                }
            }
        }

        match discovery.discover(token).await {
            Ok(sources) => match self.store.upsert_sources(&sources).await {
                Ok(()) => report.discovered = sources.len(),
                Err(e) => {
                    warn!("Failed to save sources: {}", e);
                    report.record(Stage::Discover, e);
                }
            },
            Err(DigestError::Cancelled) => return Err(DigestError::Cancelled),
            Err(e) => {
                warn!("Source discovery failed: {}", e);
                report.record(Stage::Discover, e);
            }
        }
        Ok(())
    }

    async fn harvest_stage(&self, report: &mut CycleReport, token: &CancellationToken) -> Result<()> {
        let sources = match self.store.list_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                warn!("Could not load sources: {}", e);
                report.record(Stage::Harvest, e);
                return Ok(());
            }
        };

        if sources.is_empty() {
            warn!("No sources to harvest");
            return Ok(());
        }

        let harvest = self.harvester.harvest(&sources, token).await;
        check(token)?;

        report.harvested = harvest.items_inserted;
        for (domain, message) in harvest.errors {
            report.record(Stage::Harvest, format!("{domain}: {message}"));
        }
        Ok(())
    }

    /// Select, aggregate, send and mark. Only a successful send marks items.
    pub async fn deliver(
        &self,
        window: Window,
        report: &mut CycleReport,
        token: &CancellationToken,
    ) -> Result<()> {
        let selected = match self.selector.undelivered(window).await {
            Ok(selected) => selected,
            Err(e) => {
                warn!("Selection failed: {}", e);
                report.record(Stage::Select, e);
                return Ok(());
            }
        };

        if selected.is_empty() {
            info!("No new items to deliver");
            return Ok(());
        }

        let Some(notifier) = &self.notifier else {
            info!(
                "{} items ready but no delivery channel configured",
                selected.len()
            );
            return Ok(());
        };

        let trends: Option<TrendReport> = match self.trends.aggregate(&selected, token).await {
            Ok(trends) => Some(trends),
            Err(DigestError::Cancelled) => return Err(DigestError::Cancelled),
            Err(e) => {
                warn!("Trend analysis failed: {}", e);
                report.record(Stage::Aggregate, e);
                if !self.config.deliver_without_trends {
                    info!("Skipping delivery until trends are available");
                    return Ok(());
                }
                None
            }
        };

        let (title, body) = format_digest(&selected, trends.as_ref(), window);

        match or_cancel(token, notifier.send(&title, &body)).await {
            Ok(()) => {}
            Err(DigestError::Cancelled) => return Err(DigestError::Cancelled),
            Err(e) => {
                error!(channel = %notifier.channel_name(), "Delivery failed: {}", e);
                report.record(Stage::Deliver, e);
                return Ok(());
            }
        }

        let ids: Vec<_> = selected.iter().map(|s| s.item.id).collect();
        match self.store.mark_delivered(&ids).await {
            Ok(()) => {
                report.delivered = ids.len();
                info!(channel = %notifier.channel_name(), "Delivered {} items", ids.len());
            }
            Err(e) => {
                error!("Failed to mark delivered items: {}", e);
                report.record(Stage::MarkDelivered, e);
            }
        }
        Ok(())
    }

    /// Run a cycle now and then every `interval` until the token fires.
    /// Returns the number of completed cycles.
    pub async fn run_scheduled(&self, interval: Duration, token: &CancellationToken) -> usize {
        let mut cycles = 0;
        loop {
            let report = self.run_cycle(token).await;
            if report.cancelled {
                break;
            }
            cycles += 1;

            info!("Next cycle in {}s", interval.as_secs());
            let waited = or_cancel(token, async {
                self.clock.sleep(interval).await;
                Ok(())
            })
            .await;
            if waited.is_err() {
                break;
            }
        }
        info!("Scheduler stopped after {} cycles", cycles);
        cycles
    }
}
