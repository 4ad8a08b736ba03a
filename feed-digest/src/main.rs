use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use feed_digest::{
    ChatCompletionAdapter, Clock, Config, CycleReport, Fetcher, ItemStore, format_report,
    Pipeline, SourceDiscovery, SqliteStore, SystemClock, TelegramNotifier, Window,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "feed-digest", version, about = "Harvest, score and deliver a digest of popular blogs")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = feed_digest::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Overrides the configured log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh the ranked source list
    Discover,
    /// Harvest the latest entries of every stored source
    Harvest,
    /// Score and summarize items that have not been enriched yet
    Enrich {
        #[arg(long, default_value = "7days")]
        window: String,
    },
    /// Print the ranked items of a window
    Report {
        #[arg(long, default_value = "7days")]
        window: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Deliver undelivered items of a window
    Notify {
        #[arg(long, default_value = "7days")]
        window: String,
    },
    /// Show a single enriched item
    Show { id: i64 },
    /// Run one full cycle
    RunOnce,
    /// Run a cycle now and then on a fixed interval
    Run {
        #[arg(long)]
        interval_hours: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    tracing_subscriber::fmt()
        .with_max_level(config.logging.level()?)
        .with_target(false)
        .init();

    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, shutting down");
            ctrl_c_token.cancel();
        }
    });

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn ItemStore> = Arc::new(
        SqliteStore::connect(&config.database.path, clock.clone())
            .await
            .context("Failed to open database")?,
    );

    let backend = Arc::new(ChatCompletionAdapter::new(config.model.clone())?);
    let transport = Arc::new(Fetcher::new(&config.harvest)?);

    let mut pipeline = Pipeline::new(store.clone(), backend, transport, clock.clone(), &config);
    if let Some(notifier) = TelegramNotifier::from_config(&config.telegram)? {
        pipeline = pipeline.with_notifier(Arc::new(notifier));
    }

    match cli.command {
        Command::Discover => {
            let discovery = SourceDiscovery::new(config.discovery.clone())?;
            let sources = discovery.discover(&token).await?;
            store.upsert_sources(&sources).await?;
            for source in &sources {
                println!("{:>3}. {} (score {}, {})", source.rank, source.domain, source.score, source.author);
            }
        }
        Command::Harvest => {
            let sources = store.list_sources().await?;
            if sources.is_empty() {
                bail!("No sources stored; run `feed-digest discover` first");
            }
            let report = pipeline.harvester().harvest(&sources, &token).await;
            println!(
                "Harvested {}/{} sources, {} new items",
                report.sources_succeeded, report.sources_attempted, report.items_inserted
            );
        }
        Command::Enrich { window } => {
            let window: Window = window.parse()?;
            let enricher = pipeline.enricher();
            let scored = enricher.enrich_new_in(window, &token).await?;
            let retried = enricher.retry_unsummarized_in(window, &token).await?;
            println!(
                "Scored {} of {} items, {} summaries written",
                scored.scored,
                scored.candidates,
                scored.summarized + retried.summarized
            );
        }
        Command::Report { window, limit } => {
            let window: Window = window.parse()?;
            let ranked = pipeline.selector().ranked(window, limit).await?;
            if ranked.is_empty() {
                bail!("No enriched items in the last {}; run `feed-digest enrich` first", window);
            }

            info!("Generating trend report...");
            let trends = match pipeline.trends().aggregate(&ranked, &token).await {
                Ok(trends) => Some(trends),
                Err(e) => {
                    warn!("Trend analysis failed: {}", e);
                    None
                }
            };
            println!("{}", format_report(&ranked, trends.as_ref(), window));
        }
        Command::Notify { window } => {
            let window: Window = window.parse()?;
            if !pipeline.has_notifier() {
                bail!("Telegram is not configured (set TG_BOT_TOKEN and TG_CHAT_ID)");
            }
            let mut report = CycleReport::new(clock.now());
            pipeline.deliver(window, &mut report, &token).await?;
            for e in &report.errors {
                error!(stage = ?e.stage, "{}", e.message);
            }
            println!("Delivered {} items", report.delivered);
        }
        Command::Show { id } => {
            let Some(entry) = store.item_with_enrichment(id).await? else {
                bail!("No enriched item with id {}", id);
            };
            let (item, enrichment) = (&entry.item, &entry.enrichment);
            println!("{} (#{})", item.title, item.id);
            println!("  source:     {}", item.source);
            println!("  url:        {}", item.url);
            if let Some(published) = item.published_at {
                println!("  published:  {}", published.to_rfc3339());
            }
            println!(
                "  score:      {} (relevance {}, quality {}, timeliness {})",
                enrichment.total_score(),
                enrichment.scores.relevance,
                enrichment.scores.quality,
                enrichment.scores.timeliness
            );
            println!("  category:   {}", enrichment.category);
            println!("  keywords:   {}", enrichment.keywords.join(", "));
            if !enrichment.translated_title.is_empty() {
                println!("  title (zh): {}", enrichment.translated_title);
            }
            if !enrichment.rationale.is_empty() {
                println!("  why:        {}", enrichment.rationale);
            }
            match enrichment.delivered_at {
                Some(at) => println!("  delivered:  {}", at.to_rfc3339()),
                None => println!("  delivered:  no"),
            }
            if enrichment.is_summarized() {
                println!("\n{}", enrichment.synopsis);
            }
        }
        Command::RunOnce => {
            let pipeline = attach_discovery(pipeline, &config)?;
            let report = pipeline.run_cycle(&token).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Run { interval_hours } => {
            let pipeline = attach_discovery(pipeline, &config)?;
            let hours = interval_hours.unwrap_or(config.pipeline.interval_hours).max(1);
            info!("Scheduler started, running every {}h", hours);
            pipeline
                .run_scheduled(Duration::from_secs(hours * 3600), &token)
                .await;
        }
    }

    Ok(())
}

fn attach_discovery(pipeline: Pipeline, config: &Config) -> Result<Pipeline> {
    let discovery = SourceDiscovery::new(config.discovery.clone())?;
    Ok(pipeline.with_discovery(discovery))
}
