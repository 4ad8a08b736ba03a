pub mod config;
pub mod digest;
pub mod discovery;
pub mod enricher;
pub mod fetcher;
pub mod harvester;
pub mod llm_adapter;
pub mod notifier;
pub mod parser;
pub mod pipeline;
pub mod retry;
pub mod rss_utils;
pub mod selector;
pub mod store;
pub mod traits;
pub mod trends;
pub mod types;
pub mod utils;

pub use config::Config;
pub use digest::{format_digest, format_report};
pub use discovery::SourceDiscovery;
pub use enricher::{EnrichReport, Enricher};
pub use fetcher::Fetcher;
pub use harvester::{HarvestReport, Harvester};
pub use llm_adapter::ChatCompletionAdapter;
pub use notifier::TelegramNotifier;
pub use parser::FeedParser;
pub use pipeline::Pipeline;
pub use retry::{LinearBackoff, RetryPolicy};
pub use selector::Selector;
pub use store::SqliteStore;
pub use traits::{Clock, FeedTransport, ItemStore, ModelBackend, Notifier, SystemClock};
pub use trends::{Trend, TrendAggregator, TrendReport};
pub use types::*;
