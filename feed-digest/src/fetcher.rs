use crate::parser::FeedParser;
use crate::traits::FeedTransport;
use crate::types::{DigestError, HarvestConfig, RawFeedItem, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Retrieves a feed over HTTP and hands the body to the feed parser.
pub struct Fetcher {
    client: Client,
    parser: FeedParser,
    timeout_seconds: u64,
}

impl Fetcher {
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            parser: FeedParser::new(),
            timeout_seconds: config.request_timeout_seconds,
        })
    }

    async fn fetch_body(&self, url: &str) -> Result<Vec<u8>> {
        let url = Url::parse(url)?;
        let start_time = Instant::now();

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                DigestError::Timeout {
                    url: url.to_string(),
                    seconds: self.timeout_seconds,
                }
            } else {
                DigestError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DigestError::General(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body = response.bytes().await?;
        debug!(
            "Fetched {} ({} bytes in {}ms)",
            url,
            body.len(),
            start_time.elapsed().as_millis()
        );
        Ok(body.to_vec())
    }
}

#[async_trait]
impl FeedTransport for Fetcher {
    async fn fetch_feed(&self, url: &str) -> Result<Vec<RawFeedItem>> {
        let body = self.fetch_body(url).await?;
        self.parser.parse_feed(&body)
    }
}
