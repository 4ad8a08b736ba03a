#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use feed_digest::enricher::{SCORE_SYSTEM_PROMPT, SUMMARY_SYSTEM_PROMPT};
use feed_digest::trends::TRENDS_SYSTEM_PROMPT;
use feed_digest::{
    Clock, DigestError, Enrichment, FeedTransport, Item, ItemId, ItemStore, ItemWithEnrichment,
    ModelBackend, NewItem, Notifier, RawFeedItem, Result, Source, SqliteStore, SubScores, Window,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// 2025-03-10T12:00:00Z
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
}

pub fn hours_ago(hours: i64) -> DateTime<Utc> {
    fixed_now() - chrono::Duration::hours(hours)
}

/// Clock frozen at a fixed instant. `sleep` returns immediately, advances the
/// clock and records the requested duration.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Score,
    Summary,
    Trends,
}

impl PromptKind {
    fn of(system_prompt: &str) -> Self {
        if system_prompt == SCORE_SYSTEM_PROMPT {
            PromptKind::Score
        } else if system_prompt == SUMMARY_SYSTEM_PROMPT {
            PromptKind::Summary
        } else if system_prompt == TRENDS_SYSTEM_PROMPT {
            PromptKind::Trends
        } else {
            panic!("unexpected system prompt: {system_prompt}")
        }
    }
}

/// Model backend answering from per-prompt queues, falling back to a fixed
/// default per prompt kind. `Err` entries become backend failures.
#[derive(Default)]
pub struct ScriptedBackend {
    queued: Mutex<HashMap<PromptKind, VecDeque<std::result::Result<String, String>>>>,
    defaults: Mutex<HashMap<PromptKind, std::result::Result<String, String>>>,
    calls: Mutex<Vec<(PromptKind, String)>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Backend that scores everything 9/8/7, summarizes and finds one trend.
    pub fn happy() -> Arc<Self> {
        let backend = Self::new();
        backend.set_default(PromptKind::Score, Ok(score_json(9, 8, 7)));
        backend.set_default(PromptKind::Summary, Ok(summary_json("A synopsis.")));
        backend.set_default(
            PromptKind::Trends,
            Ok(r#"{"trends":[{"title":"Rust everywhere","description":"More Rust.","articles":[]}]}"#.to_string()),
        );
        backend
    }

    pub fn push(&self, kind: PromptKind, response: std::result::Result<String, String>) {
        self.queued
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(response);
    }

    pub fn set_default(&self, kind: PromptKind, response: std::result::Result<String, String>) {
        self.defaults.lock().unwrap().insert(kind, response);
    }

    pub fn calls(&self, kind: PromptKind) -> usize {
        self.calls.lock().unwrap().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn prompts(&self, kind: PromptKind) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn backend_name(&self) -> String {
        "scripted".to_string()
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let kind = PromptKind::of(system_prompt);
        self.calls.lock().unwrap().push((kind, user_prompt.to_string()));

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(|q| q.pop_front());
        let response = queued.or_else(|| self.defaults.lock().unwrap().get(&kind).cloned());

        match response {
            Some(Ok(text)) => Ok(text),
            Some(Err(body)) => Err(DigestError::Backend { status: 500, body }),
            None => Err(DigestError::Backend {
                status: 500,
                body: format!("no scripted response for {kind:?}"),
            }),
        }
    }
}

pub enum FeedBehavior {
    Entries(Vec<RawFeedItem>),
    /// Entries served after a delay on the tokio clock.
    Slow(Duration, Vec<RawFeedItem>),
    Fail,
    Hang,
}

/// Transport serving canned feeds by URL. Unknown URLs fail.
#[derive(Default)]
pub struct FakeTransport {
    feeds: Mutex<HashMap<String, FeedBehavior>>,
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, behavior: FeedBehavior) {
        self.feeds.lock().unwrap().insert(url.to_string(), behavior);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Highest number of fetches that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedTransport for FakeTransport {
    async fn fetch_feed(&self, url: &str) -> Result<Vec<RawFeedItem>> {
        self.requests.lock().unwrap().push(url.to_string());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let slow = match self.feeds.lock().unwrap().get(url) {
            Some(FeedBehavior::Slow(delay, entries)) => Some((*delay, entries.clone())),
            _ => None,
        };
        if let Some((delay, entries)) = slow {
            tokio::time::sleep(delay).await;
            return Ok(entries);
        }

        let outcome = match self.feeds.lock().unwrap().get(url) {
            Some(FeedBehavior::Entries(entries)) => Some(Ok(entries.clone())),
            Some(FeedBehavior::Slow(..)) => None,
            Some(FeedBehavior::Fail) => Some(Err(DigestError::General("HTTP 500".into()))),
            Some(FeedBehavior::Hang) => None,
            None => Some(Err(DigestError::General("HTTP 404".into()))),
        };

        match outcome {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    fail: bool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel_name(&self) -> String {
        "recording".to_string()
    }

    async fn send(&self, title: &str, body: &str) -> Result<()> {
        if self.fail {
            return Err(DigestError::Delivery("channel unavailable".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

/// Store kept in memory for tests that run with a paused tokio clock.
#[derive(Default)]
pub struct MemoryStore {
    sources: Mutex<Vec<Source>>,
    items: Mutex<Vec<Item>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn items(&self) -> Vec<Item> {
        self.items.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn upsert_sources(&self, sources: &[Source]) -> Result<()> {
        *self.sources.lock().unwrap() = sources.to_vec();
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(self.sources.lock().unwrap().clone())
    }

    async fn insert_item_if_absent(&self, item: &NewItem) -> Result<bool> {
        let mut items = self.items.lock().unwrap();
        if items.iter().any(|i| i.url == item.url) {
            return Ok(false);
        }
        let id = items.len() as ItemId + 1;
        items.push(Item {
            id,
            source: item.source.clone(),
            title: item.title.clone(),
            url: item.url.clone(),
            summary: item.summary.clone(),
            published_at: item.published_at,
            harvested_at: item.harvested_at,
        });
        Ok(true)
    }

    async fn items_in_window(&self, _window: Window) -> Result<Vec<Item>> {
        Ok(self.items())
    }

    async fn unenriched_items(&self, _window: Window) -> Result<Vec<Item>> {
        Ok(Vec::new())
    }

    async fn unsummarized_items(&self, _window: Window) -> Result<Vec<ItemWithEnrichment>> {
        Ok(Vec::new())
    }

    async fn ranked_enriched(
        &self,
        _window: Window,
        _limit: Option<usize>,
    ) -> Result<Vec<ItemWithEnrichment>> {
        Ok(Vec::new())
    }

    async fn undelivered_ranked(
        &self,
        _window: Window,
        _limit: usize,
    ) -> Result<Vec<ItemWithEnrichment>> {
        Ok(Vec::new())
    }

    async fn upsert_enrichment(&self, _enrichment: &Enrichment) -> Result<()> {
        Ok(())
    }

    async fn mark_delivered(&self, _ids: &[ItemId]) -> Result<()> {
        Ok(())
    }

    async fn item_with_enrichment(&self, _id: ItemId) -> Result<Option<ItemWithEnrichment>> {
        Ok(None)
    }

    async fn latest_items(&self, limit: usize) -> Result<Vec<Item>> {
        Ok(self.items().into_iter().rev().take(limit).collect())
    }
}

pub async fn sqlite_store(clock: Arc<FakeClock>) -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory(clock).await.unwrap())
}

pub fn source(domain: &str, rank: u32, score: i64) -> Source {
    Source {
        domain: domain.to_string(),
        score,
        author: format!("author of {domain}"),
        rank,
    }
}

pub fn raw_entry(title: &str, link: &str, published: Option<DateTime<Utc>>) -> RawFeedItem {
    RawFeedItem {
        title: Some(title.to_string()),
        published,
        summary: Some(format!("<p>About {title}</p>")),
        link: Some(link.to_string()),
        alternate_links: vec![link.to_string()],
        ..Default::default()
    }
}

pub fn new_item(source: &str, title: &str, url: &str, published: Option<DateTime<Utc>>) -> NewItem {
    NewItem {
        source: source.to_string(),
        title: title.to_string(),
        url: url.to_string(),
        summary: format!("About {title}"),
        published_at: published,
        harvested_at: fixed_now(),
    }
}

pub fn enrichment(item_id: ItemId, relevance: u8, quality: u8, timeliness: u8) -> Enrichment {
    Enrichment {
        item_id,
        scores: SubScores {
            relevance,
            quality,
            timeliness,
        },
        category: "Systems".to_string(),
        keywords: vec!["rust".to_string(), "sqlite".to_string()],
        synopsis: String::new(),
        translated_title: String::new(),
        rationale: String::new(),
        enriched_at: fixed_now(),
        delivered_at: None,
    }
}

pub fn score_json(relevance: u8, quality: u8, timeliness: u8) -> String {
    format!(
        r#"{{"relevance":{relevance},"quality":{quality},"timeliness":{timeliness},"category":"Systems","keywords":["rust","async"]}}"#
    )
}

pub fn summary_json(synopsis: &str) -> String {
    format!(r#"{{"summary":"{synopsis}","title_cn":"标题","recommend_reason":"值得一读"}}"#)
}

/// Insert an item and return its id.
pub async fn insert(store: &dyn ItemStore, item: NewItem) -> ItemId {
    assert!(store.insert_item_if_absent(&item).await.unwrap());
    store
        .latest_items(100)
        .await
        .unwrap()
        .into_iter()
        .find(|i| i.url == item.url)
        .map(|i| i.id)
        .unwrap()
}
