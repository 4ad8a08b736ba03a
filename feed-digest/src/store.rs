use crate::traits::{Clock, ItemStore};
use crate::types::{
    DigestError, Enrichment, Item, ItemId, ItemWithEnrichment, NewItem, Result, Source, SubScores,
    Window,
};
use crate::utils::time::{from_db, to_db};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const ITEM_COLUMNS: &str =
    "i.id, i.source, i.title, i.url, i.summary, i.published_at, i.harvested_at";

const ENRICHMENT_COLUMNS: &str = "e.relevance, e.quality, e.timeliness, e.category, e.keywords, \
     e.synopsis, e.translated_title, e.rationale, e.enriched_at, e.delivered_at";

const RANK_ORDER: &str = "ORDER BY e.total_score DESC, i.published_at DESC, i.id ASC";

/// SQLite-backed [`ItemStore`]. One pooled connection, so writers are
/// serialized by the pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub async fn connect(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        info!("Opened database at {}", path.display());
        Self::with_pool(pool, clock).await
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;
        Self::with_pool(pool, clock).await
    }

    async fn with_pool(pool: SqlitePool, clock: Arc<dyn Clock>) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool, clock })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn cutoff(&self, window: Window) -> String {
        to_db(window.cutoff(self.clock.now()))
    }

    async fn fetch_joined(
        &self,
        filter: &str,
        window: Window,
        limit: Option<usize>,
    ) -> Result<Vec<ItemWithEnrichment>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {ITEM_COLUMNS}, {ENRICHMENT_COLUMNS} \
             FROM items i JOIN enrichments e ON e.item_id = i.id \
             WHERE i.published_at IS NOT NULL AND i.published_at >= "
        ));
        qb.push_bind(self.cutoff(window));
        qb.push(" ");
        qb.push(filter);
        qb.push(" ");
        qb.push(RANK_ORDER);
        if let Some(limit) = limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(joined_from_row).collect()
    }
}

#[async_trait]
impl ItemStore for SqliteStore {
    async fn upsert_sources(&self, sources: &[Source]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for source in sources {
            sqlx::query(
                r#"
                INSERT INTO sources (domain, score, author, rank)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(domain) DO UPDATE SET
                    score = excluded.score,
                    author = excluded.author,
                    rank = excluded.rank
                "#,
            )
            .bind(&source.domain)
            .bind(source.score)
            .bind(&source.author)
            .bind(i64::from(source.rank))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!("Saved {} sources", sources.len());
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query("SELECT domain, score, author, rank FROM sources ORDER BY rank, domain")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<Source> {
                let domain: String = row.try_get("domain")?;
                let rank: i64 = row.try_get("rank")?;
                let rank = u32::try_from(rank)
                    .map_err(|_| DigestError::General(format!("invalid rank for {domain}: {rank}")))?;
                Ok(Source {
                    score: row.try_get("score")?,
                    author: row.try_get("author")?,
                    domain,
                    rank,
                })
            })
            .collect()
    }

    async fn insert_item_if_absent(&self, item: &NewItem) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO items (source, title, url, summary, published_at, harvested_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(&item.source)
        .bind(&item.title)
        .bind(&item.url)
        .bind(&item.summary)
        .bind(item.published_at.map(to_db))
        .bind(to_db(item.harvested_at))
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() == 1;
        if inserted {
            debug!(url = %item.url, "new item");
        }
        Ok(inserted)
    }

    async fn items_in_window(&self, window: Window) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items i \
             WHERE i.published_at IS NOT NULL AND i.published_at >= ? \
             ORDER BY i.published_at DESC, i.id ASC"
        ))
        .bind(self.cutoff(window))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }

    async fn unenriched_items(&self, window: Window) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items i \
             LEFT JOIN enrichments e ON e.item_id = i.id \
             WHERE e.id IS NULL AND i.published_at IS NOT NULL AND i.published_at >= ? \
             ORDER BY i.published_at DESC, i.id ASC"
        ))
        .bind(self.cutoff(window))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }

    async fn unsummarized_items(&self, window: Window) -> Result<Vec<ItemWithEnrichment>> {
        self.fetch_joined("AND e.synopsis = ''", window, None).await
    }

    async fn ranked_enriched(
        &self,
        window: Window,
        limit: Option<usize>,
    ) -> Result<Vec<ItemWithEnrichment>> {
        self.fetch_joined("", window, limit).await
    }

    async fn undelivered_ranked(
        &self,
        window: Window,
        limit: usize,
    ) -> Result<Vec<ItemWithEnrichment>> {
        self.fetch_joined("AND e.delivered_at IS NULL", window, Some(limit))
            .await
    }

    async fn upsert_enrichment(&self, enrichment: &Enrichment) -> Result<()> {
        let keywords = serde_json::to_string(&enrichment.keywords)?;
        sqlx::query(
            r#"
            INSERT INTO enrichments (
                item_id, relevance, quality, timeliness, total_score, category, keywords,
                synopsis, translated_title, rationale, enriched_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(item_id) DO UPDATE SET
                relevance = excluded.relevance,
                quality = excluded.quality,
                timeliness = excluded.timeliness,
                total_score = excluded.total_score,
                category = excluded.category,
                keywords = excluded.keywords,
                synopsis = excluded.synopsis,
                translated_title = excluded.translated_title,
                rationale = excluded.rationale,
                enriched_at = excluded.enriched_at
            "#,
        )
        .bind(enrichment.item_id)
        .bind(i64::from(enrichment.scores.relevance))
        .bind(i64::from(enrichment.scores.quality))
        .bind(i64::from(enrichment.scores.timeliness))
        .bind(i64::from(enrichment.total_score()))
        .bind(&enrichment.category)
        .bind(keywords)
        .bind(&enrichment.synopsis)
        .bind(&enrichment.translated_title)
        .bind(&enrichment.rationale)
        .bind(to_db(enrichment.enriched_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_delivered(&self, ids: &[ItemId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE enrichments SET delivered_at = ");
        qb.push_bind(to_db(self.clock.now()));
        qb.push(" WHERE delivered_at IS NULL AND item_id IN (");
        let mut ids_list = qb.separated(", ");
        for id in ids {
            ids_list.push_bind(*id);
        }
        ids_list.push_unseparated(")");

        let result = qb.build().execute(&self.pool).await?;
        info!("Marked {} items as delivered", result.rows_affected());
        Ok(())
    }

    async fn item_with_enrichment(&self, id: ItemId) -> Result<Option<ItemWithEnrichment>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS}, {ENRICHMENT_COLUMNS} \
             FROM items i JOIN enrichments e ON e.item_id = i.id \
             WHERE i.id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(joined_from_row).transpose()
    }

    async fn latest_items(&self, limit: usize) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items i \
             ORDER BY i.harvested_at DESC, i.id DESC LIMIT ?"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }
}

fn timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    from_db(&raw).ok_or_else(|| DigestError::General(format!("invalid timestamp in {column}: {raw}")))
}

fn optional_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|raw| {
        from_db(&raw).ok_or_else(|| DigestError::General(format!("invalid timestamp in {column}: {raw}")))
    })
    .transpose()
}

fn score(row: &SqliteRow, column: &str) -> Result<u8> {
    let value: i64 = row.try_get(column)?;
    u8::try_from(value).map_err(|_| DigestError::General(format!("invalid score in {column}: {value}")))
}

fn item_from_row(row: &SqliteRow) -> Result<Item> {
    Ok(Item {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        summary: row.try_get("summary")?,
        published_at: optional_timestamp(row, "published_at")?,
        harvested_at: timestamp(row, "harvested_at")?,
    })
}

fn joined_from_row(row: &SqliteRow) -> Result<ItemWithEnrichment> {
    let item = item_from_row(row)?;
    let keywords: String = row.try_get("keywords")?;

    let enrichment = Enrichment {
        item_id: item.id,
        scores: SubScores {
            relevance: score(row, "relevance")?,
            quality: score(row, "quality")?,
            timeliness: score(row, "timeliness")?,
        },
        category: row.try_get("category")?,
        keywords: serde_json::from_str(&keywords)
            .map_err(|e| DigestError::General(format!("invalid keywords for item {}: {e}", item.id)))?,
        synopsis: row.try_get("synopsis")?,
        translated_title: row.try_get("translated_title")?,
        rationale: row.try_get("rationale")?,
        enriched_at: timestamp(row, "enriched_at")?,
        delivered_at: optional_timestamp(row, "delivered_at")?,
    };

    Ok(ItemWithEnrichment { item, enrichment })
}
