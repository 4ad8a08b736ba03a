mod common;

use common::*;
use feed_digest::{ItemStore, Window};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_insert_is_idempotent_by_url() {
    init_tracing();
    let store = sqlite_store(FakeClock::new(fixed_now())).await;

    let item = new_item("a.example", "Hello", "https://a.example/hello", Some(hours_ago(1)));
    assert!(store.insert_item_if_absent(&item).await.unwrap());

    let mut retitled = item.clone();
    retitled.title = "Hello again".to_string();
    assert!(!store.insert_item_if_absent(&retitled).await.unwrap());

    let items = store.items_in_window(Window::Week).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Hello");
}

#[tokio::test]
async fn test_window_boundary_is_inclusive_and_skips_unknown_dates() {
    let store = sqlite_store(FakeClock::new(fixed_now())).await;

    let cases = [
        ("now", Some(fixed_now())),
        ("boundary", Some(hours_ago(24))),
        ("just-outside", Some(hours_ago(24) - chrono::Duration::seconds(1))),
        ("undated", None),
    ];
    for (name, published) in cases {
        let url = format!("https://a.example/{name}");
        insert(store.as_ref(), new_item("a.example", name, &url, published)).await;
    }

    let mut titles: Vec<String> = store
        .items_in_window(Window::Day)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.title)
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["boundary".to_string(), "now".to_string()]);

    // Undated items never enter a window, however wide.
    let week = store.items_in_window(Window::Week).await.unwrap();
    assert_eq!(week.len(), 3);
    assert!(week.iter().all(|i| i.published_at.is_some()));
}

#[tokio::test]
async fn test_total_score_is_derived_from_sub_scores() {
    let store = sqlite_store(FakeClock::new(fixed_now())).await;
    let id = insert(
        store.as_ref(),
        new_item("a.example", "Scored", "https://a.example/s", Some(hours_ago(2))),
    )
    .await;

    store.upsert_enrichment(&enrichment(id, 7, 8, 9)).await.unwrap();
    store.upsert_enrichment(&enrichment(id, 1, 2, 3)).await.unwrap();

    let total: i64 = sqlx::query_scalar("SELECT total_score FROM enrichments WHERE item_id = ?")
        .bind(id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(total, 6);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrichments")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let stored = store.item_with_enrichment(id).await.unwrap().unwrap();
    assert_eq!(stored.enrichment.total_score(), 6);
    assert_eq!(stored.enrichment.keywords, vec!["rust", "sqlite"]);
}

#[tokio::test]
async fn test_ranking_respects_window_and_score() {
    let store = sqlite_store(FakeClock::new(fixed_now())).await;
    store
        .upsert_sources(&[source("a.example", 1, 500), source("b.example", 2, 200)])
        .await
        .unwrap();

    let x = insert(
        store.as_ref(),
        new_item("b.example", "X", "https://b.example/x", Some(hours_ago(2))),
    )
    .await;
    let y = insert(
        store.as_ref(),
        new_item("a.example", "Y", "https://a.example/y", Some(hours_ago(30))),
    )
    .await;
    store.upsert_enrichment(&enrichment(x, 9, 8, 7)).await.unwrap();
    store.upsert_enrichment(&enrichment(y, 5, 5, 5)).await.unwrap();

    let day = store.ranked_enriched(Window::Day, Some(10)).await.unwrap();
    assert_eq!(day.len(), 1);
    assert_eq!(day[0].item.title, "X");
    assert_eq!(day[0].enrichment.total_score(), 24);

    let week: Vec<String> = store
        .ranked_enriched(Window::Week, Some(10))
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.item.title)
        .collect();
    assert_eq!(week, vec!["X", "Y"]);

    let sources = store.list_sources().await.unwrap();
    assert_eq!(sources[0].domain, "a.example");
    assert_eq!(sources[1].rank, 2);
}

#[tokio::test]
async fn test_ranking_ties_prefer_newer_items() {
    let store = sqlite_store(FakeClock::new(fixed_now())).await;
    let older = insert(
        store.as_ref(),
        new_item("a.example", "Older", "https://a.example/old", Some(hours_ago(10))),
    )
    .await;
    let newer = insert(
        store.as_ref(),
        new_item("a.example", "Newer", "https://a.example/new", Some(hours_ago(1))),
    )
    .await;
    store.upsert_enrichment(&enrichment(older, 6, 6, 6)).await.unwrap();
    store.upsert_enrichment(&enrichment(newer, 5, 6, 7)).await.unwrap();

    let ranked = store.ranked_enriched(Window::Day, None).await.unwrap();
    let titles: Vec<&str> = ranked.iter().map(|e| e.item.title.as_str()).collect();
    assert_eq!(titles, vec!["Newer", "Older"]);
}

#[tokio::test]
async fn test_delivered_items_never_return() {
    let clock = FakeClock::new(fixed_now());
    let store = sqlite_store(clock.clone()).await;
    let id = insert(
        store.as_ref(),
        new_item("a.example", "Once", "https://a.example/once", Some(hours_ago(3))),
    )
    .await;
    store.upsert_enrichment(&enrichment(id, 8, 8, 8)).await.unwrap();

    assert_eq!(store.undelivered_ranked(Window::Day, 20).await.unwrap().len(), 1);
    store.mark_delivered(&[id]).await.unwrap();

    for window in Window::ALL {
        assert!(store.undelivered_ranked(window, 20).await.unwrap().is_empty());
    }

    // A second mark does not move the original timestamp.
    let first = store
        .item_with_enrichment(id)
        .await
        .unwrap()
        .unwrap()
        .enrichment
        .delivered_at;
    clock.set(fixed_now() + chrono::Duration::hours(1));
    store.mark_delivered(&[id]).await.unwrap();
    let second = store
        .item_with_enrichment(id)
        .await
        .unwrap()
        .unwrap()
        .enrichment
        .delivered_at;
    assert_eq!(first, Some(fixed_now()));
    assert_eq!(second, first);
}

#[tokio::test]
async fn test_re_enrichment_keeps_delivery_mark() {
    let store = sqlite_store(FakeClock::new(fixed_now())).await;
    let id = insert(
        store.as_ref(),
        new_item("a.example", "Sticky", "https://a.example/sticky", Some(hours_ago(3))),
    )
    .await;
    store.upsert_enrichment(&enrichment(id, 4, 4, 4)).await.unwrap();
    store.mark_delivered(&[id]).await.unwrap();

    let mut updated = enrichment(id, 9, 9, 9);
    updated.synopsis = "Rewritten".to_string();
    store.upsert_enrichment(&updated).await.unwrap();

    let stored = store.item_with_enrichment(id).await.unwrap().unwrap();
    assert_eq!(stored.enrichment.synopsis, "Rewritten");
    assert_eq!(stored.enrichment.total_score(), 27);
    assert!(stored.enrichment.delivered_at.is_some());
    assert!(store.undelivered_ranked(Window::Week, 20).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unenriched_and_unsummarized_queues() {
    let store = sqlite_store(FakeClock::new(fixed_now())).await;
    let scored = insert(
        store.as_ref(),
        new_item("a.example", "Scored", "https://a.example/1", Some(hours_ago(5))),
    )
    .await;
    insert(
        store.as_ref(),
        new_item("a.example", "Fresh", "https://a.example/2", Some(hours_ago(5))),
    )
    .await;
    store.upsert_enrichment(&enrichment(scored, 5, 5, 5)).await.unwrap();

    let pending = store.unenriched_items(Window::Week).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].title, "Fresh");

    let unsummarized = store.unsummarized_items(Window::Week).await.unwrap();
    assert_eq!(unsummarized.len(), 1);
    assert_eq!(unsummarized[0].item.id, scored);
}

#[tokio::test]
async fn test_undelivered_is_capped() {
    let store = sqlite_store(FakeClock::new(fixed_now())).await;
    for n in 0..25 {
        let url = format!("https://a.example/{n}");
        let id = insert(
            store.as_ref(),
            new_item("a.example", &format!("Item {n}"), &url, Some(hours_ago(1))),
        )
        .await;
        store.upsert_enrichment(&enrichment(id, 5, 5, 5)).await.unwrap();
    }

    assert_eq!(store.undelivered_ranked(Window::Day, 20).await.unwrap().len(), 20);
    assert_eq!(store.ranked_enriched(Window::Day, None).await.unwrap().len(), 25);
}

#[tokio::test]
async fn test_sources_upsert_replaces_rank() {
    let store = sqlite_store(FakeClock::new(fixed_now())).await;
    store
        .upsert_sources(&[source("a.example", 1, 500), source("b.example", 2, 200)])
        .await
        .unwrap();
    store
        .upsert_sources(&[source("b.example", 1, 900)])
        .await
        .unwrap();

    let sources = store.list_sources().await.unwrap();
    assert_eq!(sources.len(), 2);
    let b = sources.iter().find(|s| s.domain == "b.example").unwrap();
    assert_eq!((b.rank, b.score), (1, 900));
}

#[tokio::test]
async fn test_database_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("digest.db");

    {
        let store = feed_digest::SqliteStore::connect(&path, FakeClock::new(fixed_now()))
            .await
            .unwrap();
        let item = new_item("a.example", "Kept", "https://a.example/kept", Some(hours_ago(1)));
        assert!(store.insert_item_if_absent(&item).await.unwrap());
        store.pool().close().await;
    }

    let store = feed_digest::SqliteStore::connect(&path, FakeClock::new(fixed_now()))
        .await
        .unwrap();
    let items = store.latest_items(10).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Kept");
}

#[tokio::test]
async fn test_selector_reads_by_window_name() {
    let store = sqlite_store(FakeClock::new(fixed_now())).await;
    let id = insert(
        store.as_ref(),
        new_item("a.example", "Named", "https://a.example/named", Some(hours_ago(50))),
    )
    .await;
    store.upsert_enrichment(&enrichment(id, 5, 5, 5)).await.unwrap();

    let selector = feed_digest::Selector::new(store.clone(), 20);
    assert!(selector.ranked_by_name("24h", None).await.unwrap().is_empty());
    assert_eq!(selector.ranked_by_name("3days", None).await.unwrap().len(), 1);
    assert_eq!(selector.undelivered(Window::ThreeDays).await.unwrap().len(), 1);

    let err = selector.ranked_by_name("fortnight", None).await.unwrap_err();
    assert!(matches!(err, feed_digest::DigestError::UnknownWindow(_)));
}

#[tokio::test]
async fn test_window_boundary_is_exact_below_one_second() {
    let store = sqlite_store(FakeClock::new(fixed_now())).await;
    let cutoff = hours_ago(24);

    let cases = [
        ("on-cutoff", cutoff),
        ("just-inside", cutoff + chrono::Duration::milliseconds(1)),
        ("half-second-early", cutoff - chrono::Duration::milliseconds(500)),
        ("one-ms-early", cutoff - chrono::Duration::milliseconds(1)),
    ];
    for (name, published) in cases {
        let url = format!("https://a.example/{name}");
        insert(store.as_ref(), new_item("a.example", name, &url, Some(published))).await;
    }

    let mut titles: Vec<String> = store
        .items_in_window(Window::Day)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.title)
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["just-inside".to_string(), "on-cutoff".to_string()]);

    let stored = store.latest_items(10).await.unwrap();
    let early = stored.iter().find(|i| i.title == "half-second-early").unwrap();
    assert_eq!(early.published_at, Some(cutoff - chrono::Duration::milliseconds(500)));
}

#[tokio::test]
async fn test_corrupt_rows_surface_as_errors() {
    let store = sqlite_store(FakeClock::new(fixed_now())).await;
    let id = insert(
        store.as_ref(),
        new_item("a.example", "Broken", "https://a.example/broken", Some(hours_ago(1))),
    )
    .await;
    store.upsert_enrichment(&enrichment(id, 5, 5, 5)).await.unwrap();

    let corruptions = [
        "UPDATE enrichments SET keywords = 'not json'",
        "UPDATE enrichments SET keywords = '[]', relevance = 300",
        "UPDATE enrichments SET relevance = 5, delivered_at = 'yesterday'",
    ];
    for statement in corruptions {
        sqlx::query(statement).execute(store.pool()).await.unwrap();
        let err = store.item_with_enrichment(id).await.unwrap_err();
        assert!(
            matches!(err, feed_digest::DigestError::General(_)),
            "{statement}: {err}"
        );
    }

    sqlx::query("UPDATE enrichments SET delivered_at = NULL")
        .execute(store.pool())
        .await
        .unwrap();
    assert!(store.item_with_enrichment(id).await.unwrap().is_some());

    sqlx::query("INSERT INTO sources (domain, score, author, rank) VALUES ('neg.example', 1, '', -1)")
        .execute(store.pool())
        .await
        .unwrap();
    assert!(store.list_sources().await.is_err());
}
