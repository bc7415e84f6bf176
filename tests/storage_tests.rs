//! Repository behaviour against in-memory stores: same-day idempotence,
//! daily accumulation, source isolation, backend upsert semantics.

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use llm_price_watch::config::StoreConfig;
use llm_price_watch::domain::{
    BackendModelRow, ModelProviderLink, ModelRecord, PricingSnapshot, ProviderRecord, SourceType,
};
use llm_price_watch::storage::{
    BackendRepository, BackendStore, CatalogRepository, PricingStore, SnapshotRepository,
    SqliteBackendRepository, SqliteCatalogRepository, SqliteSnapshotRepository,
};

async fn pricing_store() -> PricingStore {
    PricingStore::connect(&StoreConfig::default())
        .await
        .expect("in-memory pricing store")
}

async fn backend_store() -> BackendStore {
    BackendStore::connect(&StoreConfig::default())
        .await
        .expect("in-memory backend store")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn snapshot(
    model: &str,
    provider: Option<&str>,
    day: NaiveDate,
    source: SourceType,
) -> PricingSnapshot {
    let mut s = PricingSnapshot::new(model, provider.map(str::to_string), day, source);
    s.prompt_usd_per_million = Some(dec!(3));
    s.completion_usd_per_million = Some(dec!(15));
    s
}

async fn count_snapshots(store: &PricingStore) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM pricing_snapshots")
        .fetch_one(store.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn same_day_replace_is_idempotent_for_null_provider() {
    let store = pricing_store().await;
    let repo = SqliteSnapshotRepository::new(store.pool().clone());

    let day = date(2026, 1, 15);

    let first = snapshot("x/y", None, day, SourceType::AggregatorApi);
    repo.replace(&first).await.unwrap();

    let mut second = snapshot("x/y", None, day, SourceType::AggregatorApi);
    second.prompt_usd_per_million = Some(dec!(4));
    repo.replace(&second).await.unwrap();

    assert_eq!(count_snapshots(&store).await, 1);

    let latest = repo
        .latest("x/y", None, SourceType::AggregatorApi)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.prompt_usd_per_million, Some(dec!(4)));
    // The surviving row is the second write.
    assert_eq!(latest.id, second.id);
}

#[tokio::test]
async fn distinct_days_accumulate() {
    let store = pricing_store().await;
    let repo = SqliteSnapshotRepository::new(store.pool().clone());

    for day in [date(2026, 1, 15), date(2026, 1, 16), date(2026, 1, 17)] {
        repo.replace(&snapshot("x/y", None, day, SourceType::AggregatorApi))
            .await
            .unwrap();
    }

    assert_eq!(count_snapshots(&store).await, 3);

    // Latest is the newest day.
    let latest = repo
        .latest("x/y", None, SourceType::AggregatorApi)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.snapshot_date, date(2026, 1, 17));
}

#[tokio::test]
async fn null_provider_key_does_not_collide_with_named_provider() {
    let store = pricing_store().await;
    let repo = SqliteSnapshotRepository::new(store.pool().clone());

    let day = date(2026, 1, 15);

    repo.replace(&snapshot("x/y", None, day, SourceType::AggregatorApi))
        .await
        .unwrap();
    repo.replace(&snapshot("x/y", Some("acme"), day, SourceType::AggregatorApi))
        .await
        .unwrap();

    // Two rows: the NULL-provider key and the named-provider key.
    assert_eq!(count_snapshots(&store).await, 2);

    // Replacing the NULL-provider row leaves the named one alone.
    repo.replace(&snapshot("x/y", None, day, SourceType::AggregatorApi))
        .await
        .unwrap();
    assert_eq!(count_snapshots(&store).await, 2);
}

#[tokio::test]
async fn two_providers_same_day_are_two_rows() {
    let store = pricing_store().await;
    let repo = SqliteSnapshotRepository::new(store.pool().clone());

    let day = date(2026, 1, 15);
    repo.replace(&snapshot("x/y", Some("alpha"), day, SourceType::ProviderSite))
        .await
        .unwrap();
    repo.replace(&snapshot("x/y", Some("beta"), day, SourceType::ProviderSite))
        .await
        .unwrap();

    assert_eq!(count_snapshots(&store).await, 2);
}

#[tokio::test]
async fn latest_lookup_is_isolated_by_source_type() {
    let store = pricing_store().await;
    let repo = SqliteSnapshotRepository::new(store.pool().clone());

    let mut aggregator = snapshot("x/y", None, date(2026, 1, 10), SourceType::AggregatorApi);
    aggregator.prompt_usd_per_million = Some(dec!(1));
    repo.replace(&aggregator).await.unwrap();

    // A newer web-fallback row must not shadow the aggregator row.
    let mut web = snapshot("x/y", None, date(2026, 1, 16), SourceType::WebFallback);
    web.prompt_usd_per_million = Some(dec!(99));
    repo.replace(&web).await.unwrap();

    let latest = repo
        .latest("x/y", None, SourceType::AggregatorApi)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.prompt_usd_per_million, Some(dec!(1)));
    assert_eq!(latest.snapshot_date, date(2026, 1, 10));
}

#[tokio::test]
async fn list_since_honours_window_and_source() {
    let store = pricing_store().await;
    let repo = SqliteSnapshotRepository::new(store.pool().clone());

    repo.replace(&snapshot("x/old", None, date(2026, 1, 1), SourceType::AggregatorApi))
        .await
        .unwrap();
    repo.replace(&snapshot("x/new", None, date(2026, 1, 15), SourceType::AggregatorApi))
        .await
        .unwrap();
    repo.replace(&snapshot("x/other-source", None, date(2026, 1, 15), SourceType::WebFallback))
        .await
        .unwrap();

    let listed = repo
        .list_since(SourceType::AggregatorApi, date(2026, 1, 10))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].model_slug, "x/new");

    let slugs = repo
        .model_slugs_since(SourceType::AggregatorApi, date(2026, 1, 10))
        .await
        .unwrap();
    assert!(slugs.contains("x/new"));
    assert!(!slugs.contains("x/old"));
    assert!(!slugs.contains("x/other-source"));
}

#[tokio::test]
async fn monetary_columns_round_trip_exactly() {
    let store = pricing_store().await;
    let repo = SqliteSnapshotRepository::new(store.pool().clone());

    let mut s = snapshot("x/y", None, date(2026, 1, 15), SourceType::AggregatorApi);
    s.prompt_usd_per_million = Some(dec!(2.5));
    s.completion_usd_per_million = Some(dec!(0.000001));
    s.request_usd = Some(dec!(0.04));
    s.image_usd = Some(dec!(0.001));
    s.input_cache_read_usd_per_million = Some(dec!(0.3));
    repo.replace(&s).await.unwrap();

    let read = repo
        .latest("x/y", None, SourceType::AggregatorApi)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read.prompt_usd_per_million, Some(dec!(2.5)));
    assert_eq!(read.completion_usd_per_million, Some(dec!(0.000001)));
    assert_eq!(read.request_usd, Some(dec!(0.04)));
    assert_eq!(read.image_usd, Some(dec!(0.001)));
    assert_eq!(read.input_cache_read_usd_per_million, Some(dec!(0.3)));
    assert_eq!(read.currency, "USD");
}

#[tokio::test]
async fn catalog_upserts_are_idempotent_and_update_metadata() {
    let store = pricing_store().await;
    let repo = SqliteCatalogRepository::new(store.pool().clone());

    let provider = ProviderRecord::new("acme", "Acme AI").with_homepage("https://acme.example");
    repo.upsert_provider(&provider).await.unwrap();

    // Second sighting without a homepage keeps the stored one.
    let bare = ProviderRecord::new("acme", "Acme AI Labs");
    repo.upsert_provider(&bare).await.unwrap();

    let stored = repo.provider_by_slug("acme").await.unwrap().unwrap();
    assert_eq!(stored.display_name, "Acme AI Labs");
    assert_eq!(stored.homepage_url.as_deref(), Some("https://acme.example"));

    let mut model = ModelRecord::new("acme/fast", "Fast");
    model.context_length = Some(8192);
    model.supported_parameters = vec!["tools".to_string()];
    repo.upsert_model(&model).await.unwrap();

    model.context_length = Some(16384);
    repo.upsert_model(&model).await.unwrap();

    let stored = repo.model_by_slug("acme/fast").await.unwrap().unwrap();
    assert_eq!(stored.context_length, Some(16384));
    assert_eq!(stored.supported_parameters, vec!["tools".to_string()]);
    assert_eq!(repo.model_slugs().await.unwrap().len(), 1);

    let link = ModelProviderLink::new("acme/fast", "acme").top_provider();
    repo.upsert_link(&link).await.unwrap();
    repo.upsert_link(&link).await.unwrap();

    let links = repo.linked_providers("acme/fast").await.unwrap();
    assert_eq!(links.len(), 1);
    assert!(links[0].is_top_provider);
}

#[tokio::test]
async fn backend_upsert_preserves_default_and_sort_order() {
    let store = backend_store().await;
    let repo = SqliteBackendRepository::new(store.pool().clone());

    let mut row = BackendModelRow::new("x/y", "Y");
    row.provider = "x".to_string();
    row.cost_per_million_input = Some(dec!(3));
    row.cost_per_million_output = Some(dec!(15));
    repo.upsert(&row).await.unwrap();

    repo.set_default("x/y").await.unwrap();
    sqlx::query("UPDATE backend_models SET sort_order = 7 WHERE model_slug = 'x/y'")
        .execute(store.pool())
        .await
        .unwrap();

    // Re-staging the same model must not clobber operator-managed fields.
    let mut restaged = BackendModelRow::new("x/y", "Y v2");
    restaged.provider = "x".to_string();
    restaged.cost_per_million_input = Some(dec!(4));
    repo.upsert(&restaged).await.unwrap();

    let stored = repo.get("x/y").await.unwrap().unwrap();
    assert_eq!(stored.display_name, "Y v2");
    assert_eq!(stored.cost_per_million_input, Some(dec!(4)));
    assert!(stored.is_default);
    assert_eq!(stored.sort_order, 7);
}

#[tokio::test]
async fn backend_activate_and_deactivate() {
    let store = backend_store().await;
    let repo = SqliteBackendRepository::new(store.pool().clone());

    let row = BackendModelRow::new("x/y", "Y");
    repo.upsert(&row).await.unwrap();

    assert!(repo.deactivate("x/y").await.unwrap());
    assert!(!repo.get("x/y").await.unwrap().unwrap().is_active);

    assert!(repo.activate("x/y").await.unwrap());
    assert!(repo.get("x/y").await.unwrap().unwrap().is_active);

    // Unknown slugs report no row touched.
    assert!(!repo.activate("ghost/model").await.unwrap());
    assert!(!repo.deactivate("ghost/model").await.unwrap());
}
