//! End-to-end pipeline scenarios: wiremock aggregator, in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use llm_price_watch::adapters::AdapterRegistry;
use llm_price_watch::aggregator::AggregatorClient;
use llm_price_watch::config::{
    AggregatorConfig, ModelFilterConfig, PipelineConfig, ProjectionConfig, ScrapingConfig,
    StoreConfig,
};
use llm_price_watch::domain::{PricingSnapshot, SourceType};
use llm_price_watch::pipeline::PricingPipeline;
use llm_price_watch::projection::BackendSync;
use llm_price_watch::storage::{
    BackendRepository, BackendStore, CatalogRepository, PricingStore, SnapshotRepository,
    SqliteBackendRepository, SqliteByokRepository, SqliteCatalogRepository,
    SqliteSnapshotRepository,
};

struct Harness {
    _server: MockServer,
    pricing: PricingStore,
    catalog: Arc<SqliteCatalogRepository>,
    snapshots: Arc<SqliteSnapshotRepository>,
    backend: Arc<SqliteBackendRepository>,
    pipeline: PricingPipeline,
    sync: BackendSync,
}

async fn harness_with(
    models: serde_json::Value,
    providers: serde_json::Value,
    projection: ProjectionConfig,
) -> Harness {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": models })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/providers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": providers })))
        .mount(&server)
        .await;

    let pricing = PricingStore::connect(&StoreConfig::default()).await.unwrap();
    let backend_store = BackendStore::connect(&StoreConfig::default()).await.unwrap();

    let catalog = Arc::new(SqliteCatalogRepository::new(pricing.pool().clone()));
    let snapshots = Arc::new(SqliteSnapshotRepository::new(pricing.pool().clone()));
    let byok = Arc::new(SqliteByokRepository::new(pricing.pool().clone()));
    let backend = Arc::new(SqliteBackendRepository::new(backend_store.pool().clone()));

    let aggregator_config = AggregatorConfig {
        base_url: server.uri(),
        api_key: "test-key".to_string(),
        ..Default::default()
    };
    let aggregator = Arc::new(AggregatorClient::new(&aggregator_config).unwrap());

    let registry = Arc::new(
        AdapterRegistry::new(&ScrapingConfig::default(), Duration::from_secs(5)).unwrap(),
    );

    let pipeline_config = PipelineConfig {
        byok_sample_size: 0,
        ..Default::default()
    };

    let pipeline = PricingPipeline::new(
        aggregator,
        registry,
        catalog.clone(),
        snapshots.clone(),
        byok,
        ModelFilterConfig::default(),
        pipeline_config,
        false,
    );

    let sync = BackendSync::new(
        catalog.clone(),
        snapshots.clone(),
        backend.clone(),
        projection,
    );

    Harness {
        _server: server,
        pricing,
        catalog,
        snapshots,
        backend,
        pipeline,
        sync,
    }
}

fn unprotected() -> ProjectionConfig {
    ProjectionConfig {
        protected_models: Vec::new(),
        ..Default::default()
    }
}

async fn harness(models: serde_json::Value) -> Harness {
    harness_with(models, json!([]), unprotected()).await
}

async fn snapshot_count(pricing: &PricingStore) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM pricing_snapshots")
        .fetch_one(pricing.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn happy_path_single_model_aggregator_only() {
    let h = harness(json!([{
        "id": "x/y",
        "name": "Y",
        "pricing": {"prompt": "0.000003", "completion": "0.000015"}
    }]))
    .await;

    let summary = h.pipeline.run_tick().await.unwrap();
    assert_eq!(summary.models_processed, 1);
    assert_eq!(summary.snapshots_written, 1);
    assert_eq!(summary.models_failed, 0);

    // Catalogue row exists.
    assert!(h.catalog.model_by_slug("x/y").await.unwrap().is_some());

    // One aggregator snapshot, provider NULL, normalised to USD/1M.
    let snapshot = h
        .snapshots
        .latest("x/y", None, SourceType::AggregatorApi)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.prompt_usd_per_million, Some(dec!(3.0)));
    assert_eq!(snapshot.completion_usd_per_million, Some(dec!(15.0)));
    assert_eq!(snapshot.provider_slug, None);
    assert_eq!(snapshot.currency, "USD");

    // Backend projection carries the same costs and is active.
    h.sync.run().await.unwrap();
    let row = h.backend.get("x/y").await.unwrap().unwrap();
    assert!(row.is_active);
    assert_eq!(row.cost_per_million_input, Some(dec!(3.0)));
    assert_eq!(row.cost_per_million_output, Some(dec!(15.0)));
    assert_eq!(row.provider, "x");
}

#[tokio::test]
async fn sentinel_pricing_writes_no_snapshot() {
    let h = harness(json!([{
        "id": "x/routed",
        "name": "Routed",
        "pricing": {"prompt": "-1", "completion": "-1"}
    }]))
    .await;

    let summary = h.pipeline.run_tick().await.unwrap();
    assert_eq!(summary.snapshots_written, 0);

    // Model upserted, snapshot suppressed.
    assert!(h.catalog.model_by_slug("x/routed").await.unwrap().is_some());
    assert_eq!(snapshot_count(&h.pricing).await, 0);

    // Nothing to stage, so no backend row either.
    h.sync.run().await.unwrap();
    assert!(h.backend.get("x/routed").await.unwrap().is_none());
}

#[tokio::test]
async fn image_model_inversion_is_written() {
    let h = harness(json!([{
        "id": "x/vision",
        "name": "Vision",
        "pricing": {"prompt": "0.0000025", "completion": "0.000002", "image": "0.001"}
    }]))
    .await;

    let summary = h.pipeline.run_tick().await.unwrap();
    assert_eq!(summary.snapshots_written, 1);

    let snapshot = h
        .snapshots
        .latest("x/vision", None, SourceType::AggregatorApi)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.prompt_usd_per_million, Some(dec!(2.5)));
    assert_eq!(snapshot.completion_usd_per_million, Some(dec!(2)));
    assert_eq!(snapshot.image_usd, Some(dec!(0.001)));
}

#[tokio::test]
async fn same_day_rerun_overwrites_in_place() {
    let h = harness(json!([{
        "id": "x/y",
        "name": "Y",
        "pricing": {"prompt": "0.000003", "completion": "0.000015"}
    }]))
    .await;

    h.pipeline.run_tick().await.unwrap();
    let first = h
        .snapshots
        .latest("x/y", None, SourceType::AggregatorApi)
        .await
        .unwrap()
        .unwrap();

    h.pipeline.run_tick().await.unwrap();
    let second = h
        .snapshots
        .latest("x/y", None, SourceType::AggregatorApi)
        .await
        .unwrap()
        .unwrap();

    // Exactly one row for the key; the second run's timestamp won.
    assert_eq!(snapshot_count(&h.pricing).await, 1);
    assert!(second.collected_at >= first.collected_at);
    assert_ne!(second.id, first.id);
}

#[tokio::test]
async fn significant_price_change_still_writes() {
    let h = harness(json!([{
        "id": "x/y",
        "name": "Y",
        "pricing": {"prompt": "0.000015", "completion": "0.000015"}
    }]))
    .await;

    // Day-1 snapshot at $1.25/1M.
    let yesterday = Utc::now().date_naive() - chrono::Duration::days(1);
    let mut prior = PricingSnapshot::new("x/y", None, yesterday, SourceType::AggregatorApi);
    prior.prompt_usd_per_million = Some(dec!(1.25));
    prior.completion_usd_per_million = Some(dec!(15));
    h.snapshots.replace(&prior).await.unwrap();

    // Day-2 tick moves prompt to $15/1M (+1100%); the write must land.
    h.pipeline.run_tick().await.unwrap();

    assert_eq!(snapshot_count(&h.pricing).await, 2);
    let latest = h
        .snapshots
        .latest("x/y", None, SourceType::AggregatorApi)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.prompt_usd_per_million, Some(dec!(15)));
}

#[tokio::test]
async fn namespace_link_created_for_known_provider() {
    let h = harness_with(
        json!([{
            "id": "acme/fast",
            "name": "Fast",
            "pricing": {"prompt": "0.000001", "completion": "0.000002"},
            "top_provider": {"max_completion_tokens": 4096}
        }]),
        json!([{
            "name": "Acme AI",
            "slug": "acme",
            "privacy_policy_url": "https://acme.example/privacy"
        }]),
        unprotected(),
    )
    .await;

    h.pipeline.run_tick().await.unwrap();

    let provider = h.catalog.provider_by_slug("acme").await.unwrap().unwrap();
    assert_eq!(provider.homepage_url.as_deref(), Some("https://acme.example"));
    assert_eq!(
        provider.pricing_url.as_deref(),
        Some("https://acme.example/pricing")
    );

    let links = h.catalog.linked_providers("acme/fast").await.unwrap();
    assert_eq!(links.len(), 1);
    assert!(links[0].is_top_provider);

    // The projection picks the top provider and its output cap.
    h.sync.run().await.unwrap();
    let row = h.backend.get("acme/fast").await.unwrap().unwrap();
    assert_eq!(row.provider, "acme");
    assert_eq!(row.max_output_tokens, Some(4096));
}

#[tokio::test]
async fn vanished_model_is_deactivated_unless_protected() {
    let projection = ProjectionConfig {
        protected_models: vec!["openai/text-embedding-3-large".to_string()],
        ..Default::default()
    };

    let h = harness_with(
        json!([{
            "id": "x/survivor",
            "name": "Survivor",
            "pricing": {"prompt": "0.000001", "completion": "0.000002"}
        }]),
        json!([]),
        projection,
    )
    .await;

    // The backend already knows a model the feed no longer mentions.
    let mut stale = llm_price_watch::domain::BackendModelRow::new("x/gone", "Gone");
    stale.provider = "x".to_string();
    h.backend.upsert(&stale).await.unwrap();

    h.pipeline.run_tick().await.unwrap();
    h.sync.run().await.unwrap();

    let gone = h.backend.get("x/gone").await.unwrap().unwrap();
    assert!(!gone.is_active);

    let survivor = h.backend.get("x/survivor").await.unwrap().unwrap();
    assert!(survivor.is_active);

    // Protected slug exists and is active even though the feed omits it.
    let protected = h
        .backend
        .get("openai/text-embedding-3-large")
        .await
        .unwrap()
        .unwrap();
    assert!(protected.is_active);
    assert_eq!(protected.cost_per_million_input, Some(dec!(0.13)));
    assert_eq!(protected.cost_per_million_output, Some(dec!(0.065)));
}

#[tokio::test]
async fn missing_in_backend_is_detected_and_filled() {
    let h = harness(json!([{
        "id": "x/y",
        "name": "Y",
        "pricing": {"prompt": "0.000003", "completion": "0.000015"}
    }]))
    .await;

    h.pipeline.run_tick().await.unwrap();

    let missing = h.sync.missing_in_backend().await.unwrap();
    assert!(missing.contains("x/y"));

    h.sync.run().await.unwrap();
    assert!(h.sync.missing_in_backend().await.unwrap().is_empty());
}

#[tokio::test]
async fn tick_fails_cleanly_when_aggregator_is_down() {
    let server = MockServer::start().await;
    // Providers endpoint 500s; models never mounted.
    Mock::given(method("GET"))
        .and(path("/api/v1/providers"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let pricing = PricingStore::connect(&StoreConfig::default()).await.unwrap();
    let catalog = Arc::new(SqliteCatalogRepository::new(pricing.pool().clone()));
    let snapshots = Arc::new(SqliteSnapshotRepository::new(pricing.pool().clone()));
    let byok = Arc::new(SqliteByokRepository::new(pricing.pool().clone()));

    let aggregator = Arc::new(
        AggregatorClient::new(&AggregatorConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            ..Default::default()
        })
        .unwrap(),
    );
    let registry = Arc::new(
        AdapterRegistry::new(&ScrapingConfig::default(), Duration::from_secs(5)).unwrap(),
    );

    let pipeline = PricingPipeline::new(
        aggregator,
        registry,
        catalog,
        snapshots,
        byok,
        ModelFilterConfig::default(),
        PipelineConfig {
            byok_sample_size: 0,
            ..Default::default()
        },
        false,
    );

    // The tick surfaces the upstream failure after retries; nothing was
    // written.
    assert!(pipeline.run_tick().await.is_err());
    assert_eq!(snapshot_count(&pricing).await, 0);
}

#[tokio::test]
async fn projection_reflects_newest_snapshot_in_window() {
    let h = harness(json!([])).await;

    let today = Utc::now().date_naive();

    let mut model = llm_price_watch::domain::ModelRecord::new("x/y", "Y");
    model.context_length = Some(32768);
    h.catalog.upsert_model(&model).await.unwrap();

    let mut day_one =
        PricingSnapshot::new("x/y", None, today - chrono::Duration::days(1), SourceType::AggregatorApi);
    day_one.prompt_usd_per_million = Some(dec!(3));
    day_one.completion_usd_per_million = Some(dec!(15));
    h.snapshots.replace(&day_one).await.unwrap();

    let mut day_two = PricingSnapshot::new("x/y", None, today, SourceType::AggregatorApi);
    day_two.prompt_usd_per_million = Some(dec!(4));
    day_two.completion_usd_per_million = Some(dec!(16));
    h.snapshots.replace(&day_two).await.unwrap();

    h.sync.run().await.unwrap();

    let row = h.backend.get("x/y").await.unwrap().unwrap();
    assert_eq!(row.cost_per_million_input, Some(dec!(4)));
    assert_eq!(row.cost_per_million_output, Some(dec!(16)));
    assert_eq!(row.context_window, Some(32768));

    // A snapshot outside the freshness window never reaches the backend.
    let mut ancient = PricingSnapshot::new(
        "x/ancient",
        None,
        today - chrono::Duration::days(30),
        SourceType::AggregatorApi,
    );
    ancient.prompt_usd_per_million = Some(dec!(1));
    h.snapshots.replace(&ancient).await.unwrap();

    h.sync.run().await.unwrap();
    assert!(h.backend.get("x/ancient").await.unwrap().is_none());
}
