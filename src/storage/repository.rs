//! Repositories over the two stores.
//!
//! The snapshot repository owns the same-day idempotence contract: a write
//! is a delete of the full `(model, provider|NULL, snapshot_date,
//! source_type)` key followed by an insert, in one transaction. `NULL`
//! provider equality is expressed with `IS NULL`, never `=`.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use super::models::{
    BackendModelDbRow, ModelProviderRow, ModelRow, PricingSnapshotRow, ProviderRow,
};
use crate::domain::{
    BackendModelRow, ByokVerification, ModelProviderLink, ModelRecord, ModelType, PricingSnapshot,
    PricingTier, ProviderRecord, Result, SourceType,
};

fn decimal_opt(raw: &Option<String>) -> Option<Decimal> {
    raw.as_deref().and_then(|s| Decimal::from_str(s).ok())
}

fn text_opt(value: &Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

#[async_trait::async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn upsert_provider(&self, provider: &ProviderRecord) -> Result<()>;
    async fn upsert_model(&self, model: &ModelRecord) -> Result<()>;
    async fn upsert_link(&self, link: &ModelProviderLink) -> Result<()>;
    async fn provider_slugs(&self) -> Result<HashSet<String>>;
    async fn model_slugs(&self) -> Result<HashSet<String>>;
    async fn provider_by_slug(&self, slug: &str) -> Result<Option<ProviderRecord>>;
    async fn model_by_slug(&self, slug: &str) -> Result<Option<ModelRecord>>;
    async fn linked_providers(&self, model_slug: &str) -> Result<Vec<ModelProviderLink>>;
}

#[async_trait::async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Same-day idempotent upsert: delete the row matching the full key,
    /// then insert the new one.
    async fn replace(&self, snapshot: &PricingSnapshot) -> Result<()>;

    /// Most recent snapshot for the key prefix, same source type only.
    async fn latest(
        &self,
        model_slug: &str,
        provider_slug: Option<&str>,
        source_type: SourceType,
    ) -> Result<Option<PricingSnapshot>>;

    /// All snapshots of one source type on or after `since`, oldest first.
    async fn list_since(
        &self,
        source_type: SourceType,
        since: NaiveDate,
    ) -> Result<Vec<PricingSnapshot>>;

    /// Distinct model slugs with a snapshot of one source type on or after
    /// `since`.
    async fn model_slugs_since(
        &self,
        source_type: SourceType,
        since: NaiveDate,
    ) -> Result<HashSet<String>>;
}

#[async_trait::async_trait]
pub trait ByokRepository: Send + Sync {
    async fn record(&self, verification: &ByokVerification) -> Result<()>;
}

#[async_trait::async_trait]
pub trait BackendRepository: Send + Sync {
    async fn all_slugs(&self) -> Result<HashSet<String>>;
    async fn get(&self, model_slug: &str) -> Result<Option<BackendModelRow>>;
    /// Upsert by slug; `is_default` and `sort_order` of an existing row are
    /// preserved.
    async fn upsert(&self, row: &BackendModelRow) -> Result<()>;
    async fn deactivate(&self, model_slug: &str) -> Result<bool>;
    async fn activate(&self, model_slug: &str) -> Result<bool>;
    async fn set_default(&self, model_slug: &str) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// SQLite implementations, primary store
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SqliteCatalogRepository {
    pool: Pool<Sqlite>,
}

impl SqliteCatalogRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn row_to_provider(row: ProviderRow) -> ProviderRecord {
        ProviderRecord {
            slug: row.slug,
            display_name: row.display_name,
            homepage_url: row.homepage_url,
            pricing_url: row.pricing_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn row_to_model(row: ModelRow) -> ModelRecord {
        ModelRecord {
            slug: row.slug,
            canonical_slug: row.canonical_slug,
            display_name: row.display_name,
            context_length: row.context_length,
            architecture: serde_json::from_str(&row.architecture).unwrap_or_default(),
            supported_parameters: serde_json::from_str(&row.supported_parameters)
                .unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait::async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn upsert_provider(&self, provider: &ProviderRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO providers (slug, display_name, homepage_url, pricing_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                display_name = excluded.display_name,
                homepage_url = COALESCE(excluded.homepage_url, providers.homepage_url),
                pricing_url = COALESCE(excluded.pricing_url, providers.pricing_url),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&provider.slug)
        .bind(&provider.display_name)
        .bind(&provider.homepage_url)
        .bind(&provider.pricing_url)
        .bind(provider.created_at)
        .bind(provider.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_model(&self, model: &ModelRecord) -> Result<()> {
        let architecture = serde_json::to_string(&model.architecture)?;
        let supported_parameters = serde_json::to_string(&model.supported_parameters)?;

        sqlx::query(
            r#"
            INSERT INTO models (
                slug, canonical_slug, display_name, context_length,
                architecture, supported_parameters, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                canonical_slug = COALESCE(excluded.canonical_slug, models.canonical_slug),
                display_name = excluded.display_name,
                context_length = excluded.context_length,
                architecture = excluded.architecture,
                supported_parameters = excluded.supported_parameters,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&model.slug)
        .bind(&model.canonical_slug)
        .bind(&model.display_name)
        .bind(model.context_length)
        .bind(architecture)
        .bind(supported_parameters)
        .bind(model.created_at)
        .bind(model.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_link(&self, link: &ModelProviderLink) -> Result<()> {
        let metadata = serde_json::to_string(&link.provider_metadata)?;

        sqlx::query(
            r#"
            INSERT INTO model_providers (model_slug, provider_slug, is_top_provider, provider_metadata, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(model_slug, provider_slug) DO UPDATE SET
                is_top_provider = excluded.is_top_provider,
                provider_metadata = excluded.provider_metadata
            "#,
        )
        .bind(&link.model_slug)
        .bind(&link.provider_slug)
        .bind(link.is_top_provider)
        .bind(metadata)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn provider_slugs(&self) -> Result<HashSet<String>> {
        let slugs: Vec<String> = sqlx::query_scalar("SELECT slug FROM providers")
            .fetch_all(&self.pool)
            .await?;
        Ok(slugs.into_iter().collect())
    }

    async fn model_slugs(&self) -> Result<HashSet<String>> {
        let slugs: Vec<String> = sqlx::query_scalar("SELECT slug FROM models")
            .fetch_all(&self.pool)
            .await?;
        Ok(slugs.into_iter().collect())
    }

    async fn provider_by_slug(&self, slug: &str) -> Result<Option<ProviderRecord>> {
        let row = sqlx::query_as::<_, ProviderRow>(
            "SELECT slug, display_name, homepage_url, pricing_url, created_at, updated_at \
             FROM providers WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::row_to_provider))
    }

    async fn model_by_slug(&self, slug: &str) -> Result<Option<ModelRecord>> {
        let row = sqlx::query_as::<_, ModelRow>(
            "SELECT slug, canonical_slug, display_name, context_length, architecture, \
             supported_parameters, created_at, updated_at FROM models WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::row_to_model))
    }

    async fn linked_providers(&self, model_slug: &str) -> Result<Vec<ModelProviderLink>> {
        let rows = sqlx::query_as::<_, ModelProviderRow>(
            "SELECT model_slug, provider_slug, is_top_provider, provider_metadata \
             FROM model_providers WHERE model_slug = ? ORDER BY is_top_provider DESC, provider_slug",
        )
        .bind(model_slug)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ModelProviderLink {
                model_slug: r.model_slug,
                provider_slug: r.provider_slug,
                is_top_provider: r.is_top_provider,
                provider_metadata: serde_json::from_str(&r.provider_metadata).unwrap_or_default(),
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct SqliteSnapshotRepository {
    pool: Pool<Sqlite>,
}

const SNAPSHOT_COLUMNS: &str = "id, model_slug, provider_slug, snapshot_date, source_type, \
    source_url, prompt_usd_per_million, completion_usd_per_million, request_usd, image_usd, \
    web_search_usd, internal_reasoning_usd_per_million, input_cache_read_usd_per_million, \
    input_cache_write_usd_per_million, currency, collected_at, notes";

impl SqliteSnapshotRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn row_to_snapshot(row: PricingSnapshotRow) -> Result<PricingSnapshot> {
        Ok(PricingSnapshot {
            id: Uuid::parse_str(&row.id).unwrap_or_else(|_| Uuid::new_v4()),
            model_slug: row.model_slug,
            provider_slug: row.provider_slug,
            snapshot_date: row.snapshot_date,
            source_type: SourceType::parse(&row.source_type)?,
            source_url: row.source_url,
            prompt_usd_per_million: decimal_opt(&row.prompt_usd_per_million),
            completion_usd_per_million: decimal_opt(&row.completion_usd_per_million),
            request_usd: decimal_opt(&row.request_usd),
            image_usd: decimal_opt(&row.image_usd),
            web_search_usd: decimal_opt(&row.web_search_usd),
            internal_reasoning_usd_per_million: decimal_opt(
                &row.internal_reasoning_usd_per_million,
            ),
            input_cache_read_usd_per_million: decimal_opt(&row.input_cache_read_usd_per_million),
            input_cache_write_usd_per_million: decimal_opt(&row.input_cache_write_usd_per_million),
            currency: row.currency,
            collected_at: row.collected_at,
            notes: row.notes,
        })
    }
}

#[async_trait::async_trait]
impl SnapshotRepository for SqliteSnapshotRepository {
    async fn replace(&self, snapshot: &PricingSnapshot) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        match &snapshot.provider_slug {
            Some(provider) => {
                sqlx::query(
                    "DELETE FROM pricing_snapshots \
                     WHERE model_slug = ? AND provider_slug = ? AND snapshot_date = ? AND source_type = ?",
                )
                .bind(&snapshot.model_slug)
                .bind(provider)
                .bind(snapshot.snapshot_date)
                .bind(snapshot.source_type.as_str())
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    "DELETE FROM pricing_snapshots \
                     WHERE model_slug = ? AND provider_slug IS NULL AND snapshot_date = ? AND source_type = ?",
                )
                .bind(&snapshot.model_slug)
                .bind(snapshot.snapshot_date)
                .bind(snapshot.source_type.as_str())
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO pricing_snapshots (
                id, model_slug, provider_slug, snapshot_date, source_type, source_url,
                prompt_usd_per_million, completion_usd_per_million, request_usd, image_usd,
                web_search_usd, internal_reasoning_usd_per_million,
                input_cache_read_usd_per_million, input_cache_write_usd_per_million,
                currency, collected_at, notes
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.id.to_string())
        .bind(&snapshot.model_slug)
        .bind(&snapshot.provider_slug)
        .bind(snapshot.snapshot_date)
        .bind(snapshot.source_type.as_str())
        .bind(&snapshot.source_url)
        .bind(text_opt(&snapshot.prompt_usd_per_million))
        .bind(text_opt(&snapshot.completion_usd_per_million))
        .bind(text_opt(&snapshot.request_usd))
        .bind(text_opt(&snapshot.image_usd))
        .bind(text_opt(&snapshot.web_search_usd))
        .bind(text_opt(&snapshot.internal_reasoning_usd_per_million))
        .bind(text_opt(&snapshot.input_cache_read_usd_per_million))
        .bind(text_opt(&snapshot.input_cache_write_usd_per_million))
        .bind(&snapshot.currency)
        .bind(snapshot.collected_at)
        .bind(&snapshot.notes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn latest(
        &self,
        model_slug: &str,
        provider_slug: Option<&str>,
        source_type: SourceType,
    ) -> Result<Option<PricingSnapshot>> {
        let row = match provider_slug {
            Some(provider) => {
                sqlx::query_as::<_, PricingSnapshotRow>(&format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM pricing_snapshots \
                     WHERE model_slug = ? AND provider_slug = ? AND source_type = ? \
                     ORDER BY snapshot_date DESC, collected_at DESC LIMIT 1"
                ))
                .bind(model_slug)
                .bind(provider)
                .bind(source_type.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, PricingSnapshotRow>(&format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM pricing_snapshots \
                     WHERE model_slug = ? AND provider_slug IS NULL AND source_type = ? \
                     ORDER BY snapshot_date DESC, collected_at DESC LIMIT 1"
                ))
                .bind(model_slug)
                .bind(source_type.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.map(Self::row_to_snapshot).transpose()
    }

    async fn list_since(
        &self,
        source_type: SourceType,
        since: NaiveDate,
    ) -> Result<Vec<PricingSnapshot>> {
        let rows = sqlx::query_as::<_, PricingSnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM pricing_snapshots \
             WHERE source_type = ? AND snapshot_date >= ? \
             ORDER BY snapshot_date ASC, collected_at ASC"
        ))
        .bind(source_type.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_snapshot).collect()
    }

    async fn model_slugs_since(
        &self,
        source_type: SourceType,
        since: NaiveDate,
    ) -> Result<HashSet<String>> {
        let slugs: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT model_slug FROM pricing_snapshots \
             WHERE source_type = ? AND snapshot_date >= ?",
        )
        .bind(source_type.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(slugs.into_iter().collect())
    }
}

#[derive(Clone)]
pub struct SqliteByokRepository {
    pool: Pool<Sqlite>,
}

impl SqliteByokRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ByokRepository for SqliteByokRepository {
    async fn record(&self, verification: &ByokVerification) -> Result<()> {
        let raw_usage = serde_json::to_string(&verification.raw_usage)?;

        sqlx::query(
            r#"
            INSERT INTO byok_verifications (
                id, model_slug, ok, aggregator_cost_usd, upstream_cost_usd,
                prompt_tokens, completion_tokens, response_ms, raw_usage, error, verified_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(verification.id.to_string())
        .bind(&verification.model_slug)
        .bind(verification.ok)
        .bind(text_opt(&verification.aggregator_cost_usd))
        .bind(text_opt(&verification.upstream_cost_usd))
        .bind(verification.prompt_tokens)
        .bind(verification.completion_tokens)
        .bind(verification.response_ms)
        .bind(raw_usage)
        .bind(&verification.error)
        .bind(verification.verified_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SQLite implementation, backend projection store
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SqliteBackendRepository {
    pool: Pool<Sqlite>,
}

const BACKEND_COLUMNS: &str = "model_slug, display_name, provider, model_type, tier, \
    context_window, max_output_tokens, cost_per_million_input, cost_per_million_output, \
    is_active, is_default, sort_order, capabilities, metadata, is_thinking_model, \
    created_at, updated_at";

impl SqliteBackendRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn row_to_backend(row: BackendModelDbRow) -> BackendModelRow {
        BackendModelRow {
            model_slug: row.model_slug,
            display_name: row.display_name,
            provider: row.provider,
            model_type: ModelType::parse(&row.model_type),
            tier: PricingTier::parse(&row.tier),
            context_window: row.context_window,
            max_output_tokens: row.max_output_tokens,
            cost_per_million_input: decimal_opt(&row.cost_per_million_input),
            cost_per_million_output: decimal_opt(&row.cost_per_million_output),
            is_active: row.is_active,
            is_default: row.is_default,
            sort_order: row.sort_order,
            capabilities: serde_json::from_str(&row.capabilities).unwrap_or_default(),
            metadata: serde_json::from_str(&row.metadata).unwrap_or_default(),
            is_thinking_model: row.is_thinking_model,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait::async_trait]
impl BackendRepository for SqliteBackendRepository {
    async fn all_slugs(&self) -> Result<HashSet<String>> {
        let slugs: Vec<String> = sqlx::query_scalar("SELECT model_slug FROM backend_models")
            .fetch_all(&self.pool)
            .await?;
        Ok(slugs.into_iter().collect())
    }

    async fn get(&self, model_slug: &str) -> Result<Option<BackendModelRow>> {
        let row = sqlx::query_as::<_, BackendModelDbRow>(&format!(
            "SELECT {BACKEND_COLUMNS} FROM backend_models WHERE model_slug = ?"
        ))
        .bind(model_slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::row_to_backend))
    }

    async fn upsert(&self, row: &BackendModelRow) -> Result<()> {
        let capabilities = serde_json::to_string(&row.capabilities)?;
        let metadata = serde_json::to_string(&row.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO backend_models (
                model_slug, display_name, provider, model_type, tier, context_window,
                max_output_tokens, cost_per_million_input, cost_per_million_output,
                is_active, is_default, sort_order, capabilities, metadata,
                is_thinking_model, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(model_slug) DO UPDATE SET
                display_name = excluded.display_name,
                provider = excluded.provider,
                model_type = excluded.model_type,
                tier = excluded.tier,
                context_window = excluded.context_window,
                max_output_tokens = excluded.max_output_tokens,
                cost_per_million_input = excluded.cost_per_million_input,
                cost_per_million_output = excluded.cost_per_million_output,
                is_active = excluded.is_active,
                capabilities = excluded.capabilities,
                metadata = excluded.metadata,
                is_thinking_model = excluded.is_thinking_model,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.model_slug)
        .bind(&row.display_name)
        .bind(&row.provider)
        .bind(row.model_type.as_str())
        .bind(row.tier.as_str())
        .bind(row.context_window)
        .bind(row.max_output_tokens)
        .bind(text_opt(&row.cost_per_million_input))
        .bind(text_opt(&row.cost_per_million_output))
        .bind(row.is_active)
        .bind(row.is_default)
        .bind(row.sort_order)
        .bind(capabilities)
        .bind(metadata)
        .bind(row.is_thinking_model)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn deactivate(&self, model_slug: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE backend_models SET is_active = 0, updated_at = ? WHERE model_slug = ?",
        )
        .bind(chrono::Utc::now())
        .bind(model_slug)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn activate(&self, model_slug: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE backend_models SET is_active = 1, updated_at = ? WHERE model_slug = ?",
        )
        .bind(chrono::Utc::now())
        .bind(model_slug)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_default(&self, model_slug: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE backend_models SET is_default = 1, updated_at = ? WHERE model_slug = ?",
        )
        .bind(chrono::Utc::now())
        .bind(model_slug)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
