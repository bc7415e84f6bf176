//! Backend projection sync: maintain the denormalised "active models"
//! table in the backend store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::config::ProjectionConfig;
use crate::domain::{
    BackendModelRow, ModelType, PricingSnapshot, PricingTier, Result, SourceType,
};
use crate::storage::{BackendRepository, CatalogRepository, SnapshotRepository};

/// Capability tag marking embedding models on this feed.
const EMBEDDING_TAG: &str = "dimensions";

/// Capability tags marking reasoning ("thinking") models.
const THINKING_TAGS: &[&str] = &["reasoning", "include_reasoning"];

#[derive(Debug, Default, Clone)]
pub struct SyncSummary {
    pub staged: usize,
    pub upserted: usize,
    pub deactivated: usize,
    pub protected_inserted: usize,
}

pub struct BackendSync {
    catalog: Arc<dyn CatalogRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    backend: Arc<dyn BackendRepository>,
    config: ProjectionConfig,
}

impl BackendSync {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        backend: Arc<dyn BackendRepository>,
        config: ProjectionConfig,
    ) -> Self {
        Self {
            catalog,
            snapshots,
            backend,
            config,
        }
    }

    /// Models priced recently but absent from the backend table.
    pub async fn missing_in_backend(&self) -> Result<HashSet<String>> {
        let since = Utc::now().date_naive() - Duration::days(self.config.freshness_window_days);
        let recent = self
            .snapshots
            .model_slugs_since(SourceType::AggregatorApi, since)
            .await?;
        let backend = self.backend.all_slugs().await?;

        Ok(recent.difference(&backend).cloned().collect())
    }

    /// Stage → upsert → deactivate missing → protect.
    pub async fn run(&self) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        // Staging reads every model priced inside the freshness window, so
        // models missing from the backend are staged by construction.
        let since = Utc::now().date_naive() - Duration::days(self.config.freshness_window_days);
        let recent = self
            .snapshots
            .list_since(SourceType::AggregatorApi, since)
            .await?;

        // Ascending order; the fold keeps the most recent row per model.
        let mut latest: HashMap<String, PricingSnapshot> = HashMap::new();
        for snapshot in recent {
            latest.insert(snapshot.model_slug.clone(), snapshot);
        }

        let mut staged_slugs: HashSet<String> = HashSet::new();

        for (slug, snapshot) in &latest {
            let row = self.stage_row(slug, snapshot).await?;
            staged_slugs.insert(slug.clone());
            summary.staged += 1;

            self.backend.upsert(&row).await?;
            summary.upserted += 1;
        }

        // Deactivate whatever the feed no longer covers, protected set
        // excluded.
        let protected: HashSet<String> = self.config.protected_models.iter().cloned().collect();
        let backend_slugs = self.backend.all_slugs().await?;

        for slug in backend_slugs.difference(&staged_slugs) {
            if protected.contains(slug) {
                info!(model = %slug, "skipping_deactivation_for_protected_models");
                continue;
            }
            if self.backend.deactivate(slug).await? {
                summary.deactivated += 1;
            }
        }

        // Every protected slug must exist and be active.
        for slug in &self.config.protected_models {
            if self.backend.activate(slug).await? {
                continue;
            }

            let Some(spec) = self.config.protection_map.get(slug) else {
                warn!(model = %slug, "protected model missing and not in protection map");
                continue;
            };

            let mut row = BackendModelRow::new(slug, &spec.display_name);
            row.provider = spec.provider.clone();
            row.model_type = ModelType::parse(&spec.model_type);
            row.cost_per_million_input = Some(spec.cost_per_million_input);
            row.cost_per_million_output = Some(spec.cost_per_million_output);
            row.tier = PricingTier::from_input_cost(row.cost_per_million_input);
            row.metadata = json!({"protected": true});

            self.backend.upsert(&row).await?;
            summary.protected_inserted += 1;
            info!(model = %slug, "inserted protected model from protection map");
        }

        // Configured defaults; preserved thereafter by the upsert.
        for default_slug in [
            self.config.default_chat_model_id.as_deref(),
            self.config.default_embedding_model_id.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            self.backend.set_default(default_slug).await?;
        }

        info!(
            staged = summary.staged,
            deactivated = summary.deactivated,
            protected_inserted = summary.protected_inserted,
            "backend sync complete"
        );

        Ok(summary)
    }

    /// Build one candidate backend row from the latest snapshot joined
    /// with the catalogue.
    async fn stage_row(&self, slug: &str, snapshot: &PricingSnapshot) -> Result<BackendModelRow> {
        let model = self.catalog.model_by_slug(slug).await?;
        let links = self.catalog.linked_providers(slug).await?;

        let display_name = model
            .as_ref()
            .map(|m| m.display_name.clone())
            .unwrap_or_else(|| slug.to_string());

        let mut row = BackendModelRow::new(slug, display_name);

        // Top provider slug if known, else the namespace prefix.
        row.provider = links
            .iter()
            .find(|l| l.is_top_provider)
            .or_else(|| links.first())
            .map(|l| l.provider_slug.clone())
            .or_else(|| slug.split_once('/').map(|(ns, _)| ns.to_string()))
            .unwrap_or_else(|| "unknown".to_string());

        row.cost_per_million_input = snapshot.prompt_usd_per_million;
        row.cost_per_million_output = snapshot.completion_usd_per_million;
        row.tier = PricingTier::from_input_cost(row.cost_per_million_input);

        if let Some(model) = &model {
            row.context_window = model.context_length;
            row.capabilities = model.supported_parameters.clone();
            row.model_type = if model.supports(EMBEDDING_TAG) {
                ModelType::Embedding
            } else {
                ModelType::Chat
            };
            row.is_thinking_model = THINKING_TAGS.iter().any(|tag| model.supports(tag));
        }

        row.max_output_tokens = links
            .iter()
            .find(|l| l.is_top_provider)
            .and_then(|l| l.provider_metadata.get("max_completion_tokens"))
            .and_then(|v| v.as_i64());

        row.metadata = json!({
            "source_type": snapshot.source_type.as_str(),
            "snapshot_date": snapshot.snapshot_date,
        });
        row.is_active = true;

        Ok(row)
    }
}
