//! Pricing pipeline orchestrator.
//!
//! Per tick: refresh the catalogue, then resolve pricing for every model
//! from the filtered catalogue with bounded parallelism, applying the
//! source-precedence rule (aggregator → provider adapters → generic web
//! fallback), and finish with BYOK spot-checks.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::adapters::{AdapterRegistry, PricingResult};
use crate::aggregator::{AggregatorClient, RemoteModel};
use crate::config::{ModelFilterConfig, PipelineConfig};
use crate::discovery::Discovery;
use crate::engine::{normalize, PriceValidator};
use crate::domain::{ByokVerification, PricingSnapshot, Result, SourceType};
use crate::storage::{ByokRepository, CatalogRepository, SnapshotRepository};

/// Outcome of one pipeline tick.
#[derive(Debug, Default, Clone)]
pub struct TickSummary {
    pub models_processed: usize,
    pub models_failed: usize,
    pub snapshots_written: usize,
    pub new_models: usize,
    pub byok_checks: usize,
}

#[derive(Clone)]
pub struct PricingPipeline {
    aggregator: Arc<AggregatorClient>,
    registry: Arc<AdapterRegistry>,
    catalog: Arc<dyn CatalogRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    byok: Arc<dyn ByokRepository>,
    validator: PriceValidator,
    filters: ModelFilterConfig,
    config: PipelineConfig,
    provider_scraping_enabled: bool,
}

impl PricingPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        aggregator: Arc<AggregatorClient>,
        registry: Arc<AdapterRegistry>,
        catalog: Arc<dyn CatalogRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        byok: Arc<dyn ByokRepository>,
        filters: ModelFilterConfig,
        config: PipelineConfig,
        provider_scraping_enabled: bool,
    ) -> Self {
        let validator = PriceValidator::new(
            config.max_usd_per_million,
            config.price_change_threshold_percent,
        );

        Self {
            aggregator,
            registry,
            catalog,
            snapshots,
            byok,
            validator,
            filters,
            config,
            provider_scraping_enabled,
        }
    }

    /// Run one full tick: discovery, per-model resolution, BYOK checks.
    pub async fn run_tick(&self) -> Result<TickSummary> {
        let providers = self.aggregator.list_providers().await?;
        let models = self.aggregator.list_models(&self.filters).await?;

        let discovery = Discovery::new(self.catalog.clone());
        let outcome = discovery.run(&providers, &models).await?;

        let mut summary = TickSummary {
            new_models: outcome.new_model_slugs.len(),
            ..Default::default()
        };

        // Bounded fan-out; each model is handled by exactly one worker.
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_models));
        let mut tasks: JoinSet<(String, Result<usize>)> = JoinSet::new();

        for model in models.iter().cloned() {
            let pipeline = self.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");
                let slug = model.id.clone();
                let written = pipeline.process_model(&model).await;
                (slug, written)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(written))) => {
                    summary.models_processed += 1;
                    summary.snapshots_written += written;
                }
                Ok((slug, Err(e))) => {
                    // Per-model failures never abort the tick.
                    warn!(model = %slug, error = %e, "model processing failed");
                    summary.models_processed += 1;
                    summary.models_failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "model worker panicked");
                    summary.models_failed += 1;
                }
            }
        }

        summary.byok_checks = self.run_byok_spot_checks(&models).await;

        info!(
            models = summary.models_processed,
            failed = summary.models_failed,
            snapshots = summary.snapshots_written,
            byok_checks = summary.byok_checks,
            "pipeline tick complete"
        );

        Ok(summary)
    }

    /// Resolve pricing for one model across sources, in precedence order.
    /// Returns the number of snapshots written.
    async fn process_model(&self, model: &RemoteModel) -> Result<usize> {
        let mut written = 0;

        // 1. Aggregator pricing; always attempted.
        written += self.ingest_aggregator_pricing(model).await?;

        // 2. Provider-specific adapters, only when scraping is enabled.
        if self.provider_scraping_enabled {
            written += self.ingest_provider_pricing(model).await?;
        }

        // 3. Generic web fallback, only when nothing was written yet.
        if written == 0 {
            written += self.ingest_web_fallback(model).await?;
        }

        Ok(written)
    }

    async fn ingest_aggregator_pricing(&self, model: &RemoteModel) -> Result<usize> {
        let Some(pricing) = &model.pricing else {
            debug!(model = %model.id, source = %SourceType::AggregatorApi, "no pricing block");
            return Ok(0);
        };

        let prompt = normalize::to_per_million(&pricing.prompt);
        let completion = normalize::to_per_million(&pricing.completion);

        if prompt.is_none() && completion.is_none() {
            info!(
                model = %model.id,
                source = %SourceType::AggregatorApi,
                "skipping_invalid_pricing"
            );
            return Ok(0);
        }

        let mut snapshot = PricingSnapshot::new(
            &model.id,
            None,
            Utc::now().date_naive(),
            SourceType::AggregatorApi,
        );
        snapshot.prompt_usd_per_million = prompt;
        snapshot.completion_usd_per_million = completion;
        snapshot.request_usd = normalize::parse_absolute(&pricing.request);
        snapshot.image_usd = normalize::parse_absolute(&pricing.image);
        snapshot.web_search_usd = normalize::parse_absolute(&pricing.web_search);
        snapshot.internal_reasoning_usd_per_million =
            normalize::to_per_million(&pricing.internal_reasoning);
        snapshot.input_cache_read_usd_per_million =
            normalize::to_per_million(&pricing.input_cache_read);
        snapshot.input_cache_write_usd_per_million =
            normalize::to_per_million(&pricing.input_cache_write);

        self.write_validated(snapshot).await
    }

    async fn ingest_provider_pricing(&self, model: &RemoteModel) -> Result<usize> {
        let links = self.catalog.linked_providers(&model.id).await?;
        let mut written = 0;

        for link in links {
            let adapter = self.registry.get(&link.provider_slug);

            let resolved = match adapter.resolve(&scrape_name(model), &model.id).await {
                Ok(r) => r,
                Err(e) => {
                    // Adapter trouble only affects this source.
                    warn!(
                        model = %model.id,
                        provider = %link.provider_slug,
                        error = %e,
                        "provider adapter failed"
                    );
                    continue;
                }
            };

            let Some(result) = resolved else { continue };

            let mut snapshot = PricingSnapshot::new(
                &model.id,
                Some(link.provider_slug.clone()),
                Utc::now().date_naive(),
                SourceType::ProviderSite,
            );
            apply_result(&mut snapshot, result);

            written += self.write_validated(snapshot).await?;
        }

        Ok(written)
    }

    async fn ingest_web_fallback(&self, model: &RemoteModel) -> Result<usize> {
        let adapter = self.registry.generic();

        let resolved = match adapter.resolve(&scrape_name(model), &model.id).await {
            Ok(r) => r,
            Err(e) => {
                warn!(model = %model.id, error = %e, "web fallback failed");
                return Ok(0);
            }
        };

        let Some(result) = resolved else {
            return Ok(0);
        };

        let mut snapshot = PricingSnapshot::new(
            &model.id,
            None,
            Utc::now().date_naive(),
            SourceType::WebFallback,
        );
        apply_result(&mut snapshot, result);

        self.write_validated(snapshot).await
    }

    /// Validate, detect changes against the prior same-source snapshot,
    /// then perform the same-day idempotent write.
    async fn write_validated(&self, snapshot: PricingSnapshot) -> Result<usize> {
        if snapshot.has_no_token_pricing() {
            info!(
                model = %snapshot.model_slug,
                source = %snapshot.source_type,
                "skipping_invalid_pricing"
            );
            return Ok(0);
        }

        let outcome = self.validator.validate(
            snapshot.prompt_usd_per_million,
            snapshot.completion_usd_per_million,
            &snapshot.model_slug,
            snapshot.has_image_pricing(),
        );

        if !outcome.ok {
            warn!(
                model = %snapshot.model_slug,
                source = %snapshot.source_type,
                reasons = ?outcome.warnings,
                "skipping_invalid_pricing"
            );
            return Ok(0);
        }

        for warning in &outcome.warnings {
            warn!(
                model = %snapshot.model_slug,
                source = %snapshot.source_type,
                warning = %warning,
                "pricing_validation_warning"
            );
        }

        let prev = self
            .snapshots
            .latest(
                &snapshot.model_slug,
                snapshot.provider_slug.as_deref(),
                snapshot.source_type,
            )
            .await?;

        if let Some(prev) = prev {
            for change in self.validator.detect_change(&prev, &snapshot) {
                info!(
                    model = %snapshot.model_slug,
                    provider = snapshot.provider_slug.as_deref().unwrap_or(""),
                    source = %snapshot.source_type,
                    field = change.field,
                    old = %change.old_usd_per_million,
                    new = %change.new_usd_per_million,
                    change_percent = %change.change_percent,
                    "significant_price_change_detected"
                );
            }
        }

        self.snapshots.replace(&snapshot).await?;
        Ok(1)
    }

    /// Spot-check a small random sample of paid models with a tiny real
    /// request. Terminal failures are recorded, never retried in-tick.
    async fn run_byok_spot_checks(&self, models: &[RemoteModel]) -> usize {
        if self.config.byok_sample_size == 0 {
            return 0;
        }

        let eligible: Vec<&RemoteModel> = models
            .iter()
            .filter(|m| {
                if byok_eligible(m) {
                    true
                } else {
                    debug!(model = %m.id, "skipping_byok_for_free_or_unavailable_model");
                    false
                }
            })
            .collect();

        let sampled: Vec<String> = {
            use rand::seq::SliceRandom;
            let mut rng = rand::thread_rng();
            eligible
                .choose_multiple(&mut rng, self.config.byok_sample_size)
                .map(|m| m.id.clone())
                .collect()
        };

        let mut checks = 0;

        for slug in sampled {
            let verification = match self.aggregator.tiny_byok_call(&slug).await {
                Ok(report) => {
                    let mut v = ByokVerification::success(&slug);
                    v.aggregator_cost_usd = report.aggregator_cost_usd;
                    v.upstream_cost_usd = report.upstream_cost_usd;
                    v.prompt_tokens = report.prompt_tokens;
                    v.completion_tokens = report.completion_tokens;
                    v.response_ms = Some(report.response_ms);
                    v.raw_usage = report.raw_usage;
                    v
                }
                Err(e) => {
                    debug!(model = %slug, error = %e, "byok spot-check failed");
                    ByokVerification::failure(&slug, e.to_string())
                }
            };

            if let Err(e) = self.byok.record(&verification).await {
                warn!(model = %slug, error = %e, "failed to record byok verification");
            } else {
                checks += 1;
            }
        }

        checks
    }
}

/// The name used to find the model on a pricing page: the display name when
/// present, else the bare name part of the slug.
fn scrape_name(model: &RemoteModel) -> String {
    if !model.name.is_empty() {
        return model.name.clone();
    }
    model
        .id
        .split_once('/')
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| model.id.clone())
}

fn apply_result(snapshot: &mut PricingSnapshot, result: PricingResult) {
    snapshot.prompt_usd_per_million = result.prompt_usd_per_million;
    snapshot.completion_usd_per_million = result.completion_usd_per_million;
    snapshot.request_usd = result.request_usd;
    snapshot.source_url = result.source_url;
    snapshot.notes = result.note;
}

/// Eligible for a BYOK spot-check: priced, not free, not sentinel.
fn byok_eligible(model: &RemoteModel) -> bool {
    let Some(pricing) = &model.pricing else {
        return false;
    };

    let prompt = normalize::to_per_million(&pricing.prompt);
    let completion = normalize::to_per_million(&pricing.completion);

    let positive = |v: Option<Decimal>| v.map(|d| d > Decimal::ZERO).unwrap_or(false);
    positive(prompt) || positive(completion)
}
