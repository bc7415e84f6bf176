//! Pricing snapshots and BYOK verification records.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::error::{PriceWatchError, Result};

/// Origin of a pricing snapshot. Snapshots of different source types are
/// never compared to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    AggregatorApi,
    ProviderSite,
    WebFallback,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::AggregatorApi => "aggregator_api",
            SourceType::ProviderSite => "provider_site",
            SourceType::WebFallback => "web_fallback",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "aggregator_api" => Ok(SourceType::AggregatorApi),
            "provider_site" => Ok(SourceType::ProviderSite),
            "web_fallback" => Ok(SourceType::WebFallback),
            other => Err(PriceWatchError::validation(format!(
                "unknown source type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable daily pricing fact, keyed by
/// `(model, provider|NULL, snapshot_date, source_type)`.
///
/// Re-ingestion on the same key within the same day overwrites the prior
/// row; different days accumulate history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub id: Uuid,
    pub model_slug: String,
    pub provider_slug: Option<String>,
    pub snapshot_date: NaiveDate,
    pub source_type: SourceType,
    pub source_url: Option<String>,
    pub prompt_usd_per_million: Option<Decimal>,
    pub completion_usd_per_million: Option<Decimal>,
    pub request_usd: Option<Decimal>,
    pub image_usd: Option<Decimal>,
    pub web_search_usd: Option<Decimal>,
    pub internal_reasoning_usd_per_million: Option<Decimal>,
    pub input_cache_read_usd_per_million: Option<Decimal>,
    pub input_cache_write_usd_per_million: Option<Decimal>,
    /// Fixed to `USD`; non-USD sources are discarded before this point.
    pub currency: String,
    pub collected_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl PricingSnapshot {
    pub fn new(
        model_slug: impl Into<String>,
        provider_slug: Option<String>,
        snapshot_date: NaiveDate,
        source_type: SourceType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            model_slug: model_slug.into(),
            provider_slug,
            snapshot_date,
            source_type,
            source_url: None,
            prompt_usd_per_million: None,
            completion_usd_per_million: None,
            request_usd: None,
            image_usd: None,
            web_search_usd: None,
            internal_reasoning_usd_per_million: None,
            input_cache_read_usd_per_million: None,
            input_cache_write_usd_per_million: None,
            currency: "USD".to_string(),
            collected_at: Utc::now(),
            notes: None,
        }
    }

    /// True when neither a prompt nor a completion price is present.
    /// Such snapshots are never written.
    pub fn has_no_token_pricing(&self) -> bool {
        self.prompt_usd_per_million.is_none() && self.completion_usd_per_million.is_none()
    }

    pub fn has_image_pricing(&self) -> bool {
        self.image_usd.is_some()
    }

    /// Whether both token prices are present and zero (free tier).
    pub fn is_free(&self) -> bool {
        let zero = |v: &Option<Decimal>| v.map(|d| d.is_zero()).unwrap_or(false);
        zero(&self.prompt_usd_per_million) && zero(&self.completion_usd_per_million)
    }
}

/// Audit row for a tiny real BYOK request used to reconcile aggregator cost
/// with upstream provider cost. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ByokVerification {
    pub id: Uuid,
    pub model_slug: String,
    pub ok: bool,
    pub aggregator_cost_usd: Option<Decimal>,
    pub upstream_cost_usd: Option<Decimal>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub response_ms: Option<i64>,
    #[serde(default)]
    pub raw_usage: JsonValue,
    pub error: Option<String>,
    pub verified_at: DateTime<Utc>,
}

impl ByokVerification {
    pub fn success(model_slug: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model_slug: model_slug.into(),
            ok: true,
            aggregator_cost_usd: None,
            upstream_cost_usd: None,
            prompt_tokens: None,
            completion_tokens: None,
            response_ms: None,
            raw_usage: JsonValue::Null,
            error: None,
            verified_at: Utc::now(),
        }
    }

    pub fn failure(model_slug: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model_slug: model_slug.into(),
            ok: false,
            aggregator_cost_usd: None,
            upstream_cost_usd: None,
            prompt_tokens: None,
            completion_tokens: None,
            response_ms: None,
            raw_usage: JsonValue::Null,
            error: Some(error.into()),
            verified_at: Utc::now(),
        }
    }
}
