// Database row models (SQLx)

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct ProviderRow {
    pub slug: String,
    pub display_name: String,
    pub homepage_url: Option<String>,
    pub pricing_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ModelRow {
    pub slug: String,
    pub canonical_slug: Option<String>,
    pub display_name: String,
    pub context_length: Option<i64>,
    pub architecture: String,
    pub supported_parameters: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ModelProviderRow {
    pub model_slug: String,
    pub provider_slug: String,
    pub is_top_provider: bool,
    pub provider_metadata: String,
}

/// Monetary columns are exact-decimal TEXT; conversion to `Decimal`
/// happens at the repository boundary.
#[derive(Debug, Clone, FromRow)]
pub struct PricingSnapshotRow {
    pub id: String,
    pub model_slug: String,
    pub provider_slug: Option<String>,
    pub snapshot_date: NaiveDate,
    pub source_type: String,
    pub source_url: Option<String>,
    pub prompt_usd_per_million: Option<String>,
    pub completion_usd_per_million: Option<String>,
    pub request_usd: Option<String>,
    pub image_usd: Option<String>,
    pub web_search_usd: Option<String>,
    pub internal_reasoning_usd_per_million: Option<String>,
    pub input_cache_read_usd_per_million: Option<String>,
    pub input_cache_write_usd_per_million: Option<String>,
    pub currency: String,
    pub collected_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct BackendModelDbRow {
    pub model_slug: String,
    pub display_name: String,
    pub provider: String,
    pub model_type: String,
    pub tier: String,
    pub context_window: Option<i64>,
    pub max_output_tokens: Option<i64>,
    pub cost_per_million_input: Option<String>,
    pub cost_per_million_output: Option<String>,
    pub is_active: bool,
    pub is_default: bool,
    pub sort_order: i64,
    pub capabilities: String,
    pub metadata: String,
    pub is_thinking_model: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
