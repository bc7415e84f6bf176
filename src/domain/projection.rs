//! Denormalised backend projection row and its derived classifications.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Coarse model classification written to the backend store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Chat,
    Embedding,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Chat => "chat",
            ModelType::Embedding => "embedding",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "embedding" => ModelType::Embedding,
            _ => ModelType::Chat,
        }
    }
}

/// Cost tier derived from the input price per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingTier {
    Premium,
    Standard,
    Budget,
}

impl PricingTier {
    /// `>= $1000/1M` is premium, `>= $200/1M` standard, everything else
    /// (including unknown) budget.
    pub fn from_input_cost(cost_per_million_input: Option<Decimal>) -> Self {
        match cost_per_million_input {
            Some(c) if c >= Decimal::from(1000) => PricingTier::Premium,
            Some(c) if c >= Decimal::from(200) => PricingTier::Standard,
            _ => PricingTier::Budget,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PricingTier::Premium => "premium",
            PricingTier::Standard => "standard",
            PricingTier::Budget => "budget",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "premium" => PricingTier::Premium,
            "standard" => PricingTier::Standard,
            _ => PricingTier::Budget,
        }
    }
}

/// One denormalised "active model" record, keyed by unique `model_slug`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendModelRow {
    pub model_slug: String,
    pub display_name: String,
    /// Textual provider attribution: top provider slug if known, else the
    /// slug's namespace prefix.
    pub provider: String,
    pub model_type: ModelType,
    pub tier: PricingTier,
    pub context_window: Option<i64>,
    pub max_output_tokens: Option<i64>,
    pub cost_per_million_input: Option<Decimal>,
    pub cost_per_million_output: Option<Decimal>,
    pub is_active: bool,
    pub is_default: bool,
    pub sort_order: i64,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub metadata: JsonValue,
    pub is_thinking_model: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackendModelRow {
    pub fn new(model_slug: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            model_slug: model_slug.into(),
            display_name: display_name.into(),
            provider: String::new(),
            model_type: ModelType::Chat,
            tier: PricingTier::Budget,
            context_window: None,
            max_output_tokens: None,
            cost_per_million_input: None,
            cost_per_million_output: None,
            is_active: true,
            is_default: false,
            sort_order: 0,
            capabilities: Vec::new(),
            metadata: JsonValue::Null,
            is_thinking_model: false,
            created_at: now,
            updated_at: now,
        }
    }
}
