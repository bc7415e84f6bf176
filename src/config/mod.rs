//! Process configuration.
//!
//! Environment variables are the primary source; a TOML file may be used to
//! seed the same structure (the environment always wins). Missing required
//! settings are a fatal startup error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;

use crate::domain::{PriceWatchError, Result};
use crate::engine::{DEFAULT_CHANGE_THRESHOLD_PERCENT, DEFAULT_MAX_USD_PER_MILLION};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub pricing_store: StoreConfig,
    /// Absent → backend sync disabled.
    #[serde(default)]
    pub backend_store: Option<StoreConfig>,
    #[serde(default)]
    pub scraping: ScrapingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub filters: ModelFilterConfig,
    #[serde(default)]
    pub projection: ProjectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub base_url: String,
    pub api_key: String,
    /// Endpoint paths are deployment configuration, not constants.
    #[serde(default = "default_models_path")]
    pub models_path: String,
    #[serde(default = "default_providers_path")]
    pub providers_path: String,
    #[serde(default = "default_completions_path")]
    pub completions_path: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            models_path: default_models_path(),
            providers_path: default_providers_path(),
            completions_path: default_completions_path(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for AggregatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatorConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .field("models_path", &self.models_path)
            .field("providers_path", &self.providers_path)
            .field("completions_path", &self.completions_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// sqlx connection URL; credentials ride in the URL.
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: default_max_connections(),
            connection_timeout_secs: default_connection_timeout_secs(),
            run_migrations: default_run_migrations(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    /// Gate on the provider-site resolution step; default off.
    #[serde(default)]
    pub enable_provider_scraping: bool,
    /// Credential for the web-search backend used by the generic adapter.
    #[serde(default)]
    pub web_search_key: Option<String>,
    #[serde(default = "default_web_search_url")]
    pub web_search_url: String,
    /// Prices are extracted only from pages on these domains.
    #[serde(default = "default_trusted_domains")]
    pub trusted_domains: Vec<String>,
    #[serde(default = "default_min_extracted_usd")]
    pub min_extracted_usd_per_million: Decimal,
    #[serde(default = "default_max_extracted_usd")]
    pub max_extracted_usd_per_million: Decimal,
    #[serde(default = "default_politeness_delay_ms")]
    pub politeness_delay_ms: u64,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            enable_provider_scraping: false,
            web_search_key: None,
            web_search_url: default_web_search_url(),
            trusted_domains: default_trusted_domains(),
            min_extracted_usd_per_million: default_min_extracted_usd(),
            max_extracted_usd_per_million: default_max_extracted_usd(),
            politeness_delay_ms: default_politeness_delay_ms(),
        }
    }
}

impl std::fmt::Debug for ScrapingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapingConfig")
            .field("enable_provider_scraping", &self.enable_provider_scraping)
            .field(
                "web_search_key",
                &self.web_search_key.as_ref().map(|_| "[redacted]"),
            )
            .field("web_search_url", &self.web_search_url)
            .field("trusted_domains", &self.trusted_domains)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    #[serde(default = "default_run_on_startup")]
    pub run_on_startup: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            run_on_startup: default_run_on_startup(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_parallel_models")]
    pub max_parallel_models: usize,
    #[serde(default = "default_change_threshold")]
    pub price_change_threshold_percent: Decimal,
    #[serde(default = "default_max_price")]
    pub max_usd_per_million: Decimal,
    #[serde(default = "default_byok_sample_size")]
    pub byok_sample_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_parallel_models: default_max_parallel_models(),
            price_change_threshold_percent: default_change_threshold(),
            max_usd_per_million: default_max_price(),
            byok_sample_size: default_byok_sample_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelFilterConfig {
    /// Capability tags every model must carry.
    #[serde(default)]
    pub supported_parameters: Vec<String>,
    #[serde(default)]
    pub distillable: Option<bool>,
    #[serde(default)]
    pub input_modalities: Vec<String>,
    #[serde(default)]
    pub output_modalities: Vec<String>,
}

/// Hardcoded row inserted when a protected model is absent upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedModelSpec {
    pub display_name: String,
    pub provider: String,
    pub model_type: String,
    pub cost_per_million_input: Decimal,
    pub cost_per_million_output: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    #[serde(default = "default_freshness_window_days")]
    pub freshness_window_days: i64,
    /// Slugs that must stay active in the backend regardless of the feed.
    #[serde(default = "default_protected_models")]
    pub protected_models: Vec<String>,
    #[serde(default = "default_protection_map")]
    pub protection_map: HashMap<String, ProtectedModelSpec>,
    #[serde(default)]
    pub default_embedding_model_id: Option<String>,
    #[serde(default)]
    pub default_chat_model_id: Option<String>,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            freshness_window_days: default_freshness_window_days(),
            protected_models: default_protected_models(),
            protection_map: default_protection_map(),
            default_embedding_model_id: None,
            default_chat_model_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_models_path() -> String {
    "/api/v1/models".to_string()
}

fn default_providers_path() -> String {
    "/api/v1/providers".to_string()
}

fn default_completions_path() -> String {
    "/api/v1/chat/completions".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout_secs() -> u64 {
    30
}

fn default_run_migrations() -> bool {
    true
}

fn default_web_search_url() -> String {
    "https://api.search.brave.com/res/v1/web/search".to_string()
}

fn default_trusted_domains() -> Vec<String> {
    [
        "openai.com",
        "anthropic.com",
        "cloud.google.com",
        "ai.google.dev",
        "mistral.ai",
        "deepseek.com",
        "cohere.com",
        "openrouter.ai",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_min_extracted_usd() -> Decimal {
    Decimal::new(1, 2) // $0.01
}

fn default_max_extracted_usd() -> Decimal {
    Decimal::from(DEFAULT_MAX_USD_PER_MILLION)
}

fn default_politeness_delay_ms() -> u64 {
    1_000
}

fn default_interval_hours() -> u64 {
    24
}

fn default_run_on_startup() -> bool {
    true
}

fn default_max_parallel_models() -> usize {
    10
}

fn default_change_threshold() -> Decimal {
    Decimal::from(DEFAULT_CHANGE_THRESHOLD_PERCENT)
}

fn default_max_price() -> Decimal {
    Decimal::from(DEFAULT_MAX_USD_PER_MILLION)
}

fn default_byok_sample_size() -> usize {
    5
}

fn default_freshness_window_days() -> i64 {
    7
}

fn default_protected_models() -> Vec<String> {
    vec!["openai/text-embedding-3-large".to_string()]
}

fn default_protection_map() -> HashMap<String, ProtectedModelSpec> {
    let mut map = HashMap::new();
    map.insert(
        "openai/text-embedding-3-large".to_string(),
        ProtectedModelSpec {
            display_name: "Text Embedding 3 Large".to_string(),
            provider: "openai".to_string(),
            model_type: "embedding".to_string(),
            cost_per_million_input: Decimal::new(13, 2),  // 0.13
            cost_per_million_output: Decimal::new(65, 3), // 0.065
        },
    );
    map
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides on top.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_var("AGGREGATOR_URL") {
            self.aggregator.base_url = v;
        }
        if let Some(v) = env_var("AGGREGATOR_KEY") {
            self.aggregator.api_key = v;
        }
        if let Some(v) = env_var("AGGREGATOR_MODELS_PATH") {
            self.aggregator.models_path = v;
        }
        if let Some(v) = env_var("AGGREGATOR_PROVIDERS_PATH") {
            self.aggregator.providers_path = v;
        }
        if let Some(v) = env_var("AGGREGATOR_COMPLETIONS_PATH") {
            self.aggregator.completions_path = v;
        }
        if let Some(v) = env_parse("REQUEST_TIMEOUT_SECONDS") {
            self.aggregator.request_timeout_secs = v;
        }

        if let Some(v) = env_var("PRICING_STORE_URL") {
            self.pricing_store.url = v;
        }
        if let Some(v) = env_var("BACKEND_STORE_URL") {
            let mut store = self.backend_store.take().unwrap_or_default();
            store.url = v;
            self.backend_store = Some(store);
        }

        if let Some(v) = env_bool("ENABLE_PROVIDER_SCRAPING") {
            self.scraping.enable_provider_scraping = v;
        }
        if let Some(v) = env_var("WEB_SEARCH_KEY") {
            self.scraping.web_search_key = Some(v);
        }
        if let Some(v) = env_var("WEB_SEARCH_URL") {
            self.scraping.web_search_url = v;
        }
        if let Some(v) = env_csv("TRUSTED_PRICE_DOMAINS") {
            self.scraping.trusted_domains = v;
        }

        if let Some(v) = env_parse("RUN_INTERVAL_HOURS") {
            self.scheduler.interval_hours = v;
        }
        if let Some(v) = env_bool("RUN_ON_STARTUP") {
            self.scheduler.run_on_startup = v;
        }

        if let Some(v) = env_parse("MAX_PARALLEL_MODELS") {
            self.pipeline.max_parallel_models = v;
        }
        if let Some(v) = env_parse::<Decimal>("PRICE_CHANGE_THRESHOLD_PERCENT") {
            self.pipeline.price_change_threshold_percent = v;
        }
        if let Some(v) = env_parse("BYOK_SAMPLE_SIZE") {
            self.pipeline.byok_sample_size = v;
        }

        if let Some(v) = env_csv("MODEL_FILTER_SUPPORTED_PARAMETERS") {
            self.filters.supported_parameters = v;
        }
        if let Some(v) = env_bool("MODEL_FILTER_DISTILLABLE") {
            self.filters.distillable = Some(v);
        }
        if let Some(v) = env_csv("MODEL_FILTER_INPUT_MODALITIES") {
            self.filters.input_modalities = v;
        }
        if let Some(v) = env_csv("MODEL_FILTER_OUTPUT_MODALITIES") {
            self.filters.output_modalities = v;
        }

        if let Some(v) = env_parse("FRESHNESS_WINDOW_DAYS") {
            self.projection.freshness_window_days = v;
        }
        if let Some(v) = env_csv("PROTECTED_MODEL_SLUGS") {
            self.projection.protected_models = v;
        }
        if let Some(v) = env_var("DEFAULT_EMBEDDING_MODEL_ID") {
            self.projection.default_embedding_model_id = Some(v);
        }
        if let Some(v) = env_var("DEFAULT_CHAT_MODEL_ID") {
            self.projection.default_chat_model_id = Some(v);
        }

        if let Some(v) = env_var("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env_bool("LOG_JSON") {
            self.logging.json = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.aggregator.base_url.is_empty() {
            return Err(PriceWatchError::config("AGGREGATOR_URL is required"));
        }
        if self.aggregator.api_key.is_empty() {
            return Err(PriceWatchError::config("AGGREGATOR_KEY is required"));
        }
        if self.pricing_store.url.is_empty() {
            return Err(PriceWatchError::config("PRICING_STORE_URL is required"));
        }
        if self.scheduler.interval_hours == 0 {
            return Err(PriceWatchError::config(
                "RUN_INTERVAL_HOURS must be greater than 0",
            ));
        }
        if self.pipeline.max_parallel_models == 0 {
            return Err(PriceWatchError::config(
                "MAX_PARALLEL_MODELS must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn backend_sync_enabled(&self) -> bool {
        self.backend_store.is_some()
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_var(key).and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env_var(key).map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

fn env_csv(key: &str) -> Option<Vec<String>> {
    env_var(key).map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
