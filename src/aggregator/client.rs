//! HTTP client for the aggregator API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client as HttpClient, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

use super::retry::{RetryConfig, RetryPolicy};
use super::types::{
    ModelsResponse, ProvidersResponse, RemoteModel, RemoteProvider, UsageReport,
};
use crate::config::{AggregatorConfig, ModelFilterConfig};
use crate::domain::{PriceWatchError, Result};
use crate::engine::parse_decimal;

/// Cooldown applied after a 429 when the server does not advertise one.
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Client for the aggregator's Models / Providers / Usage endpoints.
///
/// Shared read-mostly across workers; the only mutable state is the
/// rate-limit cooldown, which every call in the same tick respects.
#[derive(Clone)]
pub struct AggregatorClient {
    http: HttpClient,
    base_url: Url,
    api_key: String,
    models_path: String,
    providers_path: String,
    completions_path: String,
    retry_policy: RetryPolicy,
    cooldown_until: Arc<Mutex<Option<Instant>>>,
}

impl AggregatorClient {
    pub fn new(config: &AggregatorConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("llm-price-watch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
            models_path: config.models_path.clone(),
            providers_path: config.providers_path.clone(),
            completions_path: config.completions_path.clone(),
            retry_policy: RetryPolicy::new(RetryConfig::default()),
            cooldown_until: Arc::new(Mutex::new(None)),
        })
    }

    /// Fetch the model catalogue, filtered.
    ///
    /// Filters the API supports are passed as query parameters; all
    /// filters are re-applied client-side regardless.
    #[instrument(skip(self, filters))]
    pub async fn list_models(&self, filters: &ModelFilterConfig) -> Result<Vec<RemoteModel>> {
        let mut url = self.build_url(&self.models_path)?;
        if !filters.supported_parameters.is_empty() {
            url.query_pairs_mut()
                .append_pair("supported_parameters", &filters.supported_parameters.join(","));
        }

        let response: ModelsResponse = self.get_json(url).await?;
        debug!(total = response.data.len(), "fetched model catalogue");

        Ok(apply_filters(response.data, filters))
    }

    #[instrument(skip(self))]
    pub async fn list_providers(&self) -> Result<Vec<RemoteProvider>> {
        let url = self.build_url(&self.providers_path)?;
        let response: ProvidersResponse = self.get_json(url).await?;
        Ok(response.data)
    }

    /// Send a minimal completion request with `max_tokens = 1`, asking the
    /// API to include usage and cost breakdown. Spot-checks only; terminal
    /// failures are the caller's to record, not retry.
    #[instrument(skip(self))]
    pub async fn tiny_byok_call(&self, model_slug: &str) -> Result<UsageReport> {
        let url = self.build_url(&self.completions_path)?;
        let body = json!({
            "model": model_slug,
            "messages": [{"role": "user", "content": "ping"}],
            "max_tokens": 1,
            "usage": {"include": true},
        });

        let started = Instant::now();
        self.respect_cooldown().await;

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let payload: JsonValue = self.handle_response(response).await?;
        let response_ms = started.elapsed().as_millis() as i64;

        let usage = payload.get("usage").cloned().unwrap_or(JsonValue::Null);

        Ok(UsageReport {
            model_slug: model_slug.to_string(),
            aggregator_cost_usd: usage.get("cost").and_then(|v| parse_decimal(v)),
            upstream_cost_usd: usage
                .get("cost_details")
                .and_then(|d| d.get("upstream_inference_cost"))
                .and_then(|v| parse_decimal(v)),
            prompt_tokens: usage.get("prompt_tokens").and_then(|v| v.as_i64()),
            completion_tokens: usage.get("completion_tokens").and_then(|v| v.as_i64()),
            response_ms,
            raw_usage: usage,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        self.retry_policy
            .execute(|| {
                let url = url.clone();
                async move {
                    self.respect_cooldown().await;

                    let response = self
                        .http
                        .get(url)
                        .bearer_auth(&self.api_key)
                        .send()
                        .await?;

                    self.handle_response(response).await
                }
            })
            .await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);

            let cooldown = retry_after.unwrap_or(DEFAULT_COOLDOWN);
            warn!(?cooldown, "rate limited by aggregator");
            *self.cooldown_until.lock().await = Some(Instant::now() + cooldown);

            return Err(PriceWatchError::RateLimited { retry_after });
        }

        let message = response
            .json::<JsonValue>()
            .await
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.get("message"))
                    .or_else(|| v.get("message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "unknown error".to_string());

        error!(status = status.as_u16(), message = %message, "aggregator API error");
        Err(PriceWatchError::api(status.as_u16(), message))
    }

    /// Wait out any cooldown armed by an earlier 429 in this tick.
    async fn respect_cooldown(&self) {
        let deadline = *self.cooldown_until.lock().await;
        if let Some(until) = deadline {
            let now = Instant::now();
            if now < until {
                debug!(remaining = ?(until - now), "waiting out rate-limit cooldown");
                sleep(until - now).await;
            }
        }
    }

    fn build_url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }
}

/// Client-side catalogue filtering; applied even when the server already
/// filtered.
pub fn apply_filters(models: Vec<RemoteModel>, filters: &ModelFilterConfig) -> Vec<RemoteModel> {
    models
        .into_iter()
        .filter(|m| {
            filters
                .supported_parameters
                .iter()
                .all(|tag| m.supports(tag))
        })
        .filter(|m| match filters.distillable {
            Some(wanted) => m.distillable.unwrap_or(false) == wanted,
            None => true,
        })
        .filter(|m| {
            filters.input_modalities.is_empty() || {
                let have = m.input_modalities();
                filters.input_modalities.iter().all(|w| have.contains(w))
            }
        })
        .filter(|m| {
            filters.output_modalities.is_empty() || {
                let have = m.output_modalities();
                filters.output_modalities.iter().all(|w| have.contains(w))
            }
        })
        .collect()
}
