//! Generic web-search fallback adapter.
//!
//! Searches the configured web-search backend, fetches results from the
//! trusted-domain allowlist only, and extracts prices by regex. Enforces a
//! minimum inter-call delay to stay polite.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client as HttpClient;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use super::extract::{clamp_to_bounds, extract_model_prices};
use super::{PricingResult, ProviderAdapter};
use crate::config::ScrapingConfig;
use crate::domain::Result;

/// How many allowlisted search results are fetched per resolution.
const MAX_PAGES: usize = 3;

pub struct GenericWebAdapter {
    http: HttpClient,
    search_url: String,
    search_key: Option<String>,
    config: ScrapingConfig,
    last_call: Arc<Mutex<Option<Instant>>>,
}

impl GenericWebAdapter {
    pub fn new(config: ScrapingConfig, http: HttpClient) -> Self {
        Self {
            http,
            search_url: config.web_search_url.clone(),
            search_key: config.web_search_key.clone(),
            config,
            last_call: Arc::new(Mutex::new(None)),
        }
    }

    fn is_trusted(&self, raw_url: &str) -> bool {
        let Ok(url) = Url::parse(raw_url) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };

        self.config
            .trusted_domains
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{domain}")))
    }

    /// Sleep until at least the politeness delay has passed since the last
    /// outbound call from this adapter.
    async fn be_polite(&self) {
        let delay = Duration::from_millis(self.config.politeness_delay_ms);
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let key = match &self.search_key {
            Some(k) => k.clone(),
            None => return Ok(Vec::new()),
        };

        self.be_polite().await;

        let response = self
            .http
            .get(&self.search_url)
            .header("X-Subscription-Token", key)
            .query(&[("q", query), ("count", "10")])
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(
                status = response.status().as_u16(),
                "web search returned non-200"
            );
            return Ok(Vec::new());
        }

        let payload: JsonValue = response.json().await?;
        let urls = payload
            .get("web")
            .and_then(|w| w.get("results"))
            .and_then(|r| r.as_array())
            .map(|results| {
                results
                    .iter()
                    .filter_map(|r| r.get("url").and_then(|u| u.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(urls)
    }

    async fn fetch_page(&self, url: &str) -> Option<String> {
        self.be_polite().await;

        let response = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url, error = %e, "page fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(url, status = response.status().as_u16(), "page returned non-200");
            return None;
        }

        response.text().await.ok()
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for GenericWebAdapter {
    fn slug(&self) -> &str {
        "web_fallback"
    }

    async fn resolve(&self, model_name: &str, model_slug: &str) -> Result<Option<PricingResult>> {
        if self.search_key.is_none() {
            debug!(model = model_slug, "web search disabled, no key configured");
            return Ok(None);
        }

        let query = format!("{model_slug} pricing USD per million tokens");
        let urls = self.search(&query).await?;

        let trusted: Vec<String> = urls
            .into_iter()
            .filter(|u| self.is_trusted(u))
            .take(MAX_PAGES)
            .collect();

        if trusted.is_empty() {
            debug!(model = model_slug, "no trusted search results");
            return Ok(None);
        }

        let mut merged: Option<PricingResult> = None;

        for url in trusted {
            let Some(page) = self.fetch_page(&url).await else {
                continue;
            };

            let Some(mut extracted) = extract_model_prices(&page, model_name) else {
                continue;
            };
            extracted.source_url = Some(url);

            let Some(bounded) = clamp_to_bounds(
                extracted,
                self.config.min_extracted_usd_per_million,
                self.config.max_extracted_usd_per_million,
            ) else {
                continue;
            };

            merged = Some(match merged.take() {
                Some(existing) => existing.merge_max(bounded),
                None => bounded,
            });
        }

        Ok(merged.filter(|r| !r.is_empty()))
    }
}
