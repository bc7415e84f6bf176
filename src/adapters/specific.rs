//! Adapters for well-known providers.
//!
//! Each carries a small fallback table of published prices (USD per 1M
//! tokens) and optionally scrapes the provider's documented pricing page.
//! Table entries match on model-name prefix.

use reqwest::Client as HttpClient;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::extract::extract_model_prices;
use super::{PricingResult, ProviderAdapter};
use crate::domain::Result;

/// One fallback table entry; prices per 1M tokens.
#[derive(Debug, Clone, Copy)]
pub struct KnownPrice {
    pub model_prefix: &'static str,
    pub prompt_usd_per_million: Decimal,
    pub completion_usd_per_million: Decimal,
}

const fn known(prefix: &'static str, prompt: Decimal, completion: Decimal) -> KnownPrice {
    KnownPrice {
        model_prefix: prefix,
        prompt_usd_per_million: prompt,
        completion_usd_per_million: completion,
    }
}

/// Resolver for one well-known provider.
pub struct SpecificAdapter {
    slug: &'static str,
    pricing_page: Option<&'static str>,
    table: &'static [KnownPrice],
    http: HttpClient,
}

impl SpecificAdapter {
    pub fn new(
        slug: &'static str,
        pricing_page: Option<&'static str>,
        table: &'static [KnownPrice],
        http: HttpClient,
    ) -> Self {
        Self {
            slug,
            pricing_page,
            table,
            http,
        }
    }

    fn lookup_table(&self, model_name: &str) -> Option<PricingResult> {
        let name = model_name.to_lowercase();
        self.table
            .iter()
            .filter(|entry| name.starts_with(entry.model_prefix))
            // Longest prefix is the most specific match.
            .max_by_key(|entry| entry.model_prefix.len())
            .map(|entry| PricingResult {
                prompt_usd_per_million: Some(entry.prompt_usd_per_million),
                completion_usd_per_million: Some(entry.completion_usd_per_million),
                request_usd: None,
                source_url: self.pricing_page.map(str::to_string),
                note: Some("known published price".to_string()),
            })
    }

    async fn scrape_pricing_page(&self, model_name: &str) -> Option<PricingResult> {
        let page_url = self.pricing_page?;

        let response = match self.http.get(page_url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(provider = self.slug, error = %e, "pricing page fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(
                provider = self.slug,
                status = response.status().as_u16(),
                "pricing page returned non-200"
            );
            return None;
        }

        let body = response.text().await.ok()?;
        let mut result = extract_model_prices(&body, model_name)?;
        result.source_url = Some(page_url.to_string());
        Some(result)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for SpecificAdapter {
    fn slug(&self) -> &str {
        self.slug
    }

    async fn resolve(&self, model_name: &str, model_slug: &str) -> Result<Option<PricingResult>> {
        let scraped = self.scrape_pricing_page(model_name).await;
        let fallback = self.lookup_table(model_name);

        let result = match (scraped, fallback) {
            (Some(s), Some(f)) => Some(s.merge_max(f)),
            (s, f) => s.or(f),
        };

        if result.is_none() {
            debug!(provider = self.slug, model = model_slug, "no pricing resolved");
        }

        Ok(result.filter(|r| !r.is_empty()))
    }
}

// Fallback tables. Approximate published prices, USD per 1M tokens.

pub const OPENAI_PRICES: &[KnownPrice] = &[
    known("gpt-4o-mini", Decimal::from_parts(15, 0, 0, false, 2), Decimal::from_parts(60, 0, 0, false, 2)),
    known("gpt-4o", Decimal::from_parts(250, 0, 0, false, 2), Decimal::from_parts(1000, 0, 0, false, 2)),
    known("gpt-4.1", Decimal::from_parts(200, 0, 0, false, 2), Decimal::from_parts(800, 0, 0, false, 2)),
    known("o3", Decimal::from_parts(200, 0, 0, false, 2), Decimal::from_parts(800, 0, 0, false, 2)),
    known("text-embedding-3-large", Decimal::from_parts(13, 0, 0, false, 2), Decimal::from_parts(13, 0, 0, false, 2)),
];

pub const ANTHROPIC_PRICES: &[KnownPrice] = &[
    known("claude-opus", Decimal::from_parts(15, 0, 0, false, 0), Decimal::from_parts(75, 0, 0, false, 0)),
    known("claude-sonnet", Decimal::from_parts(3, 0, 0, false, 0), Decimal::from_parts(15, 0, 0, false, 0)),
    known("claude-haiku", Decimal::from_parts(25, 0, 0, false, 2), Decimal::from_parts(125, 0, 0, false, 2)),
];

pub const GOOGLE_PRICES: &[KnownPrice] = &[
    known("gemini-2.5-pro", Decimal::from_parts(125, 0, 0, false, 2), Decimal::from_parts(1000, 0, 0, false, 2)),
    known("gemini-2.5-flash", Decimal::from_parts(15, 0, 0, false, 2), Decimal::from_parts(60, 0, 0, false, 2)),
    known("gemini", Decimal::from_parts(125, 0, 0, false, 2), Decimal::from_parts(500, 0, 0, false, 2)),
];

pub const MISTRAL_PRICES: &[KnownPrice] = &[
    known("mistral-large", Decimal::from_parts(2, 0, 0, false, 0), Decimal::from_parts(6, 0, 0, false, 0)),
    known("mistral-small", Decimal::from_parts(10, 0, 0, false, 2), Decimal::from_parts(30, 0, 0, false, 2)),
];

pub const DEEPSEEK_PRICES: &[KnownPrice] = &[
    known("deepseek-chat", Decimal::from_parts(27, 0, 0, false, 2), Decimal::from_parts(110, 0, 0, false, 2)),
    known("deepseek-r1", Decimal::from_parts(55, 0, 0, false, 2), Decimal::from_parts(219, 0, 0, false, 2)),
];

pub const COHERE_PRICES: &[KnownPrice] = &[
    known("command-r-plus", Decimal::from_parts(250, 0, 0, false, 2), Decimal::from_parts(1000, 0, 0, false, 2)),
    known("command-r", Decimal::from_parts(15, 0, 0, false, 2), Decimal::from_parts(60, 0, 0, false, 2)),
];

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn adapter(table: &'static [KnownPrice]) -> SpecificAdapter {
        SpecificAdapter::new("test", None, table, HttpClient::new())
    }

    #[test]
    fn test_table_prefix_match_prefers_longest() {
        let a = adapter(OPENAI_PRICES);

        let mini = a.lookup_table("gpt-4o-mini-2024-07-18").unwrap();
        assert_eq!(mini.prompt_usd_per_million, Some(dec!(0.15)));

        let full = a.lookup_table("gpt-4o-2024-08-06").unwrap();
        assert_eq!(full.prompt_usd_per_million, Some(dec!(2.50)));
    }

    #[test]
    fn test_table_miss_is_none() {
        let a = adapter(ANTHROPIC_PRICES);
        assert!(a.lookup_table("unknown-model").is_none());
    }

    #[test]
    fn test_anthropic_table_values() {
        let a = adapter(ANTHROPIC_PRICES);
        let sonnet = a.lookup_table("claude-sonnet-4").unwrap();
        assert_eq!(sonnet.prompt_usd_per_million, Some(dec!(3)));
        assert_eq!(sonnet.completion_usd_per_million, Some(dec!(15)));
    }

    #[tokio::test]
    async fn test_resolve_without_page_uses_table() {
        let a = adapter(MISTRAL_PRICES);
        let result = a.resolve("mistral-large-2411", "mistralai/mistral-large").await.unwrap();
        assert_eq!(result.unwrap().prompt_usd_per_million, Some(dec!(2)));
    }
}
