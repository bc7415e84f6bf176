//! Adapter registration and lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client as HttpClient;

use super::specific::{
    SpecificAdapter, ANTHROPIC_PRICES, COHERE_PRICES, DEEPSEEK_PRICES, GOOGLE_PRICES,
    MISTRAL_PRICES, OPENAI_PRICES,
};
use super::web::GenericWebAdapter;
use super::ProviderAdapter;
use crate::config::ScrapingConfig;
use crate::domain::Result;

/// Registry of provider adapters, populated at startup with every known
/// specific adapter plus the generic web fallback.
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    generic: Arc<dyn ProviderAdapter>,
}

impl AdapterRegistry {
    pub fn new(config: &ScrapingConfig, request_timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(request_timeout)
            .user_agent(concat!("llm-price-watch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let specific: Vec<SpecificAdapter> = vec![
            SpecificAdapter::new(
                "openai",
                Some("https://openai.com/api/pricing"),
                OPENAI_PRICES,
                http.clone(),
            ),
            SpecificAdapter::new(
                "anthropic",
                Some("https://www.anthropic.com/pricing"),
                ANTHROPIC_PRICES,
                http.clone(),
            ),
            SpecificAdapter::new(
                "google",
                Some("https://ai.google.dev/pricing"),
                GOOGLE_PRICES,
                http.clone(),
            ),
            SpecificAdapter::new(
                "mistralai",
                Some("https://mistral.ai/pricing"),
                MISTRAL_PRICES,
                http.clone(),
            ),
            SpecificAdapter::new("deepseek", None, DEEPSEEK_PRICES, http.clone()),
            SpecificAdapter::new("cohere", None, COHERE_PRICES, http.clone()),
        ];

        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        for adapter in specific {
            adapters.insert(adapter.slug().to_string(), Arc::new(adapter));
        }

        let generic: Arc<dyn ProviderAdapter> =
            Arc::new(GenericWebAdapter::new(config.clone(), http));

        Ok(Self { adapters, generic })
    }

    /// The specific adapter for a provider, else the generic fallback.
    pub fn get(&self, provider_slug: &str) -> Arc<dyn ProviderAdapter> {
        self.adapters
            .get(provider_slug)
            .cloned()
            .unwrap_or_else(|| self.generic.clone())
    }

    /// The generic fallback adapter.
    pub fn generic(&self) -> Arc<dyn ProviderAdapter> {
        self.generic.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AdapterRegistry {
        AdapterRegistry::new(&ScrapingConfig::default(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_specific_adapter_lookup() {
        let r = registry();
        assert_eq!(r.get("openai").slug(), "openai");
        assert_eq!(r.get("anthropic").slug(), "anthropic");
    }

    #[test]
    fn test_unknown_provider_falls_back_to_generic() {
        let r = registry();
        assert_eq!(r.get("garage-gpu-collective").slug(), "web_fallback");
    }
}
