//! Catalogue discovery: diff the remote feeds against the stored
//! catalogue, derive provider URLs, link models to providers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use tracing::{debug, info};
use url::Url;

use crate::aggregator::{RemoteModel, RemoteProvider};
use crate::domain::{ModelProviderLink, ModelRecord, ProviderRecord, Result};
use crate::storage::CatalogRepository;

/// Well-known pricing pages for providers whose feed entry lacks one.
static WELL_KNOWN_PRICING_URLS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("openai", "https://openai.com/api/pricing"),
        ("anthropic", "https://www.anthropic.com/pricing"),
        ("google", "https://ai.google.dev/pricing"),
        ("google-vertex", "https://cloud.google.com/vertex-ai/generative-ai/pricing"),
        ("mistralai", "https://mistral.ai/pricing"),
        ("deepseek", "https://api-docs.deepseek.com/quick_start/pricing"),
        ("cohere", "https://cohere.com/pricing"),
    ])
});

/// Result of one discovery pass.
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    /// Model slugs seen for the first time; downstream enrichment is eager
    /// for these.
    pub new_model_slugs: HashSet<String>,
    pub providers_upserted: usize,
    pub models_upserted: usize,
    pub links_upserted: usize,
}

pub struct Discovery {
    catalog: Arc<dyn CatalogRepository>,
}

impl Discovery {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Refresh the stored catalogue from the remote feeds.
    pub async fn run(
        &self,
        providers: &[RemoteProvider],
        models: &[RemoteModel],
    ) -> Result<DiscoveryOutcome> {
        let mut outcome = DiscoveryOutcome::default();

        for remote in providers {
            let record = provider_record(remote);
            self.catalog.upsert_provider(&record).await?;
            outcome.providers_upserted += 1;
        }

        let known_providers = self.catalog.provider_slugs().await?;
        let known_models = self.catalog.model_slugs().await?;

        for remote in models {
            let record = model_record(remote);
            self.catalog.upsert_model(&record).await?;
            outcome.models_upserted += 1;

            if !known_models.contains(&record.slug) {
                outcome.new_model_slugs.insert(record.slug.clone());
            }

            // Link iff the namespace prefix names a provider we know.
            if let Some(namespace) = remote.namespace() {
                if known_providers.contains(namespace) {
                    let mut link = ModelProviderLink::new(&record.slug, namespace);
                    if !remote.top_provider.is_null() {
                        link = link.top_provider();
                        link.provider_metadata = remote.top_provider.clone();
                    }
                    self.catalog.upsert_link(&link).await?;
                    outcome.links_upserted += 1;
                } else {
                    debug!(
                        model = %record.slug,
                        namespace,
                        "namespace does not match a known provider, no link"
                    );
                }
            }
        }

        info!(
            providers = outcome.providers_upserted,
            models = outcome.models_upserted,
            new_models = outcome.new_model_slugs.len(),
            "discovery pass complete"
        );

        Ok(outcome)
    }
}

fn provider_record(remote: &RemoteProvider) -> ProviderRecord {
    let mut record = ProviderRecord::new(&remote.slug, &remote.name);

    record.homepage_url = derive_homepage_url(remote);
    record.pricing_url = derive_pricing_url(&remote.slug, record.homepage_url.as_deref());
    record.updated_at = Utc::now();

    record
}

fn model_record(remote: &RemoteModel) -> ModelRecord {
    let display_name = if remote.name.is_empty() {
        remote.id.clone()
    } else {
        remote.name.clone()
    };

    let mut record = ModelRecord::new(&remote.id, display_name);
    record.canonical_slug = remote.canonical_slug.clone();
    record.context_length = remote.context_length;
    record.architecture = remote.architecture.clone();
    record.supported_parameters = remote.supported_parameters.clone();
    record.updated_at = Utc::now();
    record
}

/// Scheme+host of the first non-empty ancillary URL on the feed entry.
pub fn derive_homepage_url(remote: &RemoteProvider) -> Option<String> {
    [
        remote.privacy_policy_url.as_deref(),
        remote.terms_of_service_url.as_deref(),
        remote.status_page_url.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|u| !u.trim().is_empty())
    .find_map(|raw| {
        let url = Url::parse(raw).ok()?;
        let host = url.host_str()?;
        Some(format!("{}://{host}", url.scheme()))
    })
}

/// Well-known map first, else `{homepage}/pricing`, else nothing.
pub fn derive_pricing_url(slug: &str, homepage: Option<&str>) -> Option<String> {
    if let Some(url) = WELL_KNOWN_PRICING_URLS.get(slug) {
        return Some((*url).to_string());
    }
    homepage.map(|h| format!("{}/pricing", h.trim_end_matches('/')))
}
