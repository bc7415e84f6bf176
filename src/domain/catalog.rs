//! Catalogue entities: providers, models and the links between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// An upstream company or hosting service that runs models.
///
/// Created on first sighting in the aggregator's providers feed and never
/// deleted; metadata may be refreshed on later sightings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub slug: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderRecord {
    pub fn new(slug: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            slug: slug.into(),
            display_name: display_name.into(),
            homepage_url: None,
            pricing_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_homepage(mut self, url: impl Into<String>) -> Self {
        self.homepage_url = Some(url.into());
        self
    }

    pub fn with_pricing_url(mut self, url: impl Into<String>) -> Self {
        self.pricing_url = Some(url.into());
        self
    }
}

/// A model as reported by the aggregator's catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Unique slug, typically `namespace/name`
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_slug: Option<String>,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_length: Option<i64>,
    /// Opaque architecture blob as reported upstream
    #[serde(default)]
    pub architecture: JsonValue,
    /// Capability tags, e.g. `tools`, `reasoning`, `dimensions`
    #[serde(default)]
    pub supported_parameters: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModelRecord {
    pub fn new(slug: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            slug: slug.into(),
            canonical_slug: None,
            display_name: display_name.into(),
            context_length: None,
            architecture: JsonValue::Null,
            supported_parameters: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The `namespace` part of a `namespace/name` slug, if present.
    pub fn namespace(&self) -> Option<&str> {
        self.slug.split_once('/').map(|(ns, _)| ns)
    }

    pub fn supports(&self, tag: &str) -> bool {
        self.supported_parameters.iter().any(|p| p == tag)
    }
}

/// Link row between a model and one of its hosting providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProviderLink {
    pub model_slug: String,
    pub provider_slug: String,
    pub is_top_provider: bool,
    #[serde(default)]
    pub provider_metadata: JsonValue,
}

impl ModelProviderLink {
    pub fn new(model_slug: impl Into<String>, provider_slug: impl Into<String>) -> Self {
        Self {
            model_slug: model_slug.into(),
            provider_slug: provider_slug.into(),
            is_top_provider: false,
            provider_metadata: JsonValue::Null,
        }
    }

    pub fn top_provider(mut self) -> Self {
        self.is_top_provider = true;
        self
    }
}
