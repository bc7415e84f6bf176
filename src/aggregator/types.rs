//! Wire types for the aggregator's Models / Providers / Usage endpoints.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub data: Vec<RemoteModel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersResponse {
    #[serde(default)]
    pub data: Vec<RemoteProvider>,
}

/// One catalogue entry as the aggregator reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteModel {
    pub id: String,
    #[serde(default)]
    pub canonical_slug: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub context_length: Option<i64>,
    /// Opaque architecture blob; modalities are read out of it when
    /// filtering.
    #[serde(default)]
    pub architecture: JsonValue,
    #[serde(default)]
    pub pricing: Option<RemotePricing>,
    #[serde(default)]
    pub supported_parameters: Vec<String>,
    #[serde(default)]
    pub top_provider: JsonValue,
    #[serde(default)]
    pub distillable: Option<bool>,
}

impl RemoteModel {
    fn modalities(&self, key: &str) -> Vec<String> {
        self.architecture
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn input_modalities(&self) -> Vec<String> {
        self.modalities("input_modalities")
    }

    pub fn output_modalities(&self) -> Vec<String> {
        self.modalities("output_modalities")
    }

    pub fn supports(&self, tag: &str) -> bool {
        self.supported_parameters.iter().any(|p| p == tag)
    }

    /// The `namespace` part of a `namespace/name` id, if present.
    pub fn namespace(&self) -> Option<&str> {
        self.id.split_once('/').map(|(ns, _)| ns)
    }
}

/// Raw pricing block. Values are per single token and arrive as JSON
/// strings (occasionally bare numbers); parsing is the normaliser's job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemotePricing {
    #[serde(default)]
    pub prompt: JsonValue,
    #[serde(default)]
    pub completion: JsonValue,
    #[serde(default)]
    pub request: JsonValue,
    #[serde(default)]
    pub image: JsonValue,
    #[serde(default)]
    pub web_search: JsonValue,
    #[serde(default)]
    pub internal_reasoning: JsonValue,
    #[serde(default)]
    pub input_cache_read: JsonValue,
    #[serde(default)]
    pub input_cache_write: JsonValue,
}

/// One provider entry from the providers feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProvider {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub privacy_policy_url: Option<String>,
    #[serde(default)]
    pub terms_of_service_url: Option<String>,
    #[serde(default)]
    pub status_page_url: Option<String>,
}

/// Usage and cost breakdown from a tiny BYOK completion call.
#[derive(Debug, Clone)]
pub struct UsageReport {
    pub model_slug: String,
    pub aggregator_cost_usd: Option<Decimal>,
    pub upstream_cost_usd: Option<Decimal>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub response_ms: i64,
    pub raw_usage: JsonValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_model_deserialization() {
        let raw = json!({
            "id": "openai/gpt-4o",
            "name": "GPT-4o",
            "context_length": 128000,
            "architecture": {
                "input_modalities": ["text", "image"],
                "output_modalities": ["text"]
            },
            "pricing": {"prompt": "0.0000025", "completion": "0.00001"},
            "supported_parameters": ["tools", "max_tokens"]
        });

        let model: RemoteModel = serde_json::from_value(raw).unwrap();
        assert_eq!(model.namespace(), Some("openai"));
        assert_eq!(model.input_modalities(), vec!["text", "image"]);
        assert!(model.supports("tools"));
        assert!(model.pricing.is_some());
    }

    #[test]
    fn test_sparse_model_deserialization() {
        // Catalogue entries routinely omit most fields.
        let model: RemoteModel = serde_json::from_value(json!({"id": "x/y"})).unwrap();
        assert!(model.pricing.is_none());
        assert!(model.input_modalities().is_empty());
        assert!(!model.supports("tools"));
    }
}
