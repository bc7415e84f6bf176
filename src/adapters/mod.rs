//! Per-provider pricing resolvers and the generic web fallback.

pub mod extract;
pub mod registry;
pub mod specific;
pub mod web;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::Result;

pub use registry::AdapterRegistry;
pub use specific::SpecificAdapter;
pub use web::GenericWebAdapter;

/// Pricing resolved for one `(provider, model)` pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingResult {
    pub prompt_usd_per_million: Option<Decimal>,
    pub completion_usd_per_million: Option<Decimal>,
    pub request_usd: Option<Decimal>,
    pub source_url: Option<String>,
    pub note: Option<String>,
}

impl PricingResult {
    pub fn is_empty(&self) -> bool {
        self.prompt_usd_per_million.is_none()
            && self.completion_usd_per_million.is_none()
            && self.request_usd.is_none()
    }

    /// Merge candidate tiers: the maximum of each numeric field
    /// independently ("highest price wins").
    pub fn merge_max(mut self, other: PricingResult) -> PricingResult {
        fn max_opt(a: Option<Decimal>, b: Option<Decimal>) -> Option<Decimal> {
            match (a, b) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            }
        }

        self.prompt_usd_per_million =
            max_opt(self.prompt_usd_per_million, other.prompt_usd_per_million);
        self.completion_usd_per_million = max_opt(
            self.completion_usd_per_million,
            other.completion_usd_per_million,
        );
        self.request_usd = max_opt(self.request_usd, other.request_usd);
        self.source_url = self.source_url.or(other.source_url);
        self.note = self.note.or(other.note);
        self
    }

    /// A single combined published rate applies to both input and output.
    pub fn combined(rate: Decimal) -> PricingResult {
        PricingResult {
            prompt_usd_per_million: Some(rate),
            completion_usd_per_million: Some(rate),
            request_usd: None,
            source_url: None,
            note: Some("single combined rate applied to input and output".to_string()),
        }
    }
}

/// A pricing resolver for one provider (or the generic fallback).
///
/// Credentials are injected at construction; adapters never read
/// process-wide state.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn slug(&self) -> &str;

    /// Resolve pricing for one model, or `None` when this adapter has
    /// nothing credible to offer. Upstream failures that only affect this
    /// adapter surface as `None`, not errors.
    async fn resolve(&self, model_name: &str, model_slug: &str) -> Result<Option<PricingResult>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_merge_max_takes_field_wise_maximum() {
        let a = PricingResult {
            prompt_usd_per_million: Some(dec!(3)),
            completion_usd_per_million: Some(dec!(20)),
            request_usd: None,
            source_url: Some("https://a.example".to_string()),
            note: None,
        };
        let b = PricingResult {
            prompt_usd_per_million: Some(dec!(5)),
            completion_usd_per_million: Some(dec!(15)),
            request_usd: Some(dec!(0.01)),
            source_url: None,
            note: None,
        };

        let merged = a.merge_max(b);
        assert_eq!(merged.prompt_usd_per_million, Some(dec!(5)));
        assert_eq!(merged.completion_usd_per_million, Some(dec!(20)));
        assert_eq!(merged.request_usd, Some(dec!(0.01)));
        assert_eq!(merged.source_url.as_deref(), Some("https://a.example"));
    }

    #[test]
    fn test_combined_rate_sets_both_fields_and_note() {
        let result = PricingResult::combined(dec!(2));
        assert_eq!(result.prompt_usd_per_million, Some(dec!(2)));
        assert_eq!(result.completion_usd_per_million, Some(dec!(2)));
        assert!(result.note.is_some());
    }
}
