//! Price sanity checks and change detection against prior snapshots.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::domain::PricingSnapshot;

/// Default cap on a credible price: $10,000 per 1M tokens.
pub const DEFAULT_MAX_USD_PER_MILLION: u64 = 10_000;

/// Default significant-change threshold, in percent.
pub const DEFAULT_CHANGE_THRESHOLD_PERCENT: u64 = 30;

/// Outcome of validating a candidate snapshot.
///
/// `ok = false` suppresses the write; warnings never do.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub ok: bool,
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    fn passed() -> Self {
        Self {
            ok: true,
            warnings: Vec::new(),
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            warnings: vec![reason.into()],
        }
    }
}

/// A significant movement in one monetary field between two snapshots of
/// the same source type and provider.
#[derive(Debug, Clone, Serialize)]
pub struct PriceChange {
    pub field: &'static str,
    pub old_usd_per_million: Decimal,
    pub new_usd_per_million: Decimal,
    pub change_percent: Decimal,
}

#[derive(Debug, Clone)]
pub struct PriceValidator {
    max_usd_per_million: Decimal,
    change_threshold_percent: Decimal,
}

impl Default for PriceValidator {
    fn default() -> Self {
        Self::new(
            Decimal::from(DEFAULT_MAX_USD_PER_MILLION),
            Decimal::from(DEFAULT_CHANGE_THRESHOLD_PERCENT),
        )
    }
}

impl PriceValidator {
    pub fn new(max_usd_per_million: Decimal, change_threshold_percent: Decimal) -> Self {
        Self {
            max_usd_per_million,
            change_threshold_percent,
        }
    }

    /// Sanity-check normalised token prices for one model.
    ///
    /// Negative values are a hard failure; normalisation already maps them
    /// to `None`, so reaching one here means a bug upstream of this call.
    /// Everything else is at most a warning.
    pub fn validate(
        &self,
        prompt: Option<Decimal>,
        completion: Option<Decimal>,
        model_slug: &str,
        has_image_pricing: bool,
    ) -> ValidationOutcome {
        for (field, value) in [("prompt", prompt), ("completion", completion)] {
            if let Some(v) = value {
                if v.is_sign_negative() && !v.is_zero() {
                    return ValidationOutcome::failed(format!(
                        "negative {field} price {v} for {model_slug}"
                    ));
                }
            }
        }

        let mut outcome = ValidationOutcome::passed();

        for (field, value) in [("prompt", prompt), ("completion", completion)] {
            if let Some(v) = value {
                if v > self.max_usd_per_million {
                    outcome.warnings.push(format!(
                        "{field} price {v} for {model_slug} exceeds cap {}",
                        self.max_usd_per_million
                    ));
                }
            }
        }

        if let (Some(p), Some(c)) = (prompt, completion) {
            if c < p {
                if has_image_pricing {
                    // Legitimate for image-capable models.
                    debug!(
                        model = model_slug,
                        prompt = %p,
                        completion = %c,
                        "completion_below_prompt_for_image_model"
                    );
                } else {
                    outcome
                        .warnings
                        .push(format!("completion {c} below prompt {p} for {model_slug}"));
                }
            }
        }

        outcome
    }

    /// Compare a candidate snapshot against the most recent prior snapshot
    /// of the same source type and provider.
    ///
    /// Returns the fields whose relative movement exceeds the configured
    /// threshold. The caller emits the event; the write is never suppressed.
    pub fn detect_change(&self, prev: &PricingSnapshot, cur: &PricingSnapshot) -> Vec<PriceChange> {
        debug_assert_eq!(prev.source_type, cur.source_type);

        let mut changes = Vec::new();

        let pairs = [
            (
                "prompt_usd_per_million",
                prev.prompt_usd_per_million,
                cur.prompt_usd_per_million,
            ),
            (
                "completion_usd_per_million",
                prev.completion_usd_per_million,
                cur.completion_usd_per_million,
            ),
        ];

        for (field, old, new) in pairs {
            let (Some(old), Some(new)) = (old, new) else {
                continue;
            };
            if old.is_zero() {
                continue;
            }

            let change_percent = ((new - old).abs() / old) * Decimal::from(100u64);
            if change_percent > self.change_threshold_percent {
                changes.push(PriceChange {
                    field,
                    old_usd_per_million: old,
                    new_usd_per_million: new,
                    change_percent: change_percent.round_dp(2),
                });
            }
        }

        changes
    }
}
