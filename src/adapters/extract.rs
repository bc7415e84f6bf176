//! Regex extraction of per-million token prices from page text.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::PricingResult;

/// `$X / 1M tokens`, `$X per million tokens`, `$X/MTok` and friends.
static PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\s*(\d+(?:\.\d+)?)\s*(?:/|per)\s*(?:1\s*)?(?:m\b|mm\b|mtok|million)")
        .expect("price pattern compiles")
});

/// How far past a model-name mention prices are still attributed to it.
const WINDOW: usize = 400;

/// Extract candidate per-million prices mentioned near `model_name`.
///
/// Within one mention window the first price is treated as the input rate
/// and the second as the output rate; a lone price is a combined rate.
/// Across windows each field takes its maximum.
pub fn extract_model_prices(page: &str, model_name: &str) -> Option<PricingResult> {
    let needle = model_name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    let haystack = page.to_lowercase();

    let mut merged: Option<PricingResult> = None;

    for (index, _) in haystack.match_indices(&needle) {
        let start = index + needle.len();
        let mut end = (start + WINDOW).min(haystack.len());
        while !haystack.is_char_boundary(end) {
            end -= 1;
        }
        let window = &haystack[start..end];

        let prices: Vec<Decimal> = PRICE_RE
            .captures_iter(window)
            .filter_map(|c| Decimal::from_str(&c[1]).ok())
            .collect();

        let candidate = match prices.as_slice() {
            [] => continue,
            [single] => PricingResult::combined(*single),
            [input, output, ..] => PricingResult {
                prompt_usd_per_million: Some(*input),
                completion_usd_per_million: Some(*output),
                request_usd: None,
                source_url: None,
                note: None,
            },
        };

        merged = Some(match merged.take() {
            Some(existing) => existing.merge_max(candidate),
            None => candidate,
        });
    }

    merged
}

/// Drop extracted values outside the credible band.
pub fn clamp_to_bounds(
    result: PricingResult,
    min: Decimal,
    max: Decimal,
) -> Option<PricingResult> {
    let keep = |v: Option<Decimal>| v.filter(|d| *d >= min && *d <= max);

    let clamped = PricingResult {
        prompt_usd_per_million: keep(result.prompt_usd_per_million),
        completion_usd_per_million: keep(result.completion_usd_per_million),
        request_usd: result.request_usd,
        source_url: result.source_url,
        note: result.note,
    };

    if clamped.prompt_usd_per_million.is_none() && clamped.completion_usd_per_million.is_none() {
        None
    } else {
        Some(clamped)
    }
}
