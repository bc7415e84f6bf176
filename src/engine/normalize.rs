//! Conversion of raw aggregator prices into USD per one million tokens.
//!
//! The aggregator quotes token prices per single token, serialised as JSON
//! strings (occasionally bare numbers). All arithmetic is exact decimal;
//! values never transit binary floating point.

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::str::FromStr;
use tracing::debug;

const TOKENS_PER_MILLION: u64 = 1_000_000;

/// Parse a raw JSON price value into a decimal.
///
/// `null`, empty strings and unparseable input yield `None`. Negative
/// values are sentinels ("dynamic routing / not applicable") and also
/// yield `None`.
pub fn parse_decimal(raw: &JsonValue) -> Option<Decimal> {
    let parsed = match raw {
        JsonValue::String(s) if !s.trim().is_empty() => Decimal::from_str(s.trim()).ok(),
        // Bare JSON numbers are rare on this feed; go through the textual
        // representation rather than f64.
        JsonValue::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }?;

    if parsed.is_sign_negative() && !parsed.is_zero() {
        debug!(raw = %parsed, "sentinel_pricing_value");
        return None;
    }

    Some(parsed)
}

/// Convert a raw per-token price into USD per 1M tokens.
pub fn to_per_million(raw: &JsonValue) -> Option<Decimal> {
    let per_token = parse_decimal(raw)?;
    match per_token.checked_mul(Decimal::from(TOKENS_PER_MILLION)) {
        Some(v) => Some(v.normalize()),
        None => {
            debug!(raw = %per_token, "pricing_value_overflow");
            None
        }
    }
}

/// Per-request and per-image amounts are absolute, not per-token; they pass
/// through unscaled. Sentinel handling matches `parse_decimal`.
pub fn parse_absolute(raw: &JsonValue) -> Option<Decimal> {
    parse_decimal(raw).map(|d| d.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_per_token_string_to_per_million() {
        assert_eq!(to_per_million(&json!("0.000003")), Some(dec!(3)));
        assert_eq!(to_per_million(&json!("0.000015")), Some(dec!(15)));
        assert_eq!(to_per_million(&json!("0.0000025")), Some(dec!(2.5)));
    }

    #[test]
    fn test_sentinel_maps_to_none() {
        assert_eq!(to_per_million(&json!("-1")), None);
        assert_eq!(to_per_million(&json!(-1)), None);
        assert_eq!(parse_absolute(&json!("-0.5")), None);
    }

    #[test]
    fn test_zero_is_expressible() {
        // Free tier persists as an explicit zero, not NULL.
        assert_eq!(to_per_million(&json!("0")), Some(Decimal::ZERO));
    }

    #[test]
    fn test_garbage_maps_to_none() {
        assert_eq!(to_per_million(&JsonValue::Null), None);
        assert_eq!(to_per_million(&json!("")), None);
        assert_eq!(to_per_million(&json!("   ")), None);
        assert_eq!(to_per_million(&json!("variable")), None);
        assert_eq!(to_per_million(&json!({"tiered": true})), None);
    }

    #[test]
    fn test_absolute_passthrough() {
        assert_eq!(parse_absolute(&json!("0.04")), Some(dec!(0.04)));
        assert_eq!(parse_absolute(&json!("2")), Some(dec!(2)));
    }

    proptest! {
        // Round-trip law: to_per_million(x) / 1M == x for every
        // non-negative input that normalises to a value.
        #[test]
        fn round_trip_normalisation(units in 0u64..10_000_000u64, scale in 0u32..12u32) {
            let x = Decimal::new(units as i64, scale);
            let raw = json!(x.to_string());
            let normalised = to_per_million(&raw).unwrap();
            prop_assert_eq!(normalised / Decimal::from(1_000_000u64), x.normalize());
        }
    }
}
