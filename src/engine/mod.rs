//! Normalisation and validation of raw pricing data.

pub mod normalize;
pub mod validate;

pub use normalize::{parse_absolute, parse_decimal, to_per_million};
pub use validate::{
    PriceChange, PriceValidator, ValidationOutcome, DEFAULT_CHANGE_THRESHOLD_PERCENT,
    DEFAULT_MAX_USD_PER_MILLION,
};
