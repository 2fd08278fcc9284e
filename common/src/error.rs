//! Error types shared across ConvertPal crates.

use thiserror::Error;

/// A currency code that does not look like a code at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid currency code: {0:?}")]
pub struct InvalidCurrencyCode(pub String);
