//! ConvertPal Common Types
//!
//! Shared types used across ConvertPal crates: currency codes, the currency
//! catalog, and time utilities.

pub mod currency;
pub mod error;
pub mod time;

pub use currency::*;
pub use error::*;
pub use time::*;
