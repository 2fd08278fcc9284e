//! FX engine error types.

use std::fmt;

use convertpal_common::{CurrencyCode, Timestamp};
use thiserror::Error;

/// Machine-distinguishable category of an [`FxError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NetworkUnavailable,
    MalformedResponse,
    RefreshSuppressed,
    RateUnavailable,
    InvalidAmount,
    Storage,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NetworkUnavailable => "network_unavailable",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::RefreshSuppressed => "refresh_suppressed",
            ErrorKind::RateUnavailable => "rate_unavailable",
            ErrorKind::InvalidAmount => "invalid_amount",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in the FX engine.
///
/// Errors are `Clone` so that a single failed refresh can be handed to every
/// caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum FxError {
    /// The feed could not be reached, timed out, or refused the request.
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The feed or the persisted snapshot could not be decoded.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// An explicit refresh was requested while the cached rates are still fresh.
    #[error("Exchange rates are already the latest (fetched {fetched_at}); next refresh allowed in {retry_after_secs}s")]
    RefreshSuppressed {
        fetched_at: Timestamp,
        retry_after_secs: i64,
    },

    /// The requested currency has no usable rate.
    #[error("Rate not available for {0}")]
    RateUnavailable(CurrencyCode),

    /// Amount is negative, NaN or infinite.
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    /// The persisted snapshot could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Background refresh task failed to run to completion.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FxError::NetworkUnavailable(_) => ErrorKind::NetworkUnavailable,
            FxError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            FxError::RefreshSuppressed { .. } => ErrorKind::RefreshSuppressed,
            FxError::RateUnavailable(_) => ErrorKind::RateUnavailable,
            FxError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            FxError::Storage(_) => ErrorKind::Storage,
            FxError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FxError::NetworkUnavailable(_)
                | FxError::RefreshSuppressed { .. }
                | FxError::Internal(_)
        )
    }

    /// Seconds until a suppressed refresh would be allowed.
    pub fn retry_after_secs(&self) -> Option<i64> {
        match self {
            FxError::RefreshSuppressed {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Get error code for logs and machine consumers.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::NetworkUnavailable(_) => "NETWORK_UNAVAILABLE",
            FxError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            FxError::RefreshSuppressed { .. } => "REFRESH_SUPPRESSED",
            FxError::RateUnavailable(_) => "RATE_UNAVAILABLE",
            FxError::InvalidAmount(_) => "INVALID_AMOUNT",
            FxError::Storage(_) => "STORAGE_ERROR",
            FxError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Short title for user-facing notifications.
    pub fn title(&self) -> &'static str {
        match self {
            FxError::NetworkUnavailable(_) => "No Internet connection",
            FxError::MalformedResponse(_) => "Error decoding",
            FxError::RefreshSuppressed { .. } => "Cannot be refreshed",
            FxError::RateUnavailable(_) => "Rate unavailable",
            FxError::InvalidAmount(_) => "Invalid amount",
            FxError::Storage(_) => "Storage error",
            FxError::Internal(_) => "Unexpected error",
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
