//! Rate normalization and amount conversion.

use convertpal_common::CurrencyCode;
use tracing::trace;

use crate::error::{FxError, FxResult};
use crate::table::{RateTable, Rates};

/// Stateless conversion operations over a [`RateTable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversionEngine;

impl ConversionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Re-express `table` so that `base` is worth exactly 1.0.
    ///
    /// Normalizing to the table's current base returns it unchanged. Any
    /// other base is computed from the table's raw reference rates.
    pub fn normalize(&self, table: &RateTable, base: &CurrencyCode) -> FxResult<RateTable> {
        if table.base() == base {
            table.rate(base)?;
            return Ok(table.clone());
        }

        if base == table.reference() {
            return Ok(table.to_reference_table());
        }

        let divisor = table.reference_rate(base)?;
        let rates: Rates = table
            .reference_rates()
            .iter()
            .map(|(code, rate)| {
                let normalized = if code == base { 1.0 } else { rate / divisor };
                (code.clone(), normalized)
            })
            .collect();

        trace!(base = %base, divisor, "Normalized rate table");
        Ok(table.rebased(base.clone(), rates))
    }

    /// Convert `amount` of `from` into `to` using `table`.
    pub fn convert(
        &self,
        amount: f64,
        from: &CurrencyCode,
        to: &CurrencyCode,
        table: &RateTable,
    ) -> FxResult<f64> {
        validate_amount(amount)?;
        let from_rate = table.rate(from)?;
        let to_rate = table.rate(to)?;

        if from == to {
            return Ok(amount);
        }

        checked(amount, amount / from_rate * to_rate)
    }

    /// Convert `amount` of `from` into every currency in `table`.
    pub fn convert_all(
        &self,
        amount: f64,
        from: &CurrencyCode,
        table: &RateTable,
    ) -> FxResult<Vec<(CurrencyCode, f64)>> {
        validate_amount(amount)?;
        let from_rate = table.rate(from)?;

        table
            .iter()
            .map(|(code, rate)| {
                let value = if code == from {
                    amount
                } else {
                    checked(amount, amount / from_rate * rate)?
                };
                Ok((code.clone(), value))
            })
            .collect()
    }
}

/// A valid amount can still overflow once scaled by a large cross rate.
fn checked(amount: f64, value: f64) -> FxResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FxError::InvalidAmount(amount))
    }
}

fn validate_amount(amount: f64) -> FxResult<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(FxError::InvalidAmount(amount));
    }
    Ok(())
}
