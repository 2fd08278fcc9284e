//! Exchange rate tables.

use std::collections::BTreeMap;
use std::sync::Arc;

use convertpal_common::CurrencyCode;

use crate::error::{FxError, FxResult};

/// Rates keyed by currency code.
pub type Rates = BTreeMap<CurrencyCode, f64>;

/// A table of positive exchange rates.
///
/// Every table remembers the reference currency the feed quoted in and the
/// raw reference-relative rates it was built from, so that re-basing always
/// starts from the feed's numbers instead of from an already divided table.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    reference: CurrencyCode,
    base: CurrencyCode,
    rates: Arc<Rates>,
    reference_rates: Arc<Rates>,
}

impl RateTable {
    /// Build a table from feed rates quoted against `reference`.
    ///
    /// Rejects empty tables, non-finite or non-positive rates, and a
    /// reference entry other than 1.0. A missing reference entry is filled in
    /// as 1.0.
    pub fn from_reference(reference: CurrencyCode, mut rates: Rates) -> FxResult<Self> {
        if rates.is_empty() {
            return Err(FxError::MalformedResponse("rate table is empty".to_string()));
        }

        if let Some((code, rate)) = rates.iter().find(|(_, r)| !r.is_finite() || **r <= 0.0) {
            return Err(FxError::MalformedResponse(format!(
                "rate for {} must be positive, got {}",
                code, rate
            )));
        }

        match rates.get(&reference) {
            Some(rate) if *rate != 1.0 => {
                return Err(FxError::MalformedResponse(format!(
                    "reference currency {} quoted at {} instead of 1",
                    reference, rate
                )));
            }
            Some(_) => {}
            None => {
                rates.insert(reference.clone(), 1.0);
            }
        }

        let rates = Arc::new(rates);
        Ok(Self {
            base: reference.clone(),
            reference,
            rates: rates.clone(),
            reference_rates: rates,
        })
    }

    /// Same reference data, expressed in another base.
    pub(crate) fn rebased(&self, base: CurrencyCode, rates: Rates) -> Self {
        Self {
            reference: self.reference.clone(),
            base,
            rates: Arc::new(rates),
            reference_rates: self.reference_rates.clone(),
        }
    }

    /// Currency the feed quoted every rate against.
    pub fn reference(&self) -> &CurrencyCode {
        &self.reference
    }

    /// Currency this table is expressed in (worth exactly 1.0).
    pub fn base(&self) -> &CurrencyCode {
        &self.base
    }

    /// Whether this table has been re-based away from the reference currency.
    pub fn is_normalized(&self) -> bool {
        self.base != self.reference
    }

    pub fn get(&self, code: &CurrencyCode) -> Option<f64> {
        self.rates.get(code).copied()
    }

    /// Rate for `code`, or `RateUnavailable`.
    pub fn rate(&self, code: &CurrencyCode) -> FxResult<f64> {
        usable(&self.rates, code)
    }

    /// Raw feed rate for `code`, or `RateUnavailable`.
    pub fn reference_rate(&self, code: &CurrencyCode) -> FxResult<f64> {
        usable(&self.reference_rates, code)
    }

    pub fn rates(&self) -> &Rates {
        &self.rates
    }

    /// The raw feed rates this table derives from.
    pub fn reference_rates(&self) -> &Rates {
        &self.reference_rates
    }

    /// The table as the feed delivered it.
    pub fn to_reference_table(&self) -> Self {
        Self {
            reference: self.reference.clone(),
            base: self.reference.clone(),
            rates: self.reference_rates.clone(),
            reference_rates: self.reference_rates.clone(),
        }
    }

    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.rates.contains_key(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CurrencyCode, f64)> {
        self.rates.iter().map(|(code, rate)| (code, *rate))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

fn usable(rates: &Rates, code: &CurrencyCode) -> FxResult<f64> {
    match rates.get(code) {
        Some(rate) if rate.is_finite() && *rate > 0.0 => Ok(*rate),
        _ => Err(FxError::RateUnavailable(code.clone())),
    }
}

#[cfg(test)]
pub(crate) fn sample_table() -> RateTable {
    let mut rates = Rates::new();
    rates.insert(CurrencyCode::usd(), 1.0);
    rates.insert(CurrencyCode::eur(), 0.85);
    rates.insert(CurrencyCode::gbp(), 0.75);
    RateTable::from_reference(CurrencyCode::usd(), rates).unwrap()
}
