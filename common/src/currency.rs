//! Currency identifiers and catalog entries.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::InvalidCurrencyCode;

/// Currency code such as `USD` or `BTC`.
///
/// Codes are opaque lookup keys. Construction upper-cases the input so that
/// `"eur"` and `"EUR"` address the same rate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Create a new code, upper-casing the input.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Parse user input, rejecting anything that is not a short alphanumeric code.
    pub fn parse(s: &str) -> Result<Self, InvalidCurrencyCode> {
        let code = Self::new(s);
        if code.is_valid() {
            Ok(code)
        } else {
            Err(InvalidCurrencyCode(s.to_string()))
        }
    }

    /// Get the code as a string slice.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Basic shape check: 2 to 10 ASCII alphanumerics.
    pub fn is_valid(&self) -> bool {
        (2..=10).contains(&self.0.len()) && self.0.chars().all(|c| c.is_ascii_alphanumeric())
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn gbp() -> Self {
        Self::new("GBP")
    }

    pub fn jpy() -> Self {
        Self::new("JPY")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CurrencyCode {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl FromStr for CurrencyCode {
    type Err = InvalidCurrencyCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// An entry of the currency catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub code: CurrencyCode,
    /// Display name, e.g. "United States Dollar".
    pub name: String,
}

impl Currency {
    pub fn new(code: impl Into<CurrencyCode>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }

    fn display_order(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.code.cmp(&other.code))
    }
}

/// The list of currencies offered by the feed, ordered by display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyCatalog {
    currencies: Vec<Currency>,
}

impl CurrencyCatalog {
    /// Build a catalog from a `code -> name` map.
    pub fn from_names(names: HashMap<String, String>) -> Self {
        let mut currencies: Vec<Currency> = names
            .into_iter()
            .map(|(code, name)| Currency::new(code, name))
            .collect();
        currencies.sort_by(Currency::display_order);
        Self { currencies }
    }

    /// Look up a currency by code.
    pub fn get(&self, code: &CurrencyCode) -> Option<&Currency> {
        self.currencies.iter().find(|c| &c.code == code)
    }

    /// The first entry in display order, used as the initial selection.
    pub fn first(&self) -> Option<&Currency> {
        self.currencies.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Currency> {
        self.currencies.iter()
    }

    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }
}

impl<'a> IntoIterator for &'a CurrencyCatalog {
    type Item = &'a Currency;
    type IntoIter = std::slice::Iter<'a, Currency>;

    fn into_iter(self) -> Self::IntoIter {
        self.currencies.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_code_is_uppercased() {
        assert_eq!(CurrencyCode::new("eur"), CurrencyCode::eur());
        assert_eq!(CurrencyCode::new(" usd "), CurrencyCode::usd());
        assert_eq!(CurrencyCode::eur().code(), "EUR");
    }

    #[test]
    fn test_code_parse() {
        assert_eq!("btc".parse::<CurrencyCode>().unwrap(), CurrencyCode::new("BTC"));
        assert!(CurrencyCode::parse("").is_err());
        assert!(CurrencyCode::parse("U$D").is_err());
        assert!(CurrencyCode::parse("X").is_err());
    }

    #[test]
    fn test_code_as_json_map_key() {
        let json = r#"{"usd": 1.0, "EUR": 0.85}"#;
        let rates: BTreeMap<CurrencyCode, f64> = serde_json::from_str(json).unwrap();

        assert_eq!(rates.get(&CurrencyCode::usd()), Some(&1.0));
        assert_eq!(rates.get(&CurrencyCode::eur()), Some(&0.85));

        let back = serde_json::to_string(&rates).unwrap();
        assert_eq!(back, r#"{"EUR":0.85,"USD":1.0}"#);
    }

    #[test]
    fn test_catalog_sorted_by_name() {
        let mut names = HashMap::new();
        names.insert("USD".to_string(), "United States Dollar".to_string());
        names.insert("EUR".to_string(), "Euro".to_string());
        names.insert("AFN".to_string(), "Afghan Afghani".to_string());

        let catalog = CurrencyCatalog::from_names(names);
        let codes: Vec<&str> = catalog.iter().map(|c| c.code.code()).collect();

        assert_eq!(codes, vec!["AFN", "EUR", "USD"]);
        assert_eq!(catalog.first().unwrap().name, "Afghan Afghani");
        assert_eq!(catalog.get(&CurrencyCode::eur()).unwrap().name, "Euro");
    }

    #[test]
    fn test_catalog_ties_broken_by_code() {
        let mut names = HashMap::new();
        names.insert("ZWL".to_string(), "Dollar".to_string());
        names.insert("AUD".to_string(), "Dollar".to_string());

        let catalog = CurrencyCatalog::from_names(names);
        let codes: Vec<&str> = catalog.iter().map(|c| c.code.code()).collect();

        assert_eq!(codes, vec!["AUD", "ZWL"]);
    }
}
