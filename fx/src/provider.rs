//! Rate provider traits and implementations.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use convertpal_common::{CurrencyCatalog, CurrencyCode};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::{FxError, FxResult};
use crate::table::{RateTable, Rates};

/// Source of exchange rates and the currency catalog.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch the latest rate table, quoted against the provider's reference currency.
    async fn fetch_rates(&self) -> FxResult<RateTable>;

    /// Fetch the list of supported currencies.
    async fn fetch_catalog(&self) -> FxResult<CurrencyCatalog>;
}

/// Configuration for the Open Exchange Rates feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// API root, without a trailing slash.
    pub base_url: String,
    /// App id sent as the `app_id` query parameter of the rates request.
    pub app_id: String,
    /// Currency the feed quotes against when the payload does not say.
    pub reference: CurrencyCode,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openexchangerates.org/api".to_string(),
            app_id: String::new(),
            reference: CurrencyCode::usd(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl FeedConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("CONVERTPAL_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }

        if let Ok(app_id) = std::env::var("CONVERTPAL_APP_ID") {
            config.app_id = app_id;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!("Feed URL must be http(s): {}", self.base_url));
        }

        if self.request_timeout.is_zero() {
            return Err("Request timeout cannot be 0".to_string());
        }

        Ok(())
    }

    /// Check the app id required by the rates endpoint. The catalog needs none.
    pub fn validate_credentials(&self) -> Result<(), String> {
        if self.app_id.trim().is_empty() {
            return Err("App id cannot be empty (set CONVERTPAL_APP_ID)".to_string());
        }

        Ok(())
    }
}

/// `latest.json` payload.
#[derive(Debug, Deserialize)]
struct LatestResponse {
    base: Option<CurrencyCode>,
    rates: Rates,
}

/// Decode a `latest.json` body into a validated table.
pub fn parse_latest(body: &str, default_reference: &CurrencyCode) -> FxResult<RateTable> {
    let response: LatestResponse = serde_json::from_str(body)
        .map_err(|e| FxError::MalformedResponse(format!("exchange rate payload: {}", e)))?;
    let reference = response.base.unwrap_or_else(|| default_reference.clone());
    RateTable::from_reference(reference, response.rates)
}

/// Decode a `currencies.json` body (`code -> name`).
pub fn parse_catalog(body: &str) -> FxResult<CurrencyCatalog> {
    let names: HashMap<String, String> = serde_json::from_str(body)
        .map_err(|e| FxError::MalformedResponse(format!("currency catalog payload: {}", e)))?;
    Ok(CurrencyCatalog::from_names(names))
}

/// HTTP client for openexchangerates.org.
pub struct OpenExchangeRatesProvider {
    client: reqwest::Client,
    config: FeedConfig,
}

impl OpenExchangeRatesProvider {
    /// Create a new provider.
    pub fn new(config: FeedConfig) -> FxResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("convertpal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FxError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn get_body(&self, request: reqwest::RequestBuilder) -> FxResult<String> {
        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status));
        }

        response.text().await.map_err(map_transport_error)
    }
}

#[async_trait]
impl RateProvider for OpenExchangeRatesProvider {
    fn name(&self) -> &str {
        "openexchangerates"
    }

    #[instrument(skip(self), fields(provider = self.name()))]
    async fn fetch_rates(&self) -> FxResult<RateTable> {
        let url = format!("{}/latest.json", self.config.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[("app_id", self.config.app_id.as_str())]);

        let body = self.get_body(request).await?;
        let table = parse_latest(&body, &self.config.reference)?;

        debug!(currencies = table.len(), reference = %table.reference(), "Decoded rate table");
        Ok(table)
    }

    #[instrument(skip(self), fields(provider = self.name()))]
    async fn fetch_catalog(&self) -> FxResult<CurrencyCatalog> {
        let url = format!("{}/currencies.json", self.config.base_url);
        let body = self.get_body(self.client.get(&url)).await?;
        let catalog = parse_catalog(&body)?;

        debug!(currencies = catalog.len(), "Decoded currency catalog");
        Ok(catalog)
    }
}

fn map_transport_error(err: reqwest::Error) -> FxError {
    if err.is_decode() {
        return FxError::MalformedResponse(err.to_string());
    }

    let err = err.without_url();
    if err.is_timeout() {
        warn!(error = %err, "Feed request timed out");
        FxError::NetworkUnavailable(format!("request timed out: {}", err))
    } else {
        warn!(error = %err, "Feed request failed");
        FxError::NetworkUnavailable(err.to_string())
    }
}

fn map_status(status: StatusCode) -> FxError {
    let reason = match status {
        StatusCode::UNAUTHORIZED => "invalid app id".to_string(),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            "API request limit exceeded".to_string()
        }
        other => format!("feed returned HTTP {}", other),
    };
    warn!(status = %status, "Feed rejected request");
    FxError::NetworkUnavailable(reason)
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    reference: CurrencyCode,
    rates: dashmap::DashMap<CurrencyCode, f64>,
    names: dashmap::DashMap<String, String>,
    failure: parking_lot::Mutex<Option<FxError>>,
    delay: parking_lot::Mutex<Option<Duration>>,
    hang: std::sync::atomic::AtomicBool,
    rate_fetches: std::sync::atomic::AtomicUsize,
    catalog_fetches: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider quoting against USD.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: CurrencyCode::usd(),
            rates: dashmap::DashMap::new(),
            names: dashmap::DashMap::new(),
            failure: parking_lot::Mutex::new(None),
            delay: parking_lot::Mutex::new(None),
            hang: std::sync::atomic::AtomicBool::new(false),
            rate_fetches: std::sync::atomic::AtomicUsize::new(0),
            catalog_fetches: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Mock preloaded with USD 1.0, EUR 0.85, GBP 0.75.
    pub fn with_sample_rates(name: impl Into<String>) -> Self {
        let provider = Self::new(name);
        provider.set_rate("USD", 1.0);
        provider.set_rate("EUR", 0.85);
        provider.set_rate("GBP", 0.75);
        provider.set_currency("USD", "United States Dollar");
        provider.set_currency("EUR", "Euro");
        provider.set_currency("GBP", "British Pound Sterling");
        provider
    }

    /// Set a rate relative to the reference currency.
    pub fn set_rate(&self, code: &str, rate: f64) {
        self.rates.insert(CurrencyCode::new(code), rate);
    }

    /// Add a catalog entry.
    pub fn set_currency(&self, code: &str, name: &str) {
        self.names.insert(code.to_string(), name.to_string());
    }

    /// Make every subsequent fetch fail with `error`, or succeed again with `None`.
    pub fn fail_with(&self, error: Option<FxError>) {
        *self.failure.lock() = error;
    }

    /// Delay every fetch by `delay` (tokio time).
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Make fetches never complete.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of `fetch_rates` calls so far.
    pub fn rate_fetches(&self) -> usize {
        self.rate_fetches.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of `fetch_catalog` calls so far.
    pub fn catalog_fetches(&self) -> usize {
        self.catalog_fetches.load(std::sync::atomic::Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if self.hang.load(std::sync::atomic::Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self) -> FxResult<RateTable> {
        self.rate_fetches
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }

        let rates: Rates = self
            .rates
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect();
        RateTable::from_reference(self.reference.clone(), rates)
    }

    async fn fetch_catalog(&self) -> FxResult<CurrencyCatalog> {
        self.catalog_fetches
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }

        let names = self
            .names
            .iter()
            .map(|n| (n.key().clone(), n.value().clone()))
            .collect();
        Ok(CurrencyCatalog::from_names(names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_latest() {
        let body = r#"{
            "disclaimer": "Usage subject to terms",
            "timestamp": 1707494400,
            "base": "USD",
            "rates": { "USD": 1, "EUR": 0.85, "GBP": 0.75, "BTC": 0.0000215 }
        }"#;

        let table = parse_latest(body, &CurrencyCode::usd()).unwrap();

        assert_eq!(table.reference(), &CurrencyCode::usd());
        assert_eq!(table.len(), 4);
        assert_eq!(table.get(&CurrencyCode::new("BTC")), Some(0.0000215));
    }

    #[test]
    fn test_parse_latest_without_base_uses_default() {
        let body = r#"{ "rates": { "EUR": 1, "USD": 1.08 } }"#;

        let table = parse_latest(body, &CurrencyCode::eur()).unwrap();

        assert_eq!(table.reference(), &CurrencyCode::eur());
    }

    #[test]
    fn test_parse_latest_malformed() {
        for body in [
            "not json",
            r#"{ "error": true, "status": 401 }"#,
            r#"{ "rates": { "USD": "one" } }"#,
            r#"{ "rates": { "USD": 1, "EUR": -0.5 } }"#,
        ] {
            let result = parse_latest(body, &CurrencyCode::usd());
            assert!(matches!(result, Err(FxError::MalformedResponse(_))), "{body}");
        }
    }

    #[test]
    fn test_parse_catalog() {
        let body = r#"{ "USD": "United States Dollar", "EUR": "Euro", "BTC": "Bitcoin" }"#;

        let catalog = parse_catalog(body).unwrap();
        let names: Vec<&str> = catalog.iter().map(|c| c.name.as_str()).collect();

        assert_eq!(names, vec!["Bitcoin", "Euro", "United States Dollar"]);
    }

    #[test]
    fn test_parse_catalog_malformed() {
        let result = parse_catalog(r#"["USD", "EUR"]"#);
        assert!(matches!(result, Err(FxError::MalformedResponse(_))));
    }

    #[test]
    fn test_map_status() {
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN),
            FxError::NetworkUnavailable(msg) if msg == "API request limit exceeded"
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY),
            FxError::NetworkUnavailable(_)
        ));
    }

    #[test]
    fn test_feed_config_validation() {
        let mut config = FeedConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.validate_credentials().is_err());

        config.app_id = "abc123".to_string();
        assert!(config.validate_credentials().is_ok());

        config.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_mock_provider() {
        let provider = MockRateProvider::with_sample_rates("test");

        let table = provider.fetch_rates().await.unwrap();
        assert_eq!(table.get(&CurrencyCode::eur()), Some(0.85));
        assert_eq!(provider.rate_fetches(), 1);

        provider.fail_with(Some(FxError::NetworkUnavailable("offline".into())));
        assert!(provider.fetch_rates().await.is_err());
        assert_eq!(provider.rate_fetches(), 2);

        let catalog = provider.fetch_catalog().await;
        assert!(matches!(catalog, Err(FxError::NetworkUnavailable(_))));
    }

    #[tokio::test]
    async fn test_provider_builds_client() {
        let config = FeedConfig {
            app_id: "abc123".to_string(),
            ..Default::default()
        };
        let provider = OpenExchangeRatesProvider::new(config).unwrap();
        assert_eq!(provider.name(), "openexchangerates");
    }
}
