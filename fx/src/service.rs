//! Consumer-facing currency service.

use std::sync::Arc;

use convertpal_common::{CurrencyCatalog, CurrencyCode, DurationExt};
use tracing::{debug, info, instrument};

use crate::cache::RateCache;
use crate::conversion::ConversionEngine;
use crate::error::{FxError, FxResult};
use crate::notice::Notifier;
use crate::provider::RateProvider;
use crate::table::RateTable;

/// Entry point for presentation layers.
///
/// Every failure is returned to the caller and also published through the
/// [`Notifier`].
pub struct CurrencyService {
    provider: Arc<dyn RateProvider>,
    cache: RateCache,
    engine: ConversionEngine,
    notifier: Notifier,
}

impl CurrencyService {
    pub fn new(provider: Arc<dyn RateProvider>, cache: RateCache, notifier: Notifier) -> Self {
        Self {
            provider,
            cache,
            engine: ConversionEngine::new(),
            notifier,
        }
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    /// Fetch the currency catalog. Never cached.
    #[instrument(skip(self))]
    pub async fn get_currency_catalog(&self) -> FxResult<CurrencyCatalog> {
        let timeout = self.cache.config().fetch_timeout;
        let result = match tokio::time::timeout(timeout.as_std(), self.provider.fetch_catalog()).await
        {
            Ok(result) => result,
            Err(_) => Err(FxError::NetworkUnavailable(format!(
                "catalog fetch timed out after {}s",
                timeout.num_seconds()
            ))),
        };

        if let Ok(catalog) = &result {
            info!(currencies = catalog.len(), "Fetched currency catalog");
        }
        self.report(result)
    }

    /// Rate table in the feed's reference currency.
    pub async fn get_rates(&self, force_refresh: bool) -> FxResult<RateTable> {
        let result = self.cache.get_rates(force_refresh).await;
        self.report(result)
    }

    /// Rate table re-based so that `base` is worth 1.0.
    #[instrument(skip(self, base), fields(base = %base))]
    pub async fn rates_in(&self, base: &CurrencyCode, force_refresh: bool) -> FxResult<RateTable> {
        let result = match self.cache.get_rates(force_refresh).await {
            Ok(table) => self.engine.normalize(&table, base),
            Err(e) => Err(e),
        };
        self.report(result)
    }

    /// Convert `amount` of `from` into `to` with the current rates.
    #[instrument(skip(self, from, to), fields(from = %from, to = %to))]
    pub async fn convert(&self, amount: f64, from: &CurrencyCode, to: &CurrencyCode) -> FxResult<f64> {
        let result = match self.cache.get_rates(false).await {
            Ok(table) => self.engine.convert(amount, from, to, &table),
            Err(e) => Err(e),
        };

        if let Ok(value) = &result {
            debug!(amount, value, "Converted amount");
        }
        self.report(result)
    }

    /// Convert `amount` of `from` into every currency with a known rate.
    #[instrument(skip(self, from), fields(from = %from))]
    pub async fn convert_to_all(
        &self,
        amount: f64,
        from: &CurrencyCode,
    ) -> FxResult<Vec<(CurrencyCode, f64)>> {
        let result = match self.cache.get_rates(false).await {
            Ok(table) => self.engine.convert_all(amount, from, &table),
            Err(e) => Err(e),
        };
        self.report(result)
    }

    fn report<T>(&self, result: FxResult<T>) -> FxResult<T> {
        if let Err(e) = &result {
            self.notifier.report(e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RateCacheConfig;
    use crate::error::ErrorKind;
    use crate::notice::Notice;
    use crate::provider::MockRateProvider;
    use crate::store::MemorySnapshotStore;
    use chrono::Duration;
    use convertpal_common::ManualClock;
    use std::time::Duration as StdDuration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn setup() -> (
        CurrencyService,
        Arc<MockRateProvider>,
        Arc<ManualClock>,
        UnboundedReceiver<Notice>,
    ) {
        let provider = Arc::new(MockRateProvider::with_sample_rates("test"));
        let clock = Arc::new(ManualClock::starting_now());
        let cache = RateCache::with_clock(
            provider.clone(),
            Arc::new(MemorySnapshotStore::new()),
            RateCacheConfig::default(),
            clock.clone(),
        );
        let (notifier, rx) = Notifier::channel();
        let service = CurrencyService::new(provider.clone(), cache, notifier);
        (service, provider, clock, rx)
    }

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::new(s)
    }

    #[tokio::test]
    async fn test_convert_scenarios() {
        let (service, provider, _, mut rx) = setup();

        assert_eq!(service.convert(100.0, &code("USD"), &code("EUR")).await.unwrap(), 85.0);
        let cross = service.convert(100.0, &code("EUR"), &code("GBP")).await.unwrap();
        assert!((cross - 88.235294).abs() < 1e-6);
        assert_eq!(service.convert(42.5, &code("GBP"), &code("GBP")).await.unwrap(), 42.5);

        assert_eq!(provider.rate_fetches(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_amount_is_reported() {
        let (service, _, _, mut rx) = setup();

        let result = service.convert(-5.0, &code("USD"), &code("EUR")).await;

        assert!(matches!(result, Err(FxError::InvalidAmount(_))));
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.kind, ErrorKind::InvalidAmount);
    }

    #[tokio::test]
    async fn test_missing_rate_is_reported() {
        let (service, _, _, mut rx) = setup();

        let result = service.convert(50.0, &code("USD"), &code("XYZ")).await;

        assert!(matches!(result, Err(FxError::RateUnavailable(_))));
        assert_eq!(rx.recv().await.unwrap().kind, ErrorKind::RateUnavailable);
    }

    #[tokio::test]
    async fn test_suppressed_refresh_is_reported() {
        let (service, provider, clock, mut rx) = setup();
        service.get_rates(false).await.unwrap();
        clock.advance(Duration::seconds(60));

        let result = service.get_rates(true).await;

        assert!(matches!(result, Err(FxError::RefreshSuppressed { .. })));
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.title, "Cannot be refreshed");
        assert_eq!(provider.rate_fetches(), 1);
    }

    #[tokio::test]
    async fn test_rates_in_selected_currency() {
        let (service, _, _, _rx) = setup();

        let eur = service.rates_in(&code("EUR"), false).await.unwrap();

        assert_eq!(eur.base(), &code("EUR"));
        assert_eq!(eur.get(&code("EUR")), Some(1.0));
        assert_eq!(eur.get(&code("USD")), Some(1.0 / 0.85));

        let gbp = service.rates_in(&code("GBP"), false).await.unwrap();
        assert_eq!(gbp.get(&code("USD")), Some(1.0 / 0.75));
    }

    #[tokio::test]
    async fn test_convert_to_all() {
        let (service, _, _, _rx) = setup();

        let results = service.convert_to_all(10.0, &code("EUR")).await.unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.contains(&(code("EUR"), 10.0)));
    }

    #[tokio::test]
    async fn test_catalog_is_not_cached() {
        let (service, provider, _, _rx) = setup();

        let catalog = service.get_currency_catalog().await.unwrap();
        service.get_currency_catalog().await.unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.first().unwrap().code, code("GBP"));
        assert_eq!(provider.catalog_fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_timeout_is_reported() {
        let (service, provider, _, mut rx) = setup();
        provider.set_delay(Some(StdDuration::from_secs(60)));

        let result = service.get_currency_catalog().await;

        assert!(matches!(result, Err(FxError::NetworkUnavailable(_))));
        assert_eq!(rx.recv().await.unwrap().title, "No Internet connection");
    }

    #[tokio::test]
    async fn test_network_failure_is_reported() {
        let (service, provider, _, mut rx) = setup();
        provider.fail_with(Some(FxError::NetworkUnavailable("offline".into())));

        let result = service.convert(1.0, &code("USD"), &code("EUR")).await;

        assert!(matches!(result, Err(FxError::NetworkUnavailable(_))));
        assert_eq!(rx.recv().await.unwrap().kind, ErrorKind::NetworkUnavailable);
    }
}
