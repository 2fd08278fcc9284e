//! ConvertPal FX Engine
//!
//! Exchange rate acquisition, caching, and currency conversion.
//!
//! # Features
//!
//! - Rate table cache with a TTL, single-flight refresh and fetch timeout
//! - Persisted snapshot of the last fetched table
//! - Normalization to any base currency without compounding rounding error
//! - Pairwise conversion with exact identity conversion
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use convertpal_fx::{
//!     CurrencyService, FeedConfig, FileSnapshotStore, Notifier, OpenExchangeRatesProvider,
//!     RateCache, RateCacheConfig,
//! };
//!
//! let provider = Arc::new(OpenExchangeRatesProvider::new(FeedConfig::from_env())?);
//! let store = Arc::new(FileSnapshotStore::new("rates.json"));
//! let cache = RateCache::new(provider.clone(), store, RateCacheConfig::default());
//! let (notifier, notices) = Notifier::channel();
//! let service = CurrencyService::new(provider, cache, notifier);
//!
//! let eur = service.convert(100.0, &"USD".into(), &"EUR".into()).await?;
//! ```

pub mod cache;
pub mod conversion;
pub mod error;
pub mod notice;
pub mod provider;
pub mod service;
pub mod store;
pub mod table;

pub use cache::{CacheEntry, CacheStats, RateCache, RateCacheConfig};
pub use conversion::ConversionEngine;
pub use error::{ErrorKind, FxError, FxResult};
pub use notice::{Notice, Notifier};
pub use provider::{FeedConfig, OpenExchangeRatesProvider, RateProvider};
pub use service::CurrencyService;
pub use store::{FileSnapshotStore, MemorySnapshotStore, Snapshot, SnapshotStore};
pub use table::{RateTable, Rates};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
