//! FX rate caching with TTL support.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Duration;
use convertpal_common::time::{age, constants};
use convertpal_common::{Clock, DurationExt, SystemClock, Timestamp};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::error::{FxError, FxResult};
use crate::provider::RateProvider;
use crate::store::{Snapshot, SnapshotStore};
use crate::table::RateTable;

/// A fetched rate table and the time it was fetched.
///
/// Entries are immutable; a refresh replaces the whole entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub table: RateTable,
    pub fetched_at: Timestamp,
}

impl CacheEntry {
    pub fn new(table: RateTable, fetched_at: Timestamp) -> Self {
        Self { table, fetched_at }
    }

    pub fn age(&self, now: Timestamp) -> Duration {
        age(self.fetched_at, now)
    }

    /// Fresh while strictly younger than `ttl`.
    pub fn is_fresh(&self, now: Timestamp, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// Configuration for rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// Maximum age of a served table.
    pub ttl: Duration,
    /// Upper bound on one feed fetch.
    pub fetch_timeout: Duration,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            ttl: constants::rate_ttl(),
            fetch_timeout: constants::fetch_timeout(),
        }
    }
}

impl RateCacheConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ttl) = std::env::var("CONVERTPAL_CACHE_TTL_SECS") {
            if let Some(ttl) = parse_seconds(&ttl) {
                config.ttl = ttl;
            }
        }

        if let Ok(timeout) = std::env::var("CONVERTPAL_FETCH_TIMEOUT_SECS") {
            if let Some(timeout) = parse_seconds(&timeout) {
                config.fetch_timeout = timeout;
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl <= Duration::zero() {
            return Err("Cache TTL must be positive".to_string());
        }

        if self.fetch_timeout <= Duration::zero() {
            return Err("Fetch timeout must be positive".to_string());
        }

        Ok(())
    }
}

/// Whole seconds as a duration. Unparsable or out-of-range values are ignored.
fn parse_seconds(raw: &str) -> Option<Duration> {
    let secs: i64 = raw.trim().parse().ok()?;
    let duration = Duration::try_seconds(secs);
    if duration.is_none() {
        warn!(value = raw, "Ignoring out-of-range duration");
    }
    duration
}

type RefreshFuture = Shared<BoxFuture<'static, FxResult<Arc<CacheEntry>>>>;

#[derive(Default)]
struct Counters {
    cache_hits: AtomicU64,
    fetches_attempted: AtomicU64,
    fetches_succeeded: AtomicU64,
    fetches_failed: AtomicU64,
    refreshes_suppressed: AtomicU64,
    coalesced_waiters: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Inner {
    provider: Arc<dyn RateProvider>,
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    config: RateCacheConfig,
    entry: RwLock<Option<Arc<CacheEntry>>>,
    in_flight: Mutex<Option<RefreshFuture>>,
    counters: Counters,
}

/// Owner of the current rate table.
///
/// Cloning is cheap and every clone shares the same state. Refreshes run on a
/// spawned tokio task, so a Tokio runtime must be active when one starts.
#[derive(Clone)]
pub struct RateCache {
    inner: Arc<Inner>,
}

impl RateCache {
    /// Create a cache using the system clock.
    pub fn new(
        provider: Arc<dyn RateProvider>,
        store: Arc<dyn SnapshotStore>,
        config: RateCacheConfig,
    ) -> Self {
        Self::with_clock(provider, store, config, Arc::new(SystemClock::new()))
    }

    /// Create a cache with an explicit clock.
    pub fn with_clock(
        provider: Arc<dyn RateProvider>,
        store: Arc<dyn SnapshotStore>,
        config: RateCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                clock,
                config,
                entry: RwLock::new(None),
                in_flight: Mutex::new(None),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &RateCacheConfig {
        &self.inner.config
    }

    /// Load the persisted snapshot into memory.
    ///
    /// A snapshot that fails to decode is reported as `MalformedResponse`
    /// and the cache stays as it was.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> FxResult<Option<Arc<CacheEntry>>> {
        let Some(snapshot) = self.inner.store.load().await? else {
            debug!("No persisted rate snapshot");
            return Ok(None);
        };

        let restored = Arc::new(snapshot.into_entry()?);
        let mut slot = self.inner.entry.write();
        match slot.as_ref() {
            Some(current) if current.fetched_at >= restored.fetched_at => {
                debug!("In-memory rates are newer than the snapshot");
                Ok(Some(current.clone()))
            }
            _ => {
                info!(
                    fetched_at = %restored.fetched_at,
                    currencies = restored.table.len(),
                    "Restored rate snapshot"
                );
                *slot = Some(restored.clone());
                Ok(Some(restored))
            }
        }
    }

    /// Get the rate table, fetching it when the cached one is missing or stale.
    ///
    /// With `force_refresh`, a still-fresh table is not refetched; the call
    /// fails with `RefreshSuppressed` instead. A failed fetch never falls back
    /// to stale data.
    #[instrument(skip(self))]
    pub async fn get_rates(&self, force_refresh: bool) -> FxResult<RateTable> {
        let now = self.inner.clock.now();
        let ttl = self.inner.config.ttl;

        if let Some(entry) = self.current() {
            if entry.is_fresh(now, ttl) {
                if force_refresh {
                    return Err(self.suppress(&entry, now));
                }

                Counters::bump(&self.inner.counters.cache_hits);
                debug!(fetched_at = %entry.fetched_at, "Cache hit");
                return Ok(entry.table.clone());
            }
            debug!(fetched_at = %entry.fetched_at, "Cache entry expired");
        } else {
            debug!("Cache miss");
        }

        let entry = self.refresh(force_refresh).await?;
        Ok(entry.table.clone())
    }

    /// The current entry regardless of age.
    pub fn current(&self) -> Option<Arc<CacheEntry>> {
        self.inner.entry.read().clone()
    }

    /// When the current entry was fetched.
    pub fn last_updated(&self) -> Option<Timestamp> {
        self.current().map(|e| e.fetched_at)
    }

    /// Remaining freshness of the current entry, zero once stale.
    pub fn time_until_stale(&self) -> Option<Duration> {
        let now = self.inner.clock.now();
        self.current().map(|entry| {
            let remaining = self.inner.config.ttl - entry.age(now);
            remaining.max(Duration::zero())
        })
    }

    /// Whether a refresh is currently running.
    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            fetches_attempted: c.fetches_attempted.load(Ordering::Relaxed),
            fetches_succeeded: c.fetches_succeeded.load(Ordering::Relaxed),
            fetches_failed: c.fetches_failed.load(Ordering::Relaxed),
            refreshes_suppressed: c.refreshes_suppressed.load(Ordering::Relaxed),
            coalesced_waiters: c.coalesced_waiters.load(Ordering::Relaxed),
            last_updated: self.last_updated(),
        }
    }

    fn suppress(&self, entry: &CacheEntry, now: Timestamp) -> FxError {
        Counters::bump(&self.inner.counters.refreshes_suppressed);
        let remaining = self.inner.config.ttl - entry.age(now);
        let retry_after_secs = (remaining.num_milliseconds() + 999) / 1000;
        info!(retry_after_secs, "Refresh suppressed, rates still fresh");
        FxError::RefreshSuppressed {
            fetched_at: entry.fetched_at,
            retry_after_secs,
        }
    }

    /// Join the running refresh, or start one.
    async fn refresh(&self, force_refresh: bool) -> FxResult<Arc<CacheEntry>> {
        let refresh = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(running) => {
                    Counters::bump(&self.inner.counters.coalesced_waiters);
                    debug!("Joining in-flight refresh");
                    running.clone()
                }
                None => {
                    // A refresh may have landed between the caller's check and here.
                    let now = self.inner.clock.now();
                    if let Some(entry) = self.fresh_entry(now) {
                        if force_refresh {
                            return Err(self.suppress(&entry, now));
                        }
                        return Ok(entry);
                    }
                    let refresh = self.spawn_refresh();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }

    fn fresh_entry(&self, now: Timestamp) -> Option<Arc<CacheEntry>> {
        self.current()
            .filter(|entry| entry.is_fresh(now, self.inner.config.ttl))
    }

    fn spawn_refresh(&self) -> RefreshFuture {
        let cache = self.clone();
        let task = tokio::spawn(async move {
            let _release = ReleaseOnDrop(&cache.inner);
            cache.fetch_and_store().await
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(FxError::Internal(format!("refresh task failed: {}", e))))
        }
        .boxed()
        .shared()
    }

    async fn fetch_and_store(&self) -> FxResult<Arc<CacheEntry>> {
        let inner = &self.inner;
        Counters::bump(&inner.counters.fetches_attempted);
        info!(provider = inner.provider.name(), "Fetching exchange rates");

        let timeout = inner.config.fetch_timeout;
        let table = match tokio::time::timeout(timeout.as_std(), inner.provider.fetch_rates()).await
        {
            Ok(Ok(table)) => table,
            Ok(Err(e)) => {
                Counters::bump(&inner.counters.fetches_failed);
                warn!(error = %e, code = e.error_code(), "Rate fetch failed");
                return Err(e);
            }
            Err(_) => {
                Counters::bump(&inner.counters.fetches_failed);
                warn!(timeout_secs = timeout.num_seconds(), "Rate fetch timed out");
                return Err(FxError::NetworkUnavailable(format!(
                    "rate fetch timed out after {}s",
                    timeout.num_seconds()
                )));
            }
        };

        let entry = Arc::new(CacheEntry::new(table, inner.clock.now()));
        *inner.entry.write() = Some(entry.clone());
        Counters::bump(&inner.counters.fetches_succeeded);
        info!(
            currencies = entry.table.len(),
            fetched_at = %entry.fetched_at,
            "Exchange rates refreshed"
        );

        if let Err(e) = inner.store.save(&Snapshot::from(entry.as_ref())).await {
            warn!(error = %e, "Failed to persist rate snapshot");
        }

        Ok(entry)
    }
}

/// Clears the single-flight slot when the refresh task ends, even on panic.
struct ReleaseOnDrop<'a>(&'a Inner);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.in_flight.lock().take();
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub cache_hits: u64,
    pub fetches_attempted: u64,
    pub fetches_succeeded: u64,
    pub fetches_failed: u64,
    pub refreshes_suppressed: u64,
    pub coalesced_waiters: u64,
    pub last_updated: Option<Timestamp>,
}
