//! CLI configuration.

use std::path::PathBuf;

use convertpal_fx::store::SNAPSHOT_KEY;
use convertpal_fx::{FeedConfig, RateCacheConfig};

/// Main CLI configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Rate feed configuration.
    pub feed: FeedConfig,
    /// Cache TTL and fetch timeout.
    pub cache: RateCacheConfig,
    /// File holding the persisted rate snapshot.
    pub cache_path: PathBuf,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            cache: RateCacheConfig::default(),
            cache_path: PathBuf::from(".convertpal").join(format!("{}.json", SNAPSHOT_KEY)),
            log_level: "warn".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self {
            feed: FeedConfig::from_env(),
            cache: RateCacheConfig::from_env(),
            ..Self::default()
        };

        if let Ok(path) = std::env::var("CONVERTPAL_CACHE_PATH") {
            config.cache_path = PathBuf::from(path);
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration. The feed app id is checked separately, only
    /// by commands that fetch rates.
    pub fn validate(&self) -> Result<(), String> {
        self.feed.validate()?;
        self.cache.validate()?;

        if self.cache_path.as_os_str().is_empty() {
            return Err("Cache path cannot be empty".to_string());
        }

        if self.log_level.trim().is_empty() {
            return Err("Log level cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.feed.app_id = "test-app-id".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(config.cache_path.ends_with("exchangeRatesCache.json"));
        assert_eq!(config.cache.ttl, Duration::minutes(30));
    }

    #[test]
    fn test_missing_app_id_only_fails_credentials() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let err = config.feed.validate_credentials().unwrap_err();
        assert!(err.contains("CONVERTPAL_APP_ID"));
        assert!(valid_config().feed.validate_credentials().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = valid_config();
        config.cache.ttl = Duration::zero();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.cache_path = PathBuf::new();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.feed.base_url = "ftp://rates.example".to_string();
        assert!(config.validate().is_err());
    }
}
