use std::time::Duration;

use thiserror::Error;

/// Storage key the envelope lives under unless configured otherwise.
pub const DEFAULT_STORAGE_KEY: &str = "auth_state";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Options fixed when a manager is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// How often the poller re-reads storage
    pub interval: Duration,
    /// Entries whose `updatedAt` is older than this read as absent
    pub max_age: Duration,
    pub storage_key: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5_000),
            max_age: Duration::from_secs(30 * 60),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl SyncOptions {
    pub fn new(interval: Duration, max_age: Duration) -> Self {
        Self {
            interval,
            max_age,
            ..Default::default()
        }
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Load options from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let interval = parse_millis("AUTH_SYNC_INTERVAL_MS")?.unwrap_or(defaults.interval);
        let max_age = parse_millis("AUTH_SYNC_MAX_AGE_MS")?.unwrap_or(defaults.max_age);
        let storage_key = std::env::var("AUTH_SYNC_KEY").unwrap_or(defaults.storage_key);

        let options = Self {
            interval,
            max_age,
            storage_key,
        };

        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "poll interval must be greater than zero".to_string(),
            ));
        }

        if self.max_age.is_zero() {
            return Err(ConfigError::ValidationError(
                "max age must be greater than zero".to_string(),
            ));
        }

        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage key cannot be empty".to_string(),
            ));
        }

        if self.max_age < self.interval {
            tracing::warn!(
                interval_ms = self.interval.as_millis() as u64,
                max_age_ms = self.max_age.as_millis() as u64,
                "max age is shorter than the poll interval; \
                 other contexts may never observe a state before it expires"
            );
        }

        Ok(())
    }

    pub(crate) fn max_age_millis(&self) -> i64 {
        i64::try_from(self.max_age.as_millis()).unwrap_or(i64::MAX)
    }
}

fn parse_millis(var: &str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ConfigError::ValidationError(format!("{var} must be milliseconds, got {raw:?}"))),
        Err(_) => Ok(None),
    }
}
