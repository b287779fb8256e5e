//! Scraper configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use thiserror::Error;

use mssql_records::MetricsSettings;

/// Hard ceiling on rows fetched per scrape by the ranked queries.
pub const MAX_QUERY_SAMPLE_COUNT_CEILING: u32 = 10_000;

/// Counter columns tracked per ranked query row; sizes the default cache.
const TRACKED_COUNTER_COLUMNS: usize = 8;

/// Configuration validation failures. Fatal for the instance at `start`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No server host configured.
    #[error("server must not be empty")]
    EmptyServer,

    /// Port zero is not addressable.
    #[error("port must be nonzero")]
    ZeroPort,

    /// Sample count above the supported ceiling.
    #[error("max_query_sample_count {0} exceeds ceiling {MAX_QUERY_SAMPLE_COUNT_CEILING}")]
    SampleCountTooLarge(u32),

    /// Top-N larger than the rows that can ever be fetched.
    #[error("top_query_count {top} exceeds max_query_sample_count {max}")]
    TopCountTooLarge {
        /// Configured top-N.
        top: u32,
        /// Configured sample ceiling.
        max: u32,
    },
}

/// Connection parameters for the scrape target.
///
/// TLS and credential mechanics live in the driver behind the connection
/// seam; these are only the addressing fields the scraper validates.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Server host name or address.
    pub server: String,
    /// TCP port, conventionally 1433.
    pub port: u16,
    /// Login user name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Initial database, if any.
    pub database: Option<String>,
}

impl ConnectionConfig {
    /// Create a connection config for `server:port`.
    #[must_use]
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the login credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the initial database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

/// Configuration for one scraper instance.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Restrict scraping to this `@@SERVERNAME`, if set.
    pub instance_name: Option<String>,
    /// Row cap for the ranked top-query and sample queries.
    pub max_query_sample_count: u32,
    /// Lookback window (seconds) for the ranked queries.
    pub lookback_seconds: u32,
    /// Ranked rows retained for emission per scrape.
    pub top_query_count: u32,
    /// Whether the query-text-and-plan log scraper is active.
    pub enable_query_text_and_plan: bool,
    /// Counter cache capacity override; defaults to
    /// `max_query_sample_count * tracked-column-count`.
    pub cache_capacity: Option<NonZeroUsize>,
    /// Per-query execution deadline.
    pub query_timeout: Duration,
    /// Per-metric enable flags.
    pub metrics: MetricsSettings,
    /// Target connection parameters.
    pub connection: ConnectionConfig,
}

impl ScraperConfig {
    /// Create a configuration with defaults for the given target.
    #[must_use]
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            instance_name: None,
            max_query_sample_count: 1000,
            lookback_seconds: 60,
            top_query_count: 200,
            enable_query_text_and_plan: false,
            cache_capacity: None,
            query_timeout: Duration::from_secs(30),
            metrics: MetricsSettings::default(),
            connection,
        }
    }

    /// Set the instance-name filter.
    #[must_use]
    pub fn instance_name(mut self, instance_name: impl Into<String>) -> Self {
        self.instance_name = Some(instance_name.into());
        self
    }

    /// Set the ranked-query row cap.
    #[must_use]
    pub fn max_query_sample_count(mut self, count: u32) -> Self {
        self.max_query_sample_count = count;
        self
    }

    /// Set the ranked-query lookback window.
    #[must_use]
    pub fn lookback_seconds(mut self, seconds: u32) -> Self {
        self.lookback_seconds = seconds;
        self
    }

    /// Set how many ranked rows are emitted per scrape.
    #[must_use]
    pub fn top_query_count(mut self, count: u32) -> Self {
        self.top_query_count = count;
        self
    }

    /// Enable the query-text-and-plan log scraper.
    #[must_use]
    pub fn enable_query_text_and_plan(mut self, enabled: bool) -> Self {
        self.enable_query_text_and_plan = enabled;
        self
    }

    /// Override the counter cache capacity.
    #[must_use]
    pub fn cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Set the per-query execution deadline.
    #[must_use]
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Set the per-metric enable flags.
    #[must_use]
    pub fn metrics(mut self, metrics: MetricsSettings) -> Self {
        self.metrics = metrics;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.server.trim().is_empty() {
            return Err(ConfigError::EmptyServer);
        }
        if self.connection.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.max_query_sample_count > MAX_QUERY_SAMPLE_COUNT_CEILING {
            return Err(ConfigError::SampleCountTooLarge(self.max_query_sample_count));
        }
        if self.top_query_count > self.max_query_sample_count {
            return Err(ConfigError::TopCountTooLarge {
                top: self.top_query_count,
                max: self.max_query_sample_count,
            });
        }
        Ok(())
    }

    /// The counter cache capacity in effect: the override, or one slot per
    /// tracked counter column per sampled row.
    #[must_use]
    pub fn effective_cache_capacity(&self) -> NonZeroUsize {
        if let Some(capacity) = self.cache_capacity {
            return capacity;
        }
        let derived = (self.max_query_sample_count as usize).saturating_mul(TRACKED_COUNTER_COLUMNS);
        NonZeroUsize::new(derived.max(1)).unwrap_or(NonZeroUsize::MIN)
    }
}
