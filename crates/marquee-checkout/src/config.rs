//! # Checkout Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MARQUEE_DB_PATH=/var/lib/marquee/checkout.db                       │
//! │     MARQUEE_LEASE_TTL_SECS=600                                         │
//! │     MARQUEE_REAP_INTERVAL_SECS=30                                      │
//! │     MARQUEE_LOG=info,marquee=debug                                     │
//! │     MARQUEE_RETRY_MAX_ATTEMPTS=5                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/marquee/checkout.toml (Linux)                            │
//! │     ~/Library/Application Support/com.marquee.checkout/... (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/marquee/checkout.db"
//! max_connections = 8
//! busy_timeout_ms = 5000
//!
//! [leases]
//! default_ttl_secs = 900
//! max_ttl_secs = 7200
//! reap_interval_secs = 30
//!
//! [retry]
//! max_attempts = 5
//! initial_backoff_ms = 20
//! max_backoff_ms = 500
//!
//! [logging]
//! filter = "info,marquee=debug,sqlx=warn"
//! format = "compact"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use marquee_core::{DEFAULT_LEASE_TTL_SECS, MAX_LEASE_TTL_SECS};
use marquee_db::DbConfig;

use crate::error::{CheckoutError, CheckoutResult};

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file; defaults to `checkout.db` in the platform data dir.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long a writer waits for the SQLite write lock (milliseconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    8
}
fn default_min_connections() -> u32 {
    1
}
fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Lease Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseSettings {
    /// TTL used when a reserve request names none.
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: i64,

    /// Upper bound a reserve request may ask for.
    #[serde(default = "default_max_ttl")]
    pub max_ttl_secs: i64,

    /// How often the reaper sweeps expired leases.
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

fn default_ttl() -> i64 {
    DEFAULT_LEASE_TTL_SECS
}
fn default_max_ttl() -> i64 {
    MAX_LEASE_TTL_SECS
}
fn default_reap_interval() -> u64 {
    30
}

impl Default for LeaseSettings {
    fn default() -> Self {
        LeaseSettings {
            default_ttl_secs: default_ttl(),
            max_ttl_secs: default_max_ttl(),
            reap_interval_secs: default_reap_interval(),
        }
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Backoff for transient store errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts including the first one. 1 disables retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff() -> u64 {
    20
}
fn default_max_backoff() -> u64 {
    500
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

// =============================================================================
// Logging Settings
// =============================================================================

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(CheckoutError::InvalidConfig(format!(
                "Unknown log format: '{}'. Valid options: compact, pretty",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive; `RUST_LOG` still wins when set.
    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_filter() -> String {
    "info,marquee=debug,sqlx=warn".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: default_filter(),
            format: LogFormat::default(),
        }
    }
}

// =============================================================================
// Main Checkout Configuration
// =============================================================================

/// Complete checkout configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub leases: LeaseSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl CheckoutConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (checkout.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> CheckoutResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading checkout config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load checkout config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> CheckoutResult<()> {
        if self.database.max_connections == 0 {
            return Err(CheckoutError::InvalidConfig("max_connections must be greater than 0".into()));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(CheckoutError::InvalidConfig(
                "min_connections cannot exceed max_connections".into(),
            ));
        }
        if self.leases.max_ttl_secs <= 0 {
            return Err(CheckoutError::InvalidConfig("max_ttl_secs must be greater than 0".into()));
        }
        if self.leases.default_ttl_secs <= 0 || self.leases.default_ttl_secs > self.leases.max_ttl_secs {
            return Err(CheckoutError::InvalidConfig(format!(
                "default_ttl_secs must be between 1 and {}",
                self.leases.max_ttl_secs
            )));
        }
        if self.leases.reap_interval_secs == 0 {
            return Err(CheckoutError::InvalidConfig("reap_interval_secs must be greater than 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(CheckoutError::InvalidConfig("retry max_attempts must be at least 1".into()));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(CheckoutError::InvalidConfig(
                "initial_backoff_ms cannot exceed max_backoff_ms".into(),
            ));
        }
        Ok(())
    }

    /// Applies `MARQUEE_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("MARQUEE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(ttl) = lookup("MARQUEE_LEASE_TTL_SECS") {
            match ttl.parse::<i64>() {
                Ok(secs) => self.leases.default_ttl_secs = secs,
                Err(_) => warn!(value = %ttl, "Ignoring invalid MARQUEE_LEASE_TTL_SECS"),
            }
        }

        if let Some(interval) = lookup("MARQUEE_REAP_INTERVAL_SECS") {
            match interval.parse::<u64>() {
                Ok(secs) => self.leases.reap_interval_secs = secs,
                Err(_) => warn!(value = %interval, "Ignoring invalid MARQUEE_REAP_INTERVAL_SECS"),
            }
        }

        if let Some(filter) = lookup("MARQUEE_LOG") {
            self.logging.filter = filter;
        }

        if let Some(attempts) = lookup("MARQUEE_RETRY_MAX_ATTEMPTS") {
            match attempts.parse::<u32>() {
                Ok(n) => self.retry.max_attempts = n,
                Err(_) => warn!(value = %attempts, "Ignoring invalid MARQUEE_RETRY_MAX_ATTEMPTS"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "marquee", "checkout").map(|dirs| dirs.config_dir().join("checkout.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// The database file, falling back to the platform data directory.
    pub fn database_path(&self) -> CheckoutResult<PathBuf> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }

        let dirs = directories::ProjectDirs::from("com", "marquee", "checkout")
            .ok_or_else(|| CheckoutError::InvalidConfig("Could not determine app data directory".into()))?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Ok(data_dir.join("checkout.db"))
    }

    pub fn db_config(&self) -> CheckoutResult<DbConfig> {
        Ok(DbConfig::new(self.database_path()?)
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms)))
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.leases.reap_interval_secs)
    }
}
