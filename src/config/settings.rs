//! # Configuration Settings
//!
//! Defines the configuration structure for the fixture harness.

use crate::errors::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Harness configuration loaded once per test binary
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Optional environment build steps for the default group
    pub environment: EnvironmentConfig,

    /// Lifecycle coordinator behaviour
    pub lifecycle: LifecycleConfig,

    /// Logging configuration
    #[validate(nested)]
    pub logging: LoggingConfig,
}

impl HarnessConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(HarnessError::from)?;
        self.database.validate_custom()
    }
}

/// Optional, expensive steps of an environment build.
///
/// All steps are disabled by default so groups that do not need them build
/// fast. A group supplies its own value to `before_group`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Load translation catalogs during the build
    pub load_translations: bool,

    /// Provision a super-user credential during the build
    pub create_super_user: bool,

    /// Install auxiliary pluggable components during the build
    pub configure_components: bool,
}

impl EnvironmentConfig {
    /// Configuration with every optional step disabled
    pub const fn minimal() -> Self {
        Self { load_translations: false, create_super_user: false, configure_components: false }
    }

    /// Enable or disable translation loading
    pub const fn with_translations(mut self, enabled: bool) -> Self {
        self.load_translations = enabled;
        self
    }

    /// Enable or disable super-user provisioning
    pub const fn with_super_user(mut self, enabled: bool) -> Self {
        self.create_super_user = enabled;
        self
    }

    /// Enable or disable auxiliary component installation
    pub const fn with_components(mut self, enabled: bool) -> Self {
        self.configure_components = enabled;
        self
    }
}

/// Lifecycle coordinator configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Compare the live table set with the snapshot on every restore and
    /// fail when tables appeared since capture
    pub detect_structural_drift: bool,

    /// Rebuild the environment before every test instead of restoring the
    /// snapshot. For groups whose tests alter table structure.
    pub rebuild_each_test: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
        }
    }
}

impl DatabaseConfig {
    /// Configuration for the given URL with default pool settings
    pub fn with_url<S: Into<String>>(url: S) -> Self {
        Self { url: url.into(), ..Default::default() }
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Check if this is a SQLite configuration
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }

    /// Check if this is an in-memory SQLite database.
    ///
    /// Each connection to `:memory:` opens a distinct database, so these
    /// pools are pinned to a single connection that never expires.
    pub fn is_in_memory(&self) -> bool {
        self.is_sqlite() && (self.url.contains(":memory:") || self.url.contains("mode=memory"))
    }

    /// Check if this is a PostgreSQL configuration
    pub fn is_postgresql(&self) -> bool {
        self.url.starts_with("postgresql://") || self.url.starts_with("postgres://")
    }

    /// Checks the validator crate cannot express
    pub(crate) fn validate_custom(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(HarnessError::validation_field("database URL cannot be empty", "url"));
        }

        if !self.is_sqlite() && !self.is_postgresql() {
            return Err(HarnessError::validation_field(
                "database URL must start with 'sqlite:', 'postgres://' or 'postgresql://'",
                "url",
            ));
        }

        if self.max_connections == 0 {
            return Err(HarnessError::validation_field(
                "max_connections must be greater than 0",
                "max_connections",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(HarnessError::validation_field(
                "min_connections cannot be greater than max_connections",
                "min_connections",
            ));
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub level: String,

    /// Enable JSON structured logging
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "warn".to_string(), json: false }
    }
}
