//! # Error Types
//!
//! Error taxonomy for the fixture harness using `thiserror`.

use std::fmt;

/// Custom result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Main error type for the fixture harness
#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    /// Environment build failed, or a snapshot table vanished before restore.
    /// Aborts the whole group.
    #[error("Setup failure: {message}")]
    SetupFailure {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Programmer error: a hook or store operation was invoked out of order
    #[error("Usage error in {operation}: {message}")]
    Usage { operation: String, message: String },

    /// A table could not be restored; tables listed in `restored` were
    /// already replaced when the failure happened
    #[error("Restore failure on table '{table}' after restoring {restored:?}")]
    RestoreFailure {
        table: String,
        restored: Vec<String>,
        #[source]
        source: Box<HarnessError>,
    },

    /// A process-local cache refused to clear
    #[error("Cache failure in '{cache}': {message}")]
    CacheFailure { cache: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },
}

/// How far an error reaches beyond the operation that raised it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The remaining tests of the group must not run
    Group,
    /// Only the current test is failed
    Test,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Group => write!(f, "group"),
            Severity::Test => write!(f, "test"),
        }
    }
}

impl HarnessError {
    /// Create a setup failure
    pub fn setup<S: Into<String>>(message: S) -> Self {
        Self::SetupFailure { message: message.into(), source: None }
    }

    /// Create a setup failure wrapping the error that caused it
    pub fn setup_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::SetupFailure { message: message.into(), source: Some(source) }
    }

    /// Create a usage error for the named operation
    pub fn usage<O: Into<String>, S: Into<String>>(operation: O, message: S) -> Self {
        Self::Usage { operation: operation.into(), message: message.into() }
    }

    /// Create a restore failure
    pub fn restore<T: Into<String>>(table: T, restored: Vec<String>, source: HarnessError) -> Self {
        Self::RestoreFailure { table: table.into(), restored, source: Box::new(source) }
    }

    /// Create a cache failure
    pub fn cache<C: Into<String>, S: Into<String>>(cache: C, message: S) -> Self {
        Self::CacheFailure { cache: cache.into(), message: message.into() }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a database error with context
    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }

    /// Add context to an error
    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        let context = context.into();
        match &mut self {
            HarnessError::Database { context: ctx, .. }
            | HarnessError::Serialization { context: ctx, .. } => {
                *ctx = format!("{}: {}", context, ctx);
            }
            HarnessError::SetupFailure { message, .. }
            | HarnessError::Config { message, .. }
            | HarnessError::Validation { message, .. }
            | HarnessError::CacheFailure { message, .. }
            | HarnessError::Usage { message, .. } => {
                *message = format!("{}: {}", context, message);
            }
            HarnessError::RestoreFailure { .. } => {}
        }
        self
    }

    /// Whether the error ends the group or only the current test
    pub fn severity(&self) -> Severity {
        match self {
            HarnessError::SetupFailure { .. }
            | HarnessError::Usage { .. }
            | HarnessError::Config { .. }
            | HarnessError::Validation { .. } => Severity::Group,
            HarnessError::RestoreFailure { .. }
            | HarnessError::CacheFailure { .. }
            | HarnessError::Database { .. }
            | HarnessError::Serialization { .. } => Severity::Test,
        }
    }

    /// Check if this is a usage (programmer) error
    pub fn is_usage(&self) -> bool {
        matches!(self, HarnessError::Usage { .. })
    }

    /// Check if this is a setup failure
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, HarnessError::SetupFailure { .. })
    }

    /// Check if this is a restore failure
    pub fn is_restore_failure(&self) -> bool {
        matches!(self, HarnessError::RestoreFailure { .. })
    }
}

impl From<sqlx::Error> for HarnessError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for HarnessError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for HarnessError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}
