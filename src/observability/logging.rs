//! # Structured Logging
//!
//! Provides the subscriber setup and span macros used by the lifecycle hooks.

use crate::config::LoggingConfig;
use crate::errors::{HarnessError, Result};
use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static LOGGING: OnceCell<()> = OnceCell::new();

/// Create a tracing span for a lifecycle hook or snapshot operation.
///
/// ```rust,ignore
/// let span = harness_span!("before_each", group_id = %group_id);
/// ```
#[macro_export]
macro_rules! harness_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "harness_operation",
            operation = %$operation,
            group_id = tracing::field::Empty
        )
    };
    ($operation:expr, group_id = $group:expr) => {
        tracing::debug_span!(
            "harness_operation",
            operation = %$operation,
            group_id = %$group
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "harness_operation",
            operation = %$operation,
            group_id = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Install a global `tracing` subscriber for the test process.
///
/// `RUST_LOG` wins over the configured level when set. Only the first call
/// installs a subscriber; later calls, or a subscriber installed elsewhere
/// (e.g. by `tracing-test`), are left alone.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            HarnessError::config_with_source(
                format!("Invalid log level '{}'", config.level),
                Box::new(e),
            )
        })?,
    };

    // A subscriber installed elsewhere wins
    LOGGING.get_or_init(|| {
        if config.json {
            let _ = tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_test_writer()
                .try_init();
        } else {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
        }
    });

    Ok(())
}
