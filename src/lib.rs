//! # dbfixture
//!
//! Database test harness that builds an expensive environment once per
//! group of tests and restores every table from an in-memory snapshot before
//! each test, so tests cannot observe each other's row changes.
//!
//! ## Architecture
//!
//! ```text
//! LifecycleCoordinator → EnvironmentFixture → TableStore (SQLite / PostgreSQL)
//!          ↓                     ↓
//!    SnapshotStore        CacheRegistry
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use dbfixture::{
//!     storage, EnvironmentConfig, HarnessConfig, LifecycleCoordinator, Result, SqlFixture,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = HarnessConfig::load()?;
//!     let store = storage::connect(&config.database).await?;
//!     let fixture = SqlFixture::new(store)
//!         .with_schema("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)");
//!
//!     let mut coordinator = LifecycleCoordinator::with_options(fixture, config.lifecycle);
//!     coordinator.before_group(EnvironmentConfig::minimal()).await?;
//!
//!     coordinator.before_each().await?;
//!     coordinator.store().execute("INSERT INTO users (name) VALUES ('ada')").await?;
//!     coordinator.after_each()?;
//!
//!     coordinator.after_group()
//! }
//! ```

pub mod config;
pub mod errors;
pub mod fixture;
pub mod lifecycle;
pub mod observability;
pub mod snapshot;
pub mod storage;

// Re-export commonly used types and traits
pub use config::{DatabaseConfig, EnvironmentConfig, HarnessConfig, LifecycleConfig, LoggingConfig};
pub use errors::{HarnessError, Result, Severity};
pub use fixture::{
    CacheRegistry, EnvironmentFixture, InMemoryCache, MemoCache, SetupStep, SqlFixture, SqlStep,
};
pub use lifecycle::{LifecycleCoordinator, LifecycleState, TestFailure, TestResult};
pub use observability::init_logging;
pub use snapshot::{SnapshotStore, TableSnapshot};
pub use storage::{Row, TableStore, Value};

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
