//! Test database utilities for integration tests.
//!
//! Each [`TestDatabase`] is a SQLite file in its own temporary directory so
//! that several pooled connections see the same data. The directory and the
//! database file are removed on drop.

#![allow(clippy::duplicate_mod)]

use dbfixture::storage::{self, TableStore};
use dbfixture::DatabaseConfig;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Counter for generating unique database names within a test run
static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_db_name(prefix: &str) -> String {
    let counter = DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}_{}_{}.db", prefix, std::process::id(), counter)
}

/// A file-backed SQLite test database that is deleted on drop
pub struct TestDatabase {
    pub store: Arc<dyn TableStore>,
    pub config: DatabaseConfig,
    path: PathBuf,
    dir: Option<TempDir>,
}

impl TestDatabase {
    /// Create an empty database with a pool of several connections
    pub async fn new(prefix: &str) -> Self {
        let dir = tempfile::Builder::new()
            .prefix("dbfixture-test-")
            .tempdir()
            .expect("create test database directory");
        let path = dir.path().join(unique_db_name(prefix));

        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 4,
            ..Default::default()
        };
        let store = storage::connect(&config).await.expect("create test database pool");

        Self { store, config, path, dir: Some(dir) }
    }

    /// Create an in-memory database with a single pinned connection
    pub async fn in_memory() -> Arc<dyn TableStore> {
        storage::connect(&DatabaseConfig::default()).await.expect("create in-memory database")
    }

    pub fn store(&self) -> Arc<dyn TableStore> {
        Arc::clone(&self.store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the database file after the test (useful for debugging)
    pub fn keep_on_drop(&mut self) -> PathBuf {
        if let Some(dir) = self.dir.take() {
            let kept = dir.into_path();
            eprintln!("Keeping test database in {:?}", kept);
        }
        self.path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_creates_file() {
        let db = TestDatabase::new("test_creates_file").await;
        db.store().execute("CREATE TABLE marker (id INTEGER)").await.unwrap();
        assert!(db.path().exists(), "Database file should exist");
    }

    #[tokio::test]
    async fn test_database_cleanup_on_drop() {
        let path = {
            let db = TestDatabase::new("test_cleanup").await;
            db.store().execute("CREATE TABLE marker (id INTEGER)").await.unwrap();
            db.path().to_path_buf()
        };
        assert!(!path.exists(), "Database file should be removed after drop");
    }
}
