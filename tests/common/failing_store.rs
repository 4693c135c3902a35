//! A [`TableStore`] wrapper that fails restores of chosen tables on demand.

#![allow(clippy::duplicate_mod)]

use async_trait::async_trait;
use dbfixture::storage::{Row, TableStore};
use dbfixture::{HarnessError, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Delegates to an inner store, failing `replace_rows` for armed tables
pub struct FailingStore {
    inner: Arc<dyn TableStore>,
    failing: Mutex<HashSet<String>>,
    armed: AtomicBool,
    replaced: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn TableStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            armed: AtomicBool::new(false),
            replaced: AtomicUsize::new(0),
        }
    }

    /// Make every following `replace_rows` on `table` fail
    pub fn fail_table(&self, table: &str) {
        self.failing.lock().unwrap().insert(table.to_string());
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Stop injecting failures
    pub fn disarm(&self) {
        self.failing.lock().unwrap().clear();
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Number of successful `replace_rows` calls
    pub fn replaced(&self) -> usize {
        self.replaced.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TableStore for FailingStore {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        self.inner.list_tables().await
    }

    async fn fetch_rows(&self, table: &str) -> Result<Vec<Row>> {
        self.inner.fetch_rows(table).await
    }

    async fn replace_rows(&self, table: &str, rows: &[Row]) -> Result<()> {
        let should_fail =
            self.armed.load(Ordering::SeqCst) && self.failing.lock().unwrap().contains(table);
        if should_fail {
            return Err(HarnessError::validation_field("injected restore failure", table));
        }
        self.inner.replace_rows(table, rows).await?;
        self.replaced.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.inner.drop_table(table).await
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.inner.execute(sql).await
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        self.inner.count_rows(table).await
    }
}
