//! # Snapshot Store
//!
//! Captures the row contents of every table once per environment build and
//! restores them before each test. A snapshot is immutable once captured and
//! shared through an `Arc`; the store holds at most one at a time.

use crate::errors::{HarnessError, Result};
use crate::storage::{Row, TableStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Captured rows of one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableData {
    pub name: String,
    pub rows: Vec<Row>,
}

/// Ordered capture of every table's rows at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSnapshot {
    tables: Vec<TableData>,
    captured_at: DateTime<Utc>,
}

impl TableSnapshot {
    /// Build a snapshot from already-read table contents, in the given order
    pub fn new(tables: Vec<TableData>) -> Self {
        Self { tables, captured_at: Utc::now() }
    }

    /// Table names in capture order
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|table| table.name.as_str())
    }

    /// Rows captured for a table, `None` if the table is not part of the snapshot
    pub fn rows(&self, table: &str) -> Option<&[Row]> {
        self.tables.iter().find(|data| data.name == table).map(|data| data.rows.as_slice())
    }

    pub fn tables(&self) -> &[TableData] {
        &self.tables
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.iter().any(|data| data.name == table)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Total number of captured rows across all tables
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|data| data.rows.len()).sum()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Holds the group's snapshot and replays it into the database
pub struct SnapshotStore {
    store: Arc<dyn TableStore>,
    snapshot: Option<Arc<TableSnapshot>>,
    detect_structural_drift: bool,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store, snapshot: None, detect_structural_drift: false }
    }

    /// Fail restores when tables appeared that were not captured
    pub fn with_drift_detection(mut self, enabled: bool) -> Self {
        self.detect_structural_drift = enabled;
        self
    }

    /// The snapshot currently held, if any
    pub fn snapshot(&self) -> Option<&Arc<TableSnapshot>> {
        self.snapshot.as_ref()
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Read every named table in full and hold the result.
    ///
    /// Calling this while a snapshot is held is a usage error: release the
    /// previous snapshot (or tear the environment down) first.
    pub async fn capture(&mut self, table_names: &[String]) -> Result<Arc<TableSnapshot>> {
        if self.snapshot.is_some() {
            return Err(HarnessError::usage(
                "capture",
                "a snapshot is already held; release it before capturing again",
            ));
        }

        let mut tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            let rows = self
                .store
                .fetch_rows(name)
                .await
                .map_err(|e| e.with_context(format!("capture of table '{}'", name)))?;
            debug!(table = %name, rows = rows.len(), "Captured table");
            tables.push(TableData { name: name.clone(), rows });
        }

        let snapshot = Arc::new(TableSnapshot::new(tables));
        info!(
            tables = snapshot.table_count(),
            rows = snapshot.row_count(),
            backend = self.store.backend(),
            "Snapshot captured"
        );

        self.snapshot = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Restore every table from the held snapshot
    pub async fn restore(&self) -> Result<()> {
        let snapshot = self.snapshot.as_ref().ok_or_else(|| {
            HarnessError::usage("restore", "no snapshot is held; capture one first")
        })?;
        self.restore_from(snapshot).await
    }

    /// Restore every table named in `snapshot`.
    ///
    /// Tables are replaced one at a time, each in its own transaction, in
    /// capture order. The first failing table stops the restore and is
    /// reported with the tables already replaced. Tables outside the snapshot
    /// are never touched.
    pub async fn restore_from(&self, snapshot: &TableSnapshot) -> Result<()> {
        let live: BTreeSet<String> = self.store.list_tables().await?.into_iter().collect();

        let missing: Vec<&str> =
            snapshot.table_names().filter(|name| !live.contains(*name)).collect();
        if !missing.is_empty() {
            return Err(HarnessError::setup(format!(
                "tables {:?} from the snapshot no longer exist; rebuild the environment",
                missing
            )));
        }

        let extra: Vec<&String> = live.iter().filter(|name| !snapshot.contains(name)).collect();
        if !extra.is_empty() {
            if self.detect_structural_drift {
                return Err(HarnessError::setup(format!(
                    "tables {:?} were created after the snapshot was captured; rebuild the environment",
                    extra
                )));
            }
            warn!(tables = ?extra, "Tables outside the snapshot are left untouched");
        }

        let mut restored = Vec::with_capacity(snapshot.table_count());
        for table in snapshot.tables() {
            if let Err(e) = self.store.replace_rows(&table.name, &table.rows).await {
                warn!(table = %table.name, restored = ?restored, error = %e, "Restore failed");
                return Err(HarnessError::restore(table.name.clone(), restored, e));
            }
            restored.push(table.name.clone());
        }

        debug!(tables = restored.len(), rows = snapshot.row_count(), "Snapshot restored");
        Ok(())
    }

    /// Drop the held snapshot, returning it
    pub fn release(&mut self) -> Option<Arc<TableSnapshot>> {
        let released = self.snapshot.take();
        if released.is_some() {
            debug!("Snapshot released");
        }
        released
    }
}
