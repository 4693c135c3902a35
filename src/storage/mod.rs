//! # Storage
//!
//! The narrow storage surface the snapshot store and fixtures consume. A
//! [`TableStore`] lists tables, reads a table's rows in a stable order and
//! replaces a table's rows inside a single transaction. SQL dialect details
//! live entirely in the backend implementations.

pub mod pool;
pub mod postgres;
pub mod sqlite;
pub mod value;

pub use pool::{connect, create_postgres_pool, create_sqlite_pool, sanitize_url};
pub use postgres::PostgresTableStore;
pub use sqlite::SqliteTableStore;
pub use value::{Row, Value};

use crate::errors::Result;
use async_trait::async_trait;

/// Table-level access to the database under test
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Short backend name used in logs
    fn backend(&self) -> &'static str;

    /// Names of all user tables, sorted by name
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Read every row of a table.
    ///
    /// Rows are ordered by rowid or primary key where the table has one.
    /// Otherwise they come in storage order, which updates may change.
    async fn fetch_rows(&self, table: &str) -> Result<Vec<Row>>;

    /// Empty a table and insert `rows` in order, all in one transaction.
    ///
    /// Foreign key enforcement is suspended for the transaction and identity
    /// or sequence counters are realigned to the inserted rows. Either every
    /// change commits or the table is left untouched.
    async fn replace_rows(&self, table: &str, rows: &[Row]) -> Result<()>;

    /// Drop a table if it exists
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Execute one raw SQL statement, returning the affected row count
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Number of rows currently in a table
    async fn count_rows(&self, table: &str) -> Result<i64>;

    /// Check whether a table exists
    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.list_tables().await?.iter().any(|name| name == table))
    }
}

/// Quote an SQL identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
