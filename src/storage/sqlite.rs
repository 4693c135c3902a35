//! SQLite implementation of [`TableStore`].

use crate::errors::{HarnessError, Result};
use crate::storage::{quote_ident, Row, TableStore, Value};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqliteRow};
use sqlx::{Column, Row as _, Sqlite, TypeInfo, ValueRef};

/// Table store over a SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteTableStore {
    pool: SqlitePool,
}

/// How the rows of a table are keyed
#[derive(Debug, Clone, PartialEq, Eq)]
enum RowKey {
    Rowid,
    /// `WITHOUT ROWID` table keyed by its primary key columns, in key order
    PrimaryKey(Vec<String>),
}

impl RowKey {
    fn order_by(&self) -> String {
        match self {
            RowKey::Rowid => "rowid".to_string(),
            RowKey::PrimaryKey(columns) => {
                columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
            }
        }
    }
}

/// Storage class of a SQLite value, read before decoding it
enum StorageClass {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl SqliteTableStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn row_key(&self, table: &str) -> Result<RowKey> {
        let sql: Option<String> =
            sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| HarnessError::database(e, format!("Failed to inspect table '{}'", table)))?
                .flatten();

        let without_rowid = sql
            .map(|sql| {
                let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ");
                normalized.to_uppercase().contains("WITHOUT ROWID")
            })
            .unwrap_or(false);
        if !without_rowid {
            return Ok(RowKey::Rowid);
        }

        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk")
                .bind(table)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    HarnessError::database(e, format!("Failed to read primary key of '{}'", table))
                })?;
        Ok(RowKey::PrimaryKey(columns))
    }

    fn decode_row(row: &SqliteRow) -> Result<Row> {
        let mut decoded = Row::new();
        for (index, column) in row.columns().iter().enumerate() {
            let class = {
                let raw = row.try_get_raw(index)?;
                if raw.is_null() {
                    StorageClass::Null
                } else {
                    match raw.type_info().name() {
                        "INTEGER" | "BOOLEAN" => StorageClass::Integer,
                        "REAL" => StorageClass::Real,
                        "BLOB" => StorageClass::Blob,
                        _ => StorageClass::Text,
                    }
                }
            };

            let value = match class {
                StorageClass::Null => Value::Null,
                StorageClass::Integer => Value::Integer(row.try_get_unchecked::<i64, _>(index)?),
                StorageClass::Real => Value::Real(row.try_get_unchecked::<f64, _>(index)?),
                StorageClass::Text => Value::Text(row.try_get_unchecked::<String, _>(index)?),
                StorageClass::Blob => Value::Blob(row.try_get_unchecked::<Vec<u8>, _>(index)?),
            };
            decoded.insert(column.name(), value);
        }
        Ok(decoded)
    }

    fn bind_value<'q>(
        query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
        value: &Value,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(value) => query.bind(*value),
            Value::Integer(value) => query.bind(*value),
            Value::Real(value) => query.bind(*value),
            Value::Text(value) => query.bind(value.clone()),
            Value::Blob(value) => query.bind(value.clone()),
            Value::Json(value) => query.bind(value.to_string()),
        }
    }

    fn insert_sql(table: &str, row: &Row) -> String {
        let columns: Vec<String> = row.column_names().map(quote_ident).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!("INSERT INTO {} ({}) VALUES ({})", quote_ident(table), columns.join(", "), placeholders)
    }
}

#[async_trait]
impl TableStore for SqliteTableStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HarnessError::database(e, "Failed to list tables"))?;

        Ok(names)
    }

    async fn fetch_rows(&self, table: &str) -> Result<Vec<Row>> {
        let key = self.row_key(table).await?;
        let sql = format!("SELECT * FROM {} ORDER BY {}", quote_ident(table), key.order_by());
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HarnessError::database(e, format!("Failed to read table '{}'", table)))?;

        rows.iter().map(Self::decode_row).collect()
    }

    async fn replace_rows(&self, table: &str, rows: &[Row]) -> Result<()> {
        let context = |action: &str| format!("Failed to {} while replacing rows of '{}'", action, table);
        // AUTOINCREMENT needs a rowid, so only rowid tables have a sequence
        let has_rowid = self.row_key(table).await? == RowKey::Rowid;
        let mut conn = self.pool.acquire().await?;

        // foreign_keys cannot be toggled inside a transaction
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await
            .map_err(|e| HarnessError::database(e, context("suspend foreign keys")))?;

        let outcome = async {
            let mut tx = sqlx::Connection::begin(&mut *conn).await?;

            sqlx::query(&format!("DELETE FROM {}", quote_ident(table)))
                .execute(&mut *tx)
                .await
                .map_err(|e| HarnessError::database(e, context("empty table")))?;

            for row in rows {
                let sql = Self::insert_sql(table, row);
                let query = row.values().fold(sqlx::query(&sql), Self::bind_value);
                query
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| HarnessError::database(e, context("insert row")))?;
            }

            let has_sequences: Option<i64> = sqlx::query_scalar(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
            )
            .fetch_optional(&mut *tx)
            .await?;

            if has_rowid && has_sequences.is_some() {
                let sql = format!(
                    "UPDATE sqlite_sequence SET seq = (SELECT COALESCE(MAX(rowid), 0) FROM {}) \
                     WHERE name = ?",
                    quote_ident(table)
                );
                sqlx::query(&sql)
                    .bind(table)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| HarnessError::database(e, context("realign sequence")))?;
            }

            tx.commit().await.map_err(|e| HarnessError::database(e, context("commit")))?;
            Ok::<(), HarnessError>(())
        }
        .await;

        let restored = sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await;
        outcome?;
        restored.map_err(|e| HarnessError::database(e, context("re-enable foreign keys")))?;

        tracing::trace!(table = %table, rows = rows.len(), "Replaced table rows");
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("PRAGMA foreign_keys = OFF").execute(&mut *conn).await?;
        let dropped = sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
            .execute(&mut *conn)
            .await;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
        dropped.map_err(|e| HarnessError::database(e, format!("Failed to drop table '{}'", table)))?;
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let result = sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| HarnessError::database(e, "Failed to execute statement"))?;
        Ok(result.rows_affected())
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| HarnessError::database(e, format!("Failed to count rows of '{}'", table)))?;
        Ok(count)
    }
}
