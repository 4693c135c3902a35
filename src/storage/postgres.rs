//! PostgreSQL implementation of [`TableStore`].
//!
//! Rows travel as JSON: `row_to_json` on the way out and
//! `json_populate_record` on the way back, which keeps every column type
//! PostgreSQL can print and parse without a per-type decoder. `numeric`
//! columns are read as text so no digits are lost to a float. Tables are read
//! from the connection's `current_schema()`, ordered by primary key when they
//! have one.

use crate::errors::{HarnessError, Result};
use crate::storage::{quote_ident, Row, TableStore, Value};
use async_trait::async_trait;
use sqlx::postgres::PgPool;

/// Table store over a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PostgresTableStore {
    pool: PgPool,
}

impl PostgresTableStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn columns(&self, table: &str) -> Result<Vec<(String, String)>> {
        let columns: Vec<(String, String)> = sqlx::query_as(
            "SELECT column_name::text, data_type::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HarnessError::database(e, format!("Failed to read columns of '{}'", table)))?;
        Ok(columns)
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let columns: Vec<String> = sqlx::query_scalar(
            "SELECT a.attname::text FROM pg_index i \
             JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
             WHERE i.indrelid = $1::text::regclass AND i.indisprimary \
             ORDER BY array_position(i.indkey::int2[], a.attnum)",
        )
        .bind(quote_ident(table))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HarnessError::database(e, format!("Failed to read primary key of '{}'", table)))?;
        Ok(columns)
    }

    /// Query returning one JSON document per row, numeric columns as strings
    fn select_rows_sql(table: &str, columns: &[(String, String)], primary_key: &[String]) -> String {
        let projection = columns
            .iter()
            .map(|(name, data_type)| {
                let column = quote_ident(name);
                if data_type == "numeric" {
                    format!("t.{column}::text AS {column}")
                } else {
                    format!("t.{column}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let order = if primary_key.is_empty() {
            "t.ctid".to_string()
        } else {
            primary_key.iter().map(|c| format!("t.{}", quote_ident(c))).collect::<Vec<_>>().join(", ")
        };
        format!(
            "SELECT to_json(r)::text FROM {} AS t CROSS JOIN LATERAL (SELECT {}) AS r ORDER BY {}",
            quote_ident(table),
            projection,
            order
        )
    }
}

#[async_trait]
impl TableStore for PostgresTableStore {
    fn backend(&self) -> &'static str {
        "postgresql"
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HarnessError::database(e, "Failed to list tables"))?;
        Ok(names)
    }

    async fn fetch_rows(&self, table: &str) -> Result<Vec<Row>> {
        let columns = self.columns(table).await?;
        let primary_key = self.primary_key(table).await?;
        let sql = Self::select_rows_sql(table, &columns, &primary_key);
        let documents: Vec<String> = sqlx::query_scalar(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HarnessError::database(e, format!("Failed to read table '{}'", table)))?;

        documents
            .iter()
            .map(|document| -> Result<Row> {
                let mut object: serde_json::Map<String, serde_json::Value> =
                    serde_json::from_str(document)?;
                Ok(columns
                    .iter()
                    .map(|(column, _)| {
                        let value = object.remove(column).map(Value::from_json).unwrap_or(Value::Null);
                        (column.clone(), value)
                    })
                    .collect())
            })
            .collect()
    }

    async fn replace_rows(&self, table: &str, rows: &[Row]) -> Result<()> {
        let context = |action: &str| format!("Failed to {} while replacing rows of '{}'", action, table);
        let quoted = quote_ident(table);
        let mut tx = self.pool.begin().await?;

        // Skips foreign key triggers for this transaction only
        sqlx::query("SET LOCAL session_replication_role = replica")
            .execute(&mut *tx)
            .await
            .map_err(|e| HarnessError::database(e, context("suspend foreign keys")))?;

        sqlx::query(&format!("DELETE FROM {}", quoted))
            .execute(&mut *tx)
            .await
            .map_err(|e| HarnessError::database(e, context("empty table")))?;

        let insert = format!(
            "INSERT INTO {quoted} OVERRIDING SYSTEM VALUE SELECT * FROM json_populate_record(NULL::{quoted}, $1::json)"
        );
        for row in rows {
            sqlx::query(&insert)
                .bind(row.to_json().to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| HarnessError::database(e, context("insert row")))?;
        }

        let sequences: Vec<(String, String)> = sqlx::query_as(
            "SELECT a.attname::text, pg_get_serial_sequence($1::text, a.attname) \
             FROM pg_attribute a \
             WHERE a.attrelid = $1::text::regclass AND a.attnum > 0 AND NOT a.attisdropped \
               AND pg_get_serial_sequence($1::text, a.attname) IS NOT NULL",
        )
        .bind(&quoted)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| HarnessError::database(e, context("look up sequences")))?;

        for (column, sequence) in sequences {
            let sql = format!(
                "SELECT setval($1::text::regclass, COALESCE(MAX({}), 0) + 1, false) FROM {}",
                quote_ident(&column),
                quoted
            );
            sqlx::query(&sql)
                .bind(&sequence)
                .execute(&mut *tx)
                .await
                .map_err(|e| HarnessError::database(e, context("realign sequence")))?;
        }

        tx.commit().await.map_err(|e| HarnessError::database(e, context("commit")))?;
        tracing::trace!(table = %table, rows = rows.len(), "Replaced table rows");
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(table)))
            .execute(&self.pool)
            .await
            .map_err(|e| HarnessError::database(e, format!("Failed to drop table '{}'", table)))?;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(name, data_type)| (name.to_string(), data_type.to_string())).collect()
    }

    #[test]
    fn test_select_rows_sql_reads_numeric_as_text() {
        let columns = columns(&[("id", "integer"), ("balance", "numeric"), ("note", "text")]);
        let sql = PostgresTableStore::select_rows_sql("accounts", &columns, &["id".to_string()]);

        assert_eq!(
            sql,
            "SELECT to_json(r)::text FROM \"accounts\" AS t CROSS JOIN LATERAL \
             (SELECT t.\"id\", t.\"balance\"::text AS \"balance\", t.\"note\") AS r \
             ORDER BY t.\"id\""
        );
    }

    #[test]
    fn test_select_rows_sql_orders_by_primary_key_or_ctid() {
        let columns = columns(&[("a", "text"), ("b", "text")]);
        let primary_key = vec!["b".to_string(), "a".to_string()];
        let keyed = PostgresTableStore::select_rows_sql("pairs", &columns, &primary_key);
        let unkeyed = PostgresTableStore::select_rows_sql("pairs", &columns, &[]);

        assert!(keyed.ends_with("ORDER BY t.\"b\", t.\"a\""));
        assert!(unkeyed.ends_with("ORDER BY t.ctid"));
    }
}
