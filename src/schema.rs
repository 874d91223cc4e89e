//! Database schema bootstrap for the pipeline tables.
//!
//! Ensures a dataset's table and its indexes exist. Only applied when
//! `DB_CREATE_SCHEMA` is enabled; there are no migrations.

use anyhow::Result;
use sqlx::PgPool;

use crate::storage::{ColumnKind, Columns};

// ---

/// Create the table for `columns` and its indexes if missing (idempotent).
///
/// `table` must already be a validated identifier; it is interpolated.
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool, table: &str, columns: Columns) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;
    let index_prefix = table.replace('.', "_");

    let create_table = create_table_sql(table, columns);
    sqlx::query(&create_table).execute(&mut *tx).await?;

    // Analyzer reads are grouped by city and ordered by time
    let city_index = format!(
        "CREATE INDEX IF NOT EXISTS idx_{index_prefix}_city_time ON {table} (city, time);"
    );
    sqlx::query(&city_index).execute(&mut *tx).await?;

    tx.commit().await?;
    tracing::info!("Schema ready for table {}", table);
    Ok(())
}

fn create_table_sql(table: &str, columns: Columns) -> String {
    // ---
    let mut lines = vec![format!("    {:<18}BIGSERIAL   PRIMARY KEY", "id")];
    for (name, kind) in columns {
        let sql_type = match kind {
            ColumnKind::Text => "TEXT",
            ColumnKind::Timestamp => "TIMESTAMPTZ",
            ColumnKind::Date => "DATE",
            ColumnKind::Float => "DOUBLE PRECISION",
            ColumnKind::Integer => "INTEGER",
        };
        let not_null = if *name == "city" { " NOT NULL" } else { "" };
        lines.push(format!("    {name:<18}{sql_type}{not_null}"));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n{}\n);",
        lines.join(",\n")
    )
}
