//! PostgreSQL backend over a `sqlx` connection pool.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Number, Value};
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Postgres, QueryBuilder, Row,
};

use super::{
    column_kind, table_columns, validate_filters, ColumnKind, Columns, Filter, Record,
    TableBackend, TableResult,
};
use crate::{config::mask_db_url, parse_utc_time, schema, Dataset};

// ---

/// Bind parameters Postgres accepts in a single statement.
const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// One dataset's table in PostgreSQL.
///
/// Each insert call runs inside one transaction, so a batch lands completely
/// or not at all. Batches wider than the bind-parameter limit allows are
/// split into several multi-row `INSERT`s within that transaction.
pub struct PostgresTable {
    // ---
    pool: PgPool,
    dataset: Dataset,
    table: String,
}

impl PostgresTable {
    // ---
    pub async fn connect(
        db_url: &str,
        pool_max: u32,
        dataset: Dataset,
        table: String,
        create_schema: bool,
        timeout: Duration,
    ) -> Result<Self> {
        // ---
        let masked = mask_db_url(db_url);
        tracing::info!("Attempting to connect to database: {}", masked);

        let pool = PgPoolOptions::new()
            .max_connections(pool_max)
            .acquire_timeout(timeout)
            .connect(db_url)
            .await
            .map_err(|e| anyhow!("Failed to connect to database '{}': {}", masked, e))?;

        tracing::info!("Successfully connected to database");

        if create_schema {
            schema::create_schema(&pool, &table, table_columns(dataset)).await?;
        }

        Ok(PostgresTable {
            pool,
            dataset,
            table,
        })
    }

    fn columns(&self) -> Columns {
        table_columns(self.dataset)
    }

    async fn insert_rows(&self, rows: &[Record]) -> Result<(), sqlx::Error> {
        // ---
        if rows.is_empty() {
            return Ok(());
        }

        let columns = self.columns();
        let names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
        let statement = format!("INSERT INTO {} ({}) ", self.table, names.join(", "));

        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(max_rows_per_statement(columns.len())) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(&statement);
            qb.push_values(chunk, |mut b, row| {
                for (name, kind) in columns {
                    let value = row.get(*name);
                    match kind {
                        ColumnKind::Text => {
                            b.push_bind(value.and_then(Value::as_str).map(str::to_string));
                        }
                        ColumnKind::Float => {
                            b.push_bind(value.and_then(Value::as_f64));
                        }
                        ColumnKind::Integer => {
                            b.push_bind(integer_cell(value));
                        }
                        ColumnKind::Timestamp => {
                            b.push_bind(value.and_then(Value::as_str).and_then(parse_utc_time));
                        }
                        ColumnKind::Date => {
                            b.push_bind(date_cell(value));
                        }
                    }
                }
            });
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn select_rows(&self, filters: &[Filter]) -> Result<Vec<Record>, String> {
        // ---
        let columns = self.columns();
        validate_filters(columns, filters)?;

        // The cast keeps reads working against tables created with a plain TIMESTAMP
        let select_list: Vec<String> = columns
            .iter()
            .map(|(name, kind)| match kind {
                ColumnKind::Timestamp => format!("{name}::timestamptz AS {name}"),
                _ => name.to_string(),
            })
            .collect();

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM {}", select_list.join(", "), self.table));

        for (i, filter) in filters.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            qb.push(&filter.column);
            qb.push(" = ");
            push_filter_value(&mut qb, columns, filter)?;
        }
        qb.push(" ORDER BY city, time, id");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.to_string())?;

        rows.iter()
            .map(|row| row_to_record(row, columns))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())
    }
}

/// Rows per `INSERT` that keep `columns × rows` within the bind limit.
pub(crate) fn max_rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// Out-of-range integers are stored as NULL rather than wrapped.
fn integer_cell(value: Option<&Value>) -> Option<i32> {
    value
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
}

fn date_cell(value: Option<&Value>) -> Option<NaiveDate> {
    // ---
    value
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn push_filter_value(
    qb: &mut QueryBuilder<Postgres>,
    columns: Columns,
    filter: &Filter,
) -> Result<(), String> {
    // ---
    let mismatch = || format!("Filter value {} does not fit column {}", filter.value, filter.column);

    match (column_kind(columns, &filter.column), &filter.value) {
        (Some(ColumnKind::Text), Value::String(s)) => {
            qb.push_bind(s.clone());
        }
        (Some(ColumnKind::Float), v) if v.is_number() => {
            qb.push_bind(v.as_f64());
        }
        (Some(ColumnKind::Integer), v) if v.is_i64() => {
            qb.push_bind(v.as_i64());
        }
        (Some(ColumnKind::Timestamp), Value::String(s)) => {
            qb.push_bind(parse_utc_time(s).ok_or_else(mismatch)?);
        }
        (Some(ColumnKind::Date), v) => {
            qb.push_bind(date_cell(Some(v)).ok_or_else(mismatch)?);
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

fn row_to_record(row: &PgRow, columns: Columns) -> Result<Record, sqlx::Error> {
    // ---
    let mut record = Record::new();

    for (name, kind) in columns {
        let name = *name;
        let value = match kind {
            ColumnKind::Text => row.try_get::<Option<String>, _>(name)?.map(Value::from),
            ColumnKind::Float => row
                .try_get::<Option<f64>, _>(name)?
                .and_then(Number::from_f64)
                .map(Value::Number),
            ColumnKind::Integer => row.try_get::<Option<i32>, _>(name)?.map(Value::from),
            ColumnKind::Timestamp => row
                .try_get::<Option<DateTime<Utc>>, _>(name)?
                .map(|t| Value::from(t.to_rfc3339_opts(SecondsFormat::Secs, true))),
            ColumnKind::Date => row
                .try_get::<Option<NaiveDate>, _>(name)?
                .map(|d| Value::from(d.format("%Y-%m-%d").to_string())),
        };
        record.insert(name.to_string(), value.unwrap_or(Value::Null));
    }
    Ok(record)
}

#[async_trait]
impl TableBackend for PostgresTable {
    // ---
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn dataset(&self) -> Dataset {
        self.dataset
    }

    async fn insert(&self, rows: &[Record]) -> TableResult {
        // ---
        match self.insert_rows(rows).await {
            Ok(()) => TableResult::ok(Vec::new()),
            Err(e) => TableResult::failed(e.to_string()),
        }
    }

    async fn select(&self, filters: &[Filter]) -> TableResult {
        // ---
        match self.select_rows(filters).await {
            Ok(rows) => TableResult::ok(rows),
            Err(e) => TableResult::failed(e),
        }
    }
}
