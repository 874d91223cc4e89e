//! Remote table gateway.
//!
//! Every backend normalizes its responses to a single [`TableResult`] at
//! this boundary, so the loader and analyzer never inspect driver- or
//! HTTP-specific shapes. Backends:
//! - `postgres` – direct `sqlx` connection pool
//! - `supabase` – PostgREST over HTTPS
//! - `memory`   – in-process table for tests and dry runs

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{Backend, Dataset, StorageConfig};

mod memory;
mod postgres;
mod supabase;

pub use memory::MemoryTable;
pub use postgres::PostgresTable;
pub use supabase::SupabaseTable;

// ---

/// One table row as a column → value map.
pub type Record = Map<String, Value>;

/// SQL-side type of a storage column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Timestamp,
    Date,
    Float,
    Integer,
}

/// A table's column set, in insert order.
pub type Columns = &'static [(&'static str, ColumnKind)];

/// Columns of the air-quality table.
pub const AIR_QUALITY_COLUMNS: Columns = &[
    ("city", ColumnKind::Text),
    ("time", ColumnKind::Timestamp),
    ("pm10", ColumnKind::Float),
    ("pm2_5", ColumnKind::Float),
    ("carbon_monoxide", ColumnKind::Float),
    ("nitrogen_dioxide", ColumnKind::Float),
    ("sulphur_dioxide", ColumnKind::Float),
    ("ozone", ColumnKind::Float),
    ("uv_index", ColumnKind::Float),
    ("aqi_category", ColumnKind::Text),
    ("severity_score", ColumnKind::Float),
    ("risk_flag", ColumnKind::Text),
    ("hour", ColumnKind::Integer),
];

/// Columns of the weather table.
pub const WEATHER_COLUMNS: Columns = &[
    ("city", ColumnKind::Text),
    ("time", ColumnKind::Timestamp),
    ("date", ColumnKind::Date),
    ("hour", ColumnKind::Integer),
    ("temperature_c", ColumnKind::Float),
    ("relative_humidity", ColumnKind::Float),
    ("wind_speed_kmh", ColumnKind::Float),
    ("temp_category", ColumnKind::Text),
    ("feels_like_c", ColumnKind::Float),
];

pub fn table_columns(dataset: Dataset) -> Columns {
    // ---
    match dataset {
        Dataset::AirQuality => AIR_QUALITY_COLUMNS,
        Dataset::Weather => WEATHER_COLUMNS,
    }
}

pub fn column_kind(columns: Columns, column: &str) -> Option<ColumnKind> {
    // ---
    columns
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, kind)| *kind)
}

/// Equality predicate on a schema column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    // ---
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Outcome of one backend call: rows on success, an error message otherwise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableResult {
    // ---
    pub data: Vec<Record>,
    pub error: Option<String>,
}

impl TableResult {
    // ---
    pub fn ok(data: Vec<Record>) -> Self {
        TableResult { data, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        TableResult {
            data: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Vec<Record>> {
        // ---
        match self.error {
            None => Ok(self.data),
            Some(e) => Err(anyhow::anyhow!(e)),
        }
    }
}

/// Table-oriented store supporting batch inserts and filtered reads.
///
/// Implementations must not panic or return transport errors directly;
/// everything is reported through [`TableResult::error`].
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Dataset whose table this backend reads and writes.
    fn dataset(&self) -> Dataset;

    /// Insert `rows` as one unit: either all rows land or none do.
    async fn insert(&self, rows: &[Record]) -> TableResult;

    /// Read every row matching all `filters`, ordered by `(city, time, id)`.
    async fn select(&self, filters: &[Filter]) -> TableResult;
}

/// Unknown filter columns are rejected before any backend I/O.
pub(crate) fn validate_filters(columns: Columns, filters: &[Filter]) -> Result<(), String> {
    // ---
    match filters.iter().find(|f| column_kind(columns, &f.column).is_none()) {
        Some(f) => Err(format!("Unknown filter column: {}", f.column)),
        None => Ok(()),
    }
}

/// Build the backend described by `storage`.
///
/// Connection failures here are fatal for the run; per-call failures later
/// are reported through [`TableResult`].
pub async fn connect(
    storage: &StorageConfig,
    dataset: Dataset,
    timeout: Duration,
) -> Result<Arc<dyn TableBackend>> {
    // ---
    let table = storage.table_for(dataset).to_string();

    let backend: Arc<dyn TableBackend> = match &storage.backend {
        Backend::Postgres {
            db_url,
            pool_max,
            create_schema,
        } => Arc::new(
            PostgresTable::connect(db_url, *pool_max, dataset, table, *create_schema, timeout)
                .await?,
        ),
        Backend::Supabase { url, key } => {
            Arc::new(SupabaseTable::new(url, key, dataset, table, timeout)?)
        }
        Backend::Memory => Arc::new(MemoryTable::for_dataset(dataset)),
    };

    tracing::info!(
        "Storage backend ready: {} ({})",
        backend.name(),
        dataset.name()
    );
    Ok(backend)
}
