//! Load stage: normalize staged rows to the backend's table schema and insert
//! them in fixed-size batches.
//!
//! A batch is the unit of atomicity and retry. A batch that exhausts its
//! attempts is counted failed and the loader moves on; one bad batch never
//! blocks the rest of the run.

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, SecondsFormat};
use serde::Serialize;
use serde_json::{Number, Value};
use tracing::{error, info, warn};

use crate::{
    parse_utc_time, staging, table_columns, ColumnKind, Columns, Config, Loader, Record, StagedRow,
    TableBackend,
};

// ---

/// Legacy derivation names and raw API metric names, with the storage
/// columns they map to.
pub const RENAMED_FIELDS: [(&str, &str); 8] = [
    ("aqi_pm25", "aqi_category"),
    ("severity", "severity_score"),
    ("risk", "risk_flag"),
    ("temperature_2m", "temperature_c"),
    ("relativehumidity_2m", "relative_humidity"),
    ("relative_humidity_2m", "relative_humidity"),
    ("windspeed_10m", "wind_speed_kmh"),
    ("wind_speed_10m", "wind_speed_kmh"),
];

/// Counters for one loader run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    // ---
    pub total_records: usize,
    pub inserted_count: usize,
    pub batches_attempted: usize,
    pub batches_failed: usize,
}

fn is_internal_key(key: &str) -> bool {
    // ---
    key.is_empty() || key == "index" || key.starts_with("Unnamed:")
}

fn is_null_text(value: &str) -> bool {
    // ---
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "nan" | "nat" | "none" | "null" | "<na>"
    )
}

/// Integer or integral-looking float; fractional values truncate.
fn coerce_integer(value: &str) -> Option<i64> {
    // ---
    let value = value.trim();
    value.parse::<i64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    })
}

/// `YYYY-MM-DD`, or the UTC date of a full timestamp.
fn coerce_date(value: &str) -> Option<NaiveDate> {
    // ---
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| parse_utc_time(value).map(|t| t.date_naive()))
}

/// Map one staged row onto exactly `columns`.
pub fn normalize_row(mut row: StagedRow, columns: Columns) -> Record {
    // ---
    row.retain(|key, _| !is_internal_key(key));

    for (from, to) in RENAMED_FIELDS {
        if let Some(value) = row.remove(from) {
            row.insert(to.to_string(), value);
        }
    }

    let mut record = Record::new();
    for (name, kind) in columns {
        let name = *name;
        let raw = row
            .get(name)
            .map(String::as_str)
            .filter(|v| !is_null_text(v));

        let value = match (kind, raw) {
            (_, None) => None,
            (ColumnKind::Text, Some(v)) => Some(Value::from(v)),
            (ColumnKind::Float, Some(v)) => v
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            (ColumnKind::Integer, Some(v)) => coerce_integer(v).map(Value::from),
            (ColumnKind::Timestamp, Some(v)) => parse_utc_time(v)
                .map(|t| Value::from(t.to_rfc3339_opts(SecondsFormat::Secs, true))),
            (ColumnKind::Date, Some(v)) => {
                coerce_date(v).map(|d| Value::from(d.format("%Y-%m-%d").to_string()))
            }
        };
        record.insert(name.to_string(), value.unwrap_or(Value::Null));
    }
    record
}

/// Loader inserting batches into a [`TableBackend`] with bounded retry.
pub struct BatchLoader {
    // ---
    backend: Arc<dyn TableBackend>,
    batch_size: usize,
    max_attempts: u32,
    retry_delay: Duration,
    call_timeout: Duration,
}

impl BatchLoader {
    // ---
    pub fn new(config: &Config, backend: Arc<dyn TableBackend>) -> Self {
        // ---
        BatchLoader {
            backend,
            batch_size: config.load_batch_size.max(1),
            max_attempts: config.load_max_attempts.max(1),
            retry_delay: config.load_retry_delay,
            call_timeout: config.storage_timeout,
        }
    }

    /// Insert already-normalized records.
    pub async fn load_records(&self, records: &[Record]) -> LoadSummary {
        // ---
        let total_batches = records.len().div_ceil(self.batch_size);
        let mut summary = LoadSummary {
            total_records: records.len(),
            ..Default::default()
        };

        info!(
            "Loading {} records in {} batches of up to {} via {}",
            records.len(),
            total_batches,
            self.batch_size,
            self.backend.name()
        );

        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            let start = index * self.batch_size;
            summary.batches_attempted += 1;

            if self.insert_batch(index + 1, total_batches, start, batch).await {
                summary.inserted_count += batch.len();
            } else {
                summary.batches_failed += 1;
                error!(
                    "Failed to insert batch {}/{} (rows {}-{})",
                    index + 1,
                    total_batches,
                    start + 1,
                    start + batch.len()
                );
            }
        }

        info!(
            "Load summary: total={} inserted={} batches={} failed={}",
            summary.total_records,
            summary.inserted_count,
            summary.batches_attempted,
            summary.batches_failed
        );
        summary
    }

    /// Try one batch up to `max_attempts` times; true once it lands.
    async fn insert_batch(
        &self,
        number: usize,
        total_batches: usize,
        start: usize,
        batch: &[Record],
    ) -> bool {
        // ---
        for attempt in 1..=self.max_attempts {
            info!(
                "Inserting batch {}/{} of {} rows (attempt {})",
                number,
                total_batches,
                batch.len(),
                attempt
            );

            let outcome = match tokio::time::timeout(self.call_timeout, self.backend.insert(batch)).await {
                Ok(result) => result.into_result().map(|_| ()),
                Err(_) => Err(anyhow::anyhow!(
                    "insert timed out after {}s",
                    self.call_timeout.as_secs()
                )),
            };

            match outcome {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        "Batch {}/{} (rows {}-{}) attempt {}/{} failed: {}",
                        number,
                        total_batches,
                        start + 1,
                        start + batch.len(),
                        attempt,
                        self.max_attempts,
                        e
                    );
                    if attempt < self.max_attempts {
                        let delay = self.retry_delay * attempt;
                        info!("Retrying in {:?}...", delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        false
    }
}

#[async_trait]
impl Loader for BatchLoader {
    // ---
    async fn load(&self, staged_path: &Path) -> Result<LoadSummary> {
        // ---
        let columns = table_columns(self.backend.dataset());
        let records: Vec<Record> = staging::read_staged(staged_path)?
            .into_iter()
            .map(|row| normalize_row(row, columns))
            .collect();

        Ok(self.load_records(&records).await)
    }
}
