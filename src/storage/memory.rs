//! In-process table used by tests and `STORAGE_BACKEND=memory` dry runs.

use std::{cmp::Ordering, sync::Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use super::{table_columns, validate_filters, Filter, Record, TableBackend, TableResult};
use crate::Dataset;

// ---

#[derive(Debug, Default)]
struct State {
    rows: Vec<Record>,
    insert_sizes: Vec<usize>,
    insert_times: Vec<Instant>,
    failures_left: u32,
}

/// Table held in memory. Inserts are all-or-nothing per call.
#[derive(Debug)]
pub struct MemoryTable {
    // ---
    dataset: Dataset,
    state: Mutex<State>,
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTable {
    // ---
    /// An empty air-quality table.
    pub fn new() -> Self {
        Self::for_dataset(Dataset::AirQuality)
    }

    pub fn for_dataset(dataset: Dataset) -> Self {
        // ---
        MemoryTable {
            dataset,
            state: Mutex::new(State::default()),
        }
    }

    /// Make the next `n` insert calls fail without storing anything.
    pub fn fail_next_inserts(&self, n: u32) {
        // ---
        self.lock().failures_left = n;
    }

    /// Size of every insert call so far, failed ones included.
    pub fn insert_sizes(&self) -> Vec<usize> {
        self.lock().insert_sizes.clone()
    }

    /// When each insert call arrived, on the tokio clock.
    pub fn insert_times(&self) -> Vec<Instant> {
        self.lock().insert_times.clone()
    }

    pub fn rows(&self) -> Vec<Record> {
        self.lock().rows.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not wedge the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn text(record: &Record, column: &str) -> String {
    // ---
    record
        .get(column)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl TableBackend for MemoryTable {
    // ---
    fn name(&self) -> &'static str {
        "memory"
    }

    fn dataset(&self) -> Dataset {
        self.dataset
    }

    async fn insert(&self, rows: &[Record]) -> TableResult {
        // ---
        let mut state = self.lock();
        state.insert_sizes.push(rows.len());
        state.insert_times.push(Instant::now());

        if state.failures_left > 0 {
            state.failures_left -= 1;
            return TableResult::failed("simulated insert failure");
        }

        state.rows.extend_from_slice(rows);
        TableResult::ok(Vec::new())
    }

    async fn select(&self, filters: &[Filter]) -> TableResult {
        // ---
        if let Err(e) = validate_filters(table_columns(self.dataset), filters) {
            return TableResult::failed(e);
        }

        let mut data: Vec<Record> = self
            .lock()
            .rows
            .iter()
            .filter(|row| {
                filters
                    .iter()
                    .all(|f| row.get(&f.column).unwrap_or(&Value::Null) == &f.value)
            })
            .cloned()
            .collect();

        // ISO-8601 UTC strings order chronologically; the stable sort keeps
        // insertion order as the id tiebreak
        data.sort_by(|a, b| match text(a, "city").cmp(&text(b, "city")) {
            Ordering::Equal => text(a, "time").cmp(&text(b, "time")),
            other => other,
        });
        TableResult::ok(data)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn record(city: &str, time: &str) -> Record {
        // ---
        let value = json!({ "city": city, "time": time, "pm2_5": 10.0 });
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        // ---
        let table = MemoryTable::new();
        table.fail_next_inserts(1);

        assert!(!table.insert(&[record("Delhi", "2025-12-11T00:00:00Z")]).await.is_ok());
        assert!(table.insert(&[record("Delhi", "2025-12-11T00:00:00Z")]).await.is_ok());

        assert_eq!(table.insert_sizes(), vec![1, 1]);
        assert_eq!(table.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_select_filters_and_orders() {
        // ---
        let table = MemoryTable::new();
        table
            .insert(&[
                record("Mumbai", "2025-12-11T01:00:00Z"),
                record("Delhi", "2025-12-11T02:00:00Z"),
                record("Delhi", "2025-12-11T01:00:00Z"),
            ])
            .await;

        let all = table.select(&[]).await.into_result().unwrap();
        let order: Vec<String> = all.iter().map(|r| text(r, "city") + &text(r, "time")).collect();
        assert_eq!(
            order,
            vec![
                "Delhi2025-12-11T01:00:00Z",
                "Delhi2025-12-11T02:00:00Z",
                "Mumbai2025-12-11T01:00:00Z"
            ]
        );

        let mumbai = table.select(&[Filter::eq("city", "Mumbai")]).await;
        assert_eq!(mumbai.data.len(), 1);

        assert!(!table.select(&[Filter::eq("bogus", 1)]).await.is_ok());
    }

    #[tokio::test]
    async fn test_weather_table_accepts_weather_filters() {
        // ---
        let table = MemoryTable::for_dataset(Dataset::Weather);
        assert_eq!(table.dataset(), Dataset::Weather);

        let mut row = record("Pune", "2025-12-11T01:00:00Z");
        row.insert("temp_category".into(), json!("mild"));
        table.insert(&[row]).await;

        let mild = table.select(&[Filter::eq("temp_category", "mild")]).await;
        assert_eq!(mild.data.len(), 1);
        assert!(!table.select(&[Filter::eq("aqi_category", "Good")]).await.is_ok());
    }
}
