//! Transformation stage: flatten raw hourly payloads into enriched rows.
//!
//! Both upstream payloads look like
//! `{ "hourly": { "time": [...], "pm10": [...], ... } }` with every metric
//! array index-aligned to `time`. Metric arrays may be missing or shorter
//! than `time`; they are padded with nulls and never allowed to extend it.

use std::{fs, path::PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    parse_utc_time, staging, Artifact, Dataset, HourlyRecord, Pollutant, PollutantReadings,
    Transformer, WeatherMetric, WeatherReadings, WeatherRecord,
};

// ---

/// Result of a transform run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedDataset {
    // ---
    pub path: PathBuf,
    pub rows: usize,
}

/// Flatten one payload into one record per parseable timestamp.
///
/// A payload with no usable `hourly.time` array (including the `{city, error}`
/// sentinels the extractor writes) yields no rows.
pub fn flatten(payload: &Value, city: &str) -> Vec<HourlyRecord> {
    // ---
    let keys: Vec<Vec<String>> = Pollutant::ALL
        .iter()
        .map(|p| vec![p.key().to_string(), p.key().replace('_', ".")])
        .collect();

    hourly_rows(payload, city, &keys)
        .into_iter()
        .map(|(time, values)| {
            let mut readings = PollutantReadings::default();
            for (pollutant, value) in Pollutant::ALL.iter().zip(values) {
                readings.set(*pollutant, value);
            }
            HourlyRecord::derive(city, time, readings)
        })
        .collect()
}

/// Weather counterpart of [`flatten`]: temperature, humidity and wind plus
/// the derived date, hour, band and feels-like columns.
pub fn flatten_weather(payload: &Value, city: &str) -> Vec<WeatherRecord> {
    // ---
    let keys: Vec<Vec<String>> = WeatherMetric::ALL
        .iter()
        .map(|m| m.api_keys().iter().map(|k| k.to_string()).collect())
        .collect();

    hourly_rows(payload, city, &keys)
        .into_iter()
        .map(|(time, values)| {
            let mut readings = WeatherReadings::default();
            for (metric, value) in WeatherMetric::ALL.iter().zip(values) {
                readings.set(*metric, value);
            }
            WeatherRecord::derive(city, time, readings)
        })
        .collect()
}

/// Parseable timestamps with one value per metric, in `metric_keys` order.
fn hourly_rows(
    payload: &Value,
    city: &str,
    metric_keys: &[Vec<String>],
) -> Vec<(DateTime<Utc>, Vec<Option<f64>>)> {
    // ---
    let hourly = payload.get("hourly");
    let times = match hourly.and_then(|h| h.get("time")).and_then(Value::as_array) {
        Some(times) if !times.is_empty() => times,
        _ => {
            warn!("No 'time' array in hourly payload for city={}", city);
            return Vec::new();
        }
    };
    let n = times.len();

    let columns: Vec<Vec<Option<f64>>> = metric_keys
        .iter()
        .map(|keys| metric_column(hourly, keys, n))
        .collect();

    let mut rows = Vec::with_capacity(n);
    let mut bad_times = 0;

    for (i, raw_time) in times.iter().enumerate() {
        let Some(time) = raw_time.as_str().and_then(parse_utc_time) else {
            bad_times += 1;
            continue;
        };
        rows.push((time, columns.iter().map(|c| c[i]).collect()));
    }

    if bad_times > 0 {
        warn!(
            "Dropped {} rows with unparseable time for city={}",
            bad_times, city
        );
    }
    rows
}

/// One metric's values, exactly `n` long. The first key present wins.
fn metric_column(hourly: Option<&Value>, keys: &[String], n: usize) -> Vec<Option<f64>> {
    // ---
    let values = hourly.and_then(|h| {
        keys.iter()
            .find_map(|k| h.get(k.as_str()))
            .and_then(Value::as_array)
    });

    let Some(values) = values else {
        return vec![None; n];
    };

    let mut column: Vec<Option<f64>> = values.iter().take(n).map(parse_numeric).collect();
    column.resize(n, None);
    column
}

/// Numbers and numeric strings; anything else is null.
fn parse_numeric(value: &Value) -> Option<f64> {
    // ---
    let v = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    v.is_finite().then_some(v)
}

/// Read and flatten every artifact. Unreadable files and files without
/// hourly data are skipped with a warning.
fn flatten_artifacts<R>(artifacts: &[Artifact], flatten: impl Fn(&Value, &str) -> Vec<R>) -> Vec<R> {
    // ---
    info!("Transforming {} raw artifacts", artifacts.len());

    let mut combined = Vec::new();

    for artifact in artifacts {
        let path = &artifact.path;

        let payload: Value = match fs::read(path)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(anyhow::Error::from))
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Skipping file {} - failed to load JSON: {}", path.display(), e);
                continue;
            }
        };

        let rows = flatten(&payload, &artifact.city);
        if rows.is_empty() {
            warn!(
                "No hourly rows produced for file {} (city={})",
                path.display(),
                artifact.city
            );
            continue;
        }
        combined.extend(rows);
    }

    info!("Combined rows before cleaning: {}", combined.len());
    combined
}

/// Flatten every artifact, drop rows with no pollutant data, and sort by
/// `(city, time)`.
pub fn transform_artifacts(artifacts: &[Artifact]) -> Vec<HourlyRecord> {
    // ---
    let mut combined = flatten_artifacts(artifacts, flatten);

    let before = combined.len();
    combined.retain(|r| !r.readings.is_empty());
    info!(
        "Dropped {} rows where all pollutant readings are missing",
        before - combined.len()
    );

    combined.sort_by(|a, b| a.city.cmp(&b.city).then(a.time.cmp(&b.time)));
    combined
}

/// Flatten weather artifacts, drop rows where all three sensors are null,
/// and sort by `(city, time)`.
pub fn transform_weather_artifacts(artifacts: &[Artifact]) -> Vec<WeatherRecord> {
    // ---
    let mut combined = flatten_artifacts(artifacts, flatten_weather);

    let before = combined.len();
    combined.retain(|r| !r.readings.is_empty());
    info!(
        "Dropped {} rows where all weather readings are missing",
        before - combined.len()
    );

    combined.sort_by(|a, b| a.city.cmp(&b.city).then(a.time.cmp(&b.time)));
    combined
}

/// Transformer that writes one dataset's staged file to a fixed path.
pub struct StagingTransformer {
    // ---
    dataset: Dataset,
    staged_path: PathBuf,
}

impl StagingTransformer {
    pub fn new(dataset: Dataset, staged_path: impl Into<PathBuf>) -> Self {
        StagingTransformer {
            dataset,
            staged_path: staged_path.into(),
        }
    }
}

impl Transformer for StagingTransformer {
    // ---
    fn transform(&self, artifacts: &[Artifact]) -> Result<StagedDataset> {
        // ---
        let rows = match self.dataset {
            Dataset::AirQuality => {
                let records = transform_artifacts(artifacts);
                staging::write_staged(&self.staged_path, &records)?;
                records.len()
            }
            Dataset::Weather => {
                let records = transform_weather_artifacts(artifacts);
                staging::write_weather_staged(&self.staged_path, &records)?;
                records.len()
            }
        };
        if rows == 0 {
            warn!("Transformed {} dataset is empty; staged header only", self.dataset.name());
        }

        Ok(StagedDataset {
            path: self.staged_path.clone(),
            rows,
        })
    }
}
