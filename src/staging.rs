//! Staged dataset file: the cleaned, feature-enriched rows between the
//! transformer and the loader.
//!
//! Written as CSV, one file per dataset, overwritten wholesale on every
//! run. The loader reads it
//! back generically (header → string map) so it can normalize files from
//! other producers too.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use serde::Serialize;

use crate::{HourlyRecord, WeatherRecord};

// ---

/// Column order of the staged air-quality file.
pub const STAGED_COLUMNS: [&str; 13] = [
    "city",
    "time",
    "hour",
    "pm10",
    "pm2_5",
    "carbon_monoxide",
    "nitrogen_dioxide",
    "sulphur_dioxide",
    "ozone",
    "uv_index",
    "aqi_category",
    "severity_score",
    "risk_flag",
];

/// Column order of the staged weather file.
pub const WEATHER_STAGED_COLUMNS: [&str; 9] = [
    "city",
    "time",
    "date",
    "hour",
    "temperature_c",
    "relative_humidity",
    "wind_speed_kmh",
    "temp_category",
    "feels_like_c",
];

/// One staged row as read back from disk, keyed by header.
pub type StagedRow = BTreeMap<String, String>;

#[derive(Serialize)]
struct StagedRecord<'a> {
    city: &'a str,
    time: String,
    hour: u32,
    pm10: Option<f64>,
    pm2_5: Option<f64>,
    carbon_monoxide: Option<f64>,
    nitrogen_dioxide: Option<f64>,
    sulphur_dioxide: Option<f64>,
    ozone: Option<f64>,
    uv_index: Option<f64>,
    aqi_category: Option<&'static str>,
    severity_score: f64,
    risk_flag: &'static str,
}

impl<'a> From<&'a HourlyRecord> for StagedRecord<'a> {
    fn from(r: &'a HourlyRecord) -> Self {
        // ---
        StagedRecord {
            city: &r.city,
            time: r.time.to_rfc3339_opts(SecondsFormat::Secs, true),
            hour: r.hour,
            pm10: r.readings.pm10,
            pm2_5: r.readings.pm2_5,
            carbon_monoxide: r.readings.carbon_monoxide,
            nitrogen_dioxide: r.readings.nitrogen_dioxide,
            sulphur_dioxide: r.readings.sulphur_dioxide,
            ozone: r.readings.ozone,
            uv_index: r.readings.uv_index,
            aqi_category: r.aqi_category.map(|c| c.label()),
            severity_score: r.severity_score,
            risk_flag: r.risk_flag.label(),
        }
    }
}

#[derive(Serialize)]
struct WeatherStagedRecord<'a> {
    city: &'a str,
    time: String,
    date: String,
    hour: u32,
    temperature_c: Option<f64>,
    relative_humidity: Option<f64>,
    wind_speed_kmh: Option<f64>,
    temp_category: Option<&'static str>,
    feels_like_c: Option<f64>,
}

impl<'a> From<&'a WeatherRecord> for WeatherStagedRecord<'a> {
    fn from(r: &'a WeatherRecord) -> Self {
        // ---
        WeatherStagedRecord {
            city: &r.city,
            time: r.time.to_rfc3339_opts(SecondsFormat::Secs, true),
            date: r.date.format("%Y-%m-%d").to_string(),
            hour: r.hour,
            temperature_c: r.readings.temperature_c,
            relative_humidity: r.readings.relative_humidity,
            wind_speed_kmh: r.readings.wind_speed_kmh,
            temp_category: r.temp_category.map(|c| c.label()),
            feels_like_c: r.feels_like_c,
        }
    }
}

/// Overwrite `path` with `records`. The header is written even when there
/// are no rows.
pub fn write_staged(path: &Path, records: &[HourlyRecord]) -> Result<()> {
    // ---
    write_rows(path, &STAGED_COLUMNS, records.iter().map(StagedRecord::from))
}

/// Weather counterpart of [`write_staged`].
pub fn write_weather_staged(path: &Path, records: &[WeatherRecord]) -> Result<()> {
    // ---
    write_rows(
        path,
        &WEATHER_STAGED_COLUMNS,
        records.iter().map(WeatherStagedRecord::from),
    )
}

fn write_rows<S: Serialize>(
    path: &Path,
    header: &[&str],
    rows: impl ExactSizeIterator<Item = S>,
) -> Result<()> {
    // ---
    let count = rows.len();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create staged dir {}", parent.display()))?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to open staged file {}", path.display()))?;

    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    tracing::info!("Saved {} staged rows to {}", count, path.display());
    Ok(())
}

/// Read every row of a staged file as a header → value map.
pub fn read_staged(path: &Path) -> Result<Vec<StagedRow>> {
    // ---
    if !path.exists() {
        anyhow::bail!(
            "Staged file not found at {}. Run the transform step first.",
            path.display()
        );
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open staged file {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for (i, result) in reader.records().enumerate() {
        let record =
            result.with_context(|| format!("Malformed staged row {} in {}", i + 1, path.display()))?;
        let row: StagedRow = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        rows.push(row);
    }

    tracing::info!("Read {} staged rows from {}", rows.len(), path.display());
    Ok(rows)
}
