//! Analysis stage: aggregate reports over the full remote table.
//!
//! Reads what is actually durable (the remote table, not the staged file)
//! and recomputes every aggregate from scratch on each run. Reports are
//! written as CSV into the processed directory for the chart renderer.
//! Which reports are produced depends on the dataset behind the backend.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Timelike, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{parse_utc_time, Analyzer, Config, Dataset, Filter, Record, RiskFlag, TableBackend};

// ---

/// One remote row, reduced to the fields the reports need.
#[derive(Debug, Clone, PartialEq)]
struct Reading {
    city: String,
    time: Option<DateTime<Utc>>,
    hour: Option<u32>,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
    ozone: Option<f64>,
    severity_score: Option<f64>,
    risk_flag: Option<RiskFlag>,
}

fn number(record: &Record, key: &str) -> Option<f64> {
    // ---
    let v = match record.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    v.is_finite().then_some(v)
}

impl Reading {
    // ---
    fn from_record(record: &Record) -> Option<Reading> {
        // ---
        let city = record.get("city")?.as_str()?.trim();
        if city.is_empty() {
            return None;
        }
        let time = record
            .get("time")
            .and_then(Value::as_str)
            .and_then(parse_utc_time);
        let hour = number(record, "hour")
            .filter(|h| (0.0..24.0).contains(h))
            .map(|h| h as u32)
            .or_else(|| time.map(|t| t.hour()));

        Some(Reading {
            city: city.to_string(),
            time,
            hour,
            pm2_5: number(record, "pm2_5"),
            pm10: number(record, "pm10"),
            ozone: number(record, "ozone"),
            severity_score: number(record, "severity_score"),
            risk_flag: record
                .get("risk_flag")
                .and_then(Value::as_str)
                .and_then(RiskFlag::from_label),
        })
    }
}

/// Headline KPIs; a single CSV row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiReport {
    // ---
    pub city_highest_avg_pm25: Option<String>,
    pub highest_avg_pm25_value: Option<f64>,
    pub city_highest_severity: Option<String>,
    pub highest_severity_value: Option<f64>,
    pub pct_high_risk_hours: f64,
    pub pct_moderate_risk_hours: f64,
    pub pct_low_risk_hours: f64,
    pub worst_hour_pm25: Option<u32>,
    pub worst_hour_pm25_value: Option<f64>,
}

/// Count of one risk level within one city.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskShare {
    // ---
    pub city: String,
    pub risk_flag: String,
    pub count: usize,
    pub percentage: f64,
}

/// One point of a city's pollution trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    // ---
    pub city: String,
    pub time: String,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    pub ozone: Option<f64>,
}

/// Mean PM2.5 for one hour of day across all cities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyMean {
    // ---
    pub hour: u32,
    pub mean_pm2_5: f64,
}

/// Everything one analyzer run produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    // ---
    pub rows_analyzed: usize,
    pub kpi: KpiReport,
    pub risk_distribution: Vec<RiskShare>,
    pub trends: Vec<TrendPoint>,
    pub hourly_profile: Vec<HourlyMean>,
}

/// Headline weather metrics; a single CSV row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeatherSummary {
    // ---
    pub rows: usize,
    pub time_min: Option<String>,
    pub time_max: Option<String>,
    pub temp_mean: Option<f64>,
    pub humidity_mean: Option<f64>,
    pub wind_mean: Option<f64>,
}

/// Mean temperature for one `(date, hour)` across all cities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyTemp {
    // ---
    pub date: NaiveDate,
    pub hour: u32,
    pub temperature_c: Option<f64>,
}

/// Everything one weather analyzer run produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherReport {
    // ---
    pub summary: WeatherSummary,
    pub hourly_temperature: Vec<HourlyTemp>,
}

/// Headline figures of either dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "dataset", rename_all = "snake_case")]
pub enum Kpi {
    AirQuality(KpiReport),
    Weather(WeatherSummary),
}

/// What the orchestrator keeps from an analyzer run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    // ---
    pub rows_analyzed: usize,
    pub kpi: Kpi,
    pub report_paths: Vec<PathBuf>,
}

#[derive(Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Key with the highest defined mean; ties go to the smallest key.
fn highest_mean<K: Clone + Ord>(means: &BTreeMap<K, Mean>) -> Option<(K, f64)> {
    // ---
    let mut best: Option<(K, f64)> = None;
    for (key, mean) in means {
        let Some(value) = mean.value() else { continue };
        if best.as_ref().map_or(true, |(_, top)| value > *top) {
            best = Some((key.clone(), value));
        }
    }
    best
}

fn percentage(part: usize, whole: usize) -> f64 {
    // ---
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Compute every aggregate over `records`.
pub fn compute_report(records: &[Record]) -> AnalysisReport {
    // ---
    let readings: Vec<Reading> = records.iter().filter_map(Reading::from_record).collect();
    if readings.len() < records.len() {
        warn!(
            "Ignored {} rows without a city",
            records.len() - readings.len()
        );
    }

    let mut pm25_by_city: BTreeMap<String, Mean> = BTreeMap::new();
    let mut severity_by_city: BTreeMap<String, Mean> = BTreeMap::new();
    let mut pm25_by_hour: BTreeMap<u32, Mean> = BTreeMap::new();
    let mut risk_counts: BTreeMap<(String, RiskFlag), usize> = BTreeMap::new();

    for r in &readings {
        pm25_by_city.entry(r.city.clone()).or_default().add(r.pm2_5);
        severity_by_city
            .entry(r.city.clone())
            .or_default()
            .add(r.severity_score);
        if let Some(hour) = r.hour {
            pm25_by_hour.entry(hour).or_default().add(r.pm2_5);
        }
        if let Some(flag) = r.risk_flag {
            *risk_counts.entry((r.city.clone(), flag)).or_default() += 1;
        }
    }

    // KPIs
    let flagged: usize = risk_counts.values().sum();
    let level_share = |level: RiskFlag| {
        let count: usize = risk_counts
            .iter()
            .filter(|((_, flag), _)| *flag == level)
            .map(|(_, n)| n)
            .sum();
        percentage(count, flagged)
    };

    let top_pm25 = highest_mean(&pm25_by_city);
    let top_severity = highest_mean(&severity_by_city);
    let worst_hour = highest_mean(&pm25_by_hour);

    let kpi = KpiReport {
        city_highest_avg_pm25: top_pm25.as_ref().map(|(c, _)| c.clone()),
        highest_avg_pm25_value: top_pm25.map(|(_, v)| v),
        city_highest_severity: top_severity.as_ref().map(|(c, _)| c.clone()),
        highest_severity_value: top_severity.map(|(_, v)| v),
        pct_high_risk_hours: level_share(RiskFlag::High),
        pct_moderate_risk_hours: level_share(RiskFlag::Moderate),
        pct_low_risk_hours: level_share(RiskFlag::Low),
        worst_hour_pm25: worst_hour.map(|(h, _)| h),
        worst_hour_pm25_value: worst_hour.map(|(_, v)| v),
    };

    // Per-city risk distribution
    let mut city_totals: BTreeMap<&str, usize> = BTreeMap::new();
    for ((city, _), count) in &risk_counts {
        *city_totals.entry(city.as_str()).or_default() += count;
    }
    let risk_distribution = risk_counts
        .iter()
        .map(|((city, flag), count)| RiskShare {
            city: city.clone(),
            risk_flag: flag.label().to_string(),
            count: *count,
            percentage: percentage(*count, city_totals[city.as_str()]),
        })
        .collect();

    // Per-city chronological trend
    let mut timed: Vec<&Reading> = readings.iter().filter(|r| r.time.is_some()).collect();
    timed.sort_by(|a, b| a.city.cmp(&b.city).then(a.time.cmp(&b.time)));
    let trends = timed
        .into_iter()
        .filter_map(|r| {
            let time = r.time?;
            Some(TrendPoint {
                city: r.city.clone(),
                time: time.to_rfc3339_opts(SecondsFormat::Secs, true),
                pm2_5: r.pm2_5,
                pm10: r.pm10,
                ozone: r.ozone,
            })
        })
        .collect();

    let hourly_profile = pm25_by_hour
        .iter()
        .filter_map(|(hour, mean)| {
            mean.value().map(|mean_pm2_5| HourlyMean {
                hour: *hour,
                mean_pm2_5,
            })
        })
        .collect();

    AnalysisReport {
        rows_analyzed: readings.len(),
        kpi,
        risk_distribution,
        trends,
        hourly_profile,
    }
}

/// Summary metrics and the `(date, hour)` temperature profile over weather
/// rows. Null readings are ignored by every mean.
pub fn compute_weather_report(records: &[Record]) -> WeatherReport {
    // ---
    let mut temperature = Mean::default();
    let mut humidity = Mean::default();
    let mut wind = Mean::default();
    let mut by_hour: BTreeMap<(NaiveDate, u32), Mean> = BTreeMap::new();
    let mut time_min: Option<DateTime<Utc>> = None;
    let mut time_max: Option<DateTime<Utc>> = None;

    for record in records {
        let time = record
            .get("time")
            .and_then(Value::as_str)
            .and_then(parse_utc_time);
        if let Some(t) = time {
            time_min = Some(time_min.map_or(t, |m| m.min(t)));
            time_max = Some(time_max.map_or(t, |m| m.max(t)));
        }

        let temperature_c = number(record, "temperature_c");
        temperature.add(temperature_c);
        humidity.add(number(record, "relative_humidity"));
        wind.add(number(record, "wind_speed_kmh"));

        // Rows missing either key are left out of the profile
        let date = record
            .get("date")
            .and_then(Value::as_str)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .or_else(|| time.map(|t| t.date_naive()));
        let hour = number(record, "hour")
            .filter(|h| (0.0..24.0).contains(h))
            .map(|h| h as u32)
            .or_else(|| time.map(|t| t.hour()));
        if let (Some(date), Some(hour)) = (date, hour) {
            by_hour.entry((date, hour)).or_default().add(temperature_c);
        }
    }

    let as_text = |t: DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);
    let summary = WeatherSummary {
        rows: records.len(),
        time_min: time_min.map(as_text),
        time_max: time_max.map(as_text),
        temp_mean: temperature.value(),
        humidity_mean: humidity.value(),
        wind_mean: wind.value(),
    };

    let hourly_temperature = by_hour
        .iter()
        .map(|((date, hour), mean)| HourlyTemp {
            date: *date,
            hour: *hour,
            temperature_c: mean.value(),
        })
        .collect();

    WeatherReport {
        summary,
        hourly_temperature,
    }
}

fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    // ---
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to open report {}", path.display()))?;

    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the report CSVs into `dir`, returning their paths.
pub fn write_reports(dir: &Path, report: &AnalysisReport) -> Result<Vec<PathBuf>> {
    // ---
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report dir {}", dir.display()))?;

    let summary = dir.join("summary_metrics.csv");
    let risk = dir.join("city_risk_distribution.csv");
    let trends = dir.join("pollution_trends.csv");
    let hourly = dir.join("hourly_pm25.csv");

    write_csv(
        &summary,
        &[
            "city_highest_avg_pm25",
            "highest_avg_pm25_value",
            "city_highest_severity",
            "highest_severity_value",
            "pct_high_risk_hours",
            "pct_moderate_risk_hours",
            "pct_low_risk_hours",
            "worst_hour_pm25",
            "worst_hour_pm25_value",
        ],
        std::slice::from_ref(&report.kpi),
    )?;
    write_csv(
        &risk,
        &["city", "risk_flag", "count", "percentage"],
        &report.risk_distribution,
    )?;
    write_csv(
        &trends,
        &["city", "time", "pm2_5", "pm10", "ozone"],
        &report.trends,
    )?;
    write_csv(&hourly, &["hour", "mean_pm2_5"], &report.hourly_profile)?;

    info!("Saved reports to {}", dir.display());
    Ok(vec![summary, risk, trends, hourly])
}

/// Write the weather report CSVs into `dir`, returning their paths.
pub fn write_weather_reports(dir: &Path, report: &WeatherReport) -> Result<Vec<PathBuf>> {
    // ---
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report dir {}", dir.display()))?;

    let summary = dir.join("analysis_summary.csv");
    let hourly = dir.join("hourly_avg_temp.csv");

    write_csv(
        &summary,
        &[
            "rows",
            "time_min",
            "time_max",
            "temp_mean",
            "humidity_mean",
            "wind_mean",
        ],
        std::slice::from_ref(&report.summary),
    )?;
    write_csv(
        &hourly,
        &["date", "hour", "temperature_c"],
        &report.hourly_temperature,
    )?;

    info!("Saved weather reports to {}", dir.display());
    Ok(vec![summary, hourly])
}

/// Analyzer reading the whole remote table (optionally one city).
pub struct TableAnalyzer {
    // ---
    backend: Arc<dyn TableBackend>,
    processed_dir: PathBuf,
    call_timeout: Duration,
    city: Option<String>,
}

impl TableAnalyzer {
    // ---
    pub fn new(config: &Config, backend: Arc<dyn TableBackend>) -> Self {
        // ---
        TableAnalyzer {
            backend,
            processed_dir: config.processed_dir(),
            call_timeout: config.storage_timeout,
            city: None,
        }
    }

    /// Restrict the analysis to one city.
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    async fn fetch_all(&self) -> Result<Vec<Record>> {
        // ---
        let filters: Vec<Filter> = self
            .city
            .iter()
            .map(|c| Filter::eq("city", c.as_str()))
            .collect();

        info!("Fetching data from {}...", self.backend.name());
        let result = tokio::time::timeout(self.call_timeout, self.backend.select(&filters))
            .await
            .map_err(|_| {
                anyhow::anyhow!("select timed out after {}s", self.call_timeout.as_secs())
            })?;

        let records = result
            .into_result()
            .context("Failed to read the remote table")?;
        info!("Loaded {} rows from {}", records.len(), self.backend.name());
        Ok(records)
    }
}

#[async_trait]
impl Analyzer for TableAnalyzer {
    // ---
    async fn analyze(&self) -> Result<AnalysisSummary> {
        // ---
        let records = self.fetch_all().await?;

        match self.backend.dataset() {
            Dataset::AirQuality => {
                let report = compute_report(&records);
                let report_paths = write_reports(&self.processed_dir, &report)?;
                Ok(AnalysisSummary {
                    rows_analyzed: report.rows_analyzed,
                    kpi: Kpi::AirQuality(report.kpi),
                    report_paths,
                })
            }
            Dataset::Weather => {
                let report = compute_weather_report(&records);
                let report_paths = write_weather_reports(&self.processed_dir, &report)?;
                Ok(AnalysisSummary {
                    rows_analyzed: report.summary.rows,
                    kpi: Kpi::Weather(report.summary),
                    report_paths,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn row(city: &str, hour: u32, pm2_5: Option<f64>, severity: f64, risk: &str) -> Record {
        // ---
        let value = json!({
            "city": city,
            "time": format!("2025-12-11T{:02}:00:00Z", hour),
            "hour": hour,
            "pm2_5": pm2_5,
            "pm10": 20.0,
            "ozone": null,
            "severity_score": severity,
            "risk_flag": risk,
        });
        value.as_object().cloned().unwrap()
    }

    fn sample() -> Vec<Record> {
        // ---
        vec![
            row("Mumbai", 1, Some(30.0), 150.0, "Low Risk"),
            row("Delhi", 1, Some(120.0), 660.0, "High Risk"),
            row("Delhi", 0, Some(80.0), 460.0, "High Risk"),
            row("Mumbai", 0, None, 300.0, "Moderate Risk"),
        ]
    }

    #[test]
    fn test_kpis() {
        // ---
        let report = compute_report(&sample());
        let kpi = &report.kpi;

        assert_eq!(report.rows_analyzed, 4);
        assert_eq!(kpi.city_highest_avg_pm25.as_deref(), Some("Delhi"));
        assert_eq!(kpi.highest_avg_pm25_value, Some(100.0));
        assert_eq!(kpi.city_highest_severity.as_deref(), Some("Delhi"));
        assert_eq!(kpi.highest_severity_value, Some(560.0));
        assert_eq!(kpi.pct_high_risk_hours, 50.0);
        assert_eq!(kpi.pct_moderate_risk_hours, 25.0);
        assert_eq!(kpi.pct_low_risk_hours, 25.0);
        // hour 1: (30 + 120) / 2 = 75; hour 0: 80 (null ignored)
        assert_eq!(kpi.worst_hour_pm25, Some(0));
        assert_eq!(kpi.worst_hour_pm25_value, Some(80.0));
    }

    #[test]
    fn test_missing_risk_levels_report_zero() {
        // ---
        let report = compute_report(&[row("Delhi", 3, Some(10.0), 50.0, "Low Risk")]);

        assert_eq!(report.kpi.pct_low_risk_hours, 100.0);
        assert_eq!(report.kpi.pct_high_risk_hours, 0.0);
        assert_eq!(report.kpi.pct_moderate_risk_hours, 0.0);
    }

    #[test]
    fn test_empty_table() {
        // ---
        let report = compute_report(&[]);

        assert_eq!(report.kpi, KpiReport::default());
        assert!(report.risk_distribution.is_empty());
        assert!(report.trends.is_empty());
    }

    #[test]
    fn test_risk_distribution_per_city() {
        // ---
        let report = compute_report(&sample());

        let rows: Vec<(&str, &str, usize, f64)> = report
            .risk_distribution
            .iter()
            .map(|r| (r.city.as_str(), r.risk_flag.as_str(), r.count, r.percentage))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("Delhi", "High Risk", 2, 100.0),
                ("Mumbai", "Moderate Risk", 1, 50.0),
                ("Mumbai", "Low Risk", 1, 50.0),
            ]
        );
    }

    #[test]
    fn test_trends_are_chronological_per_city() {
        // ---
        let report = compute_report(&sample());

        let order: Vec<(&str, &str)> = report
            .trends
            .iter()
            .map(|t| (t.city.as_str(), t.time.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Delhi", "2025-12-11T00:00:00Z"),
                ("Delhi", "2025-12-11T01:00:00Z"),
                ("Mumbai", "2025-12-11T00:00:00Z"),
                ("Mumbai", "2025-12-11T01:00:00Z"),
            ]
        );
        assert_eq!(report.trends[0].pm2_5, Some(80.0));
        assert_eq!(report.trends[0].ozone, None);
    }

    #[test]
    fn test_ties_go_to_first_city() {
        // ---
        let report = compute_report(&[
            row("Pune", 0, Some(50.0), 250.0, "Moderate Risk"),
            row("Agra", 0, Some(50.0), 250.0, "Moderate Risk"),
        ]);
        assert_eq!(report.kpi.city_highest_avg_pm25.as_deref(), Some("Agra"));
    }

    #[test]
    fn test_reports_are_written() -> Result<()> {
        // ---
        let tmp = TempDir::new()?;
        let report = compute_report(&sample());

        let paths = write_reports(&tmp.path().join("processed"), &report)?;

        assert_eq!(paths.len(), 4);
        let summary = fs::read_to_string(&paths[0])?;
        let mut lines = summary.lines();
        assert!(lines.next().unwrap().starts_with("city_highest_avg_pm25,"));
        assert!(lines.next().unwrap().starts_with("Delhi,100.0,Delhi,560.0,50.0,25.0,25.0,0,80.0"));

        let trends = fs::read_to_string(&paths[2])?;
        assert_eq!(trends.lines().count(), 5);
        Ok(())
    }

    fn weather_row(time: &str, temperature: Option<f64>, humidity: Option<f64>) -> Record {
        // ---
        let value = json!({
            "city": "Pune",
            "time": time,
            "date": &time[..10],
            "hour": time[11..13].parse::<u32>().unwrap(),
            "temperature_c": temperature,
            "relative_humidity": humidity,
            "wind_speed_kmh": 10.0,
        });
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_weather_summary_and_hourly_profile() {
        // ---
        let report = compute_weather_report(&[
            weather_row("2025-12-11T01:00:00Z", Some(20.0), Some(60.0)),
            weather_row("2025-12-11T00:00:00Z", Some(18.0), None),
            weather_row("2025-12-11T01:00:00Z", Some(24.0), Some(40.0)),
            weather_row("2025-12-12T00:00:00Z", None, Some(50.0)),
        ]);

        let summary = &report.summary;
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.time_min.as_deref(), Some("2025-12-11T00:00:00Z"));
        assert_eq!(summary.time_max.as_deref(), Some("2025-12-12T00:00:00Z"));
        assert_eq!(summary.temp_mean, Some(62.0 / 3.0));
        assert_eq!(summary.humidity_mean, Some(50.0));
        assert_eq!(summary.wind_mean, Some(10.0));

        let profile: Vec<(String, u32, Option<f64>)> = report
            .hourly_temperature
            .iter()
            .map(|h| (h.date.to_string(), h.hour, h.temperature_c))
            .collect();
        assert_eq!(
            profile,
            vec![
                ("2025-12-11".to_string(), 0, Some(18.0)),
                ("2025-12-11".to_string(), 1, Some(22.0)),
                ("2025-12-12".to_string(), 0, None),
            ]
        );
    }

    #[test]
    fn test_weather_reports_are_written() -> Result<()> {
        // ---
        let tmp = TempDir::new()?;
        let report = compute_weather_report(&[weather_row("2025-12-11T05:00:00Z", Some(21.5), Some(55.0))]);

        let paths = write_weather_reports(tmp.path(), &report)?;

        let summary = fs::read_to_string(&paths[0])?;
        let mut lines = summary.lines();
        assert_eq!(
            lines.next(),
            Some("rows,time_min,time_max,temp_mean,humidity_mean,wind_mean")
        );
        assert_eq!(
            lines.next(),
            Some("1,2025-12-11T05:00:00Z,2025-12-11T05:00:00Z,21.5,55.0,10.0")
        );

        let hourly = fs::read_to_string(&paths[1])?;
        assert_eq!(hourly.lines().collect::<Vec<_>>(), vec!["date,hour,temperature_c", "2025-12-11,5,21.5"]);
        Ok(())
    }

    #[test]
    fn test_kpi_serializes_with_dataset_tag() {
        // ---
        let kpi = Kpi::Weather(WeatherSummary::default());
        let value = serde_json::to_value(&kpi).unwrap();
        assert_eq!(value["dataset"], "weather");
        assert_eq!(value["rows"], 0);
    }
}
