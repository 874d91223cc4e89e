//! Hourly air-quality and weather ETL pipeline.
//!
//! Pulls hourly pollutant or weather forecasts per city from Open-Meteo style
//! APIs, flattens and enriches them into a staged CSV, bulk-loads that into a
//! remote table and computes reports over what was loaded:
//!
//! ```text
//! extract (raw JSON per city) -> transform (staged CSV) -> load (table) -> analyze (report CSVs)
//! ```
//!
//! This crate follows the Explicit Module Boundary Pattern (EMBP): every
//! module imports its siblings' items through `crate::` re-exports below,
//! never through another module's path. Refactoring a module's internals
//! then only touches this gateway.

mod analyze;
mod artifacts;
pub mod config;
pub mod extract;
mod load;
mod models;
mod pipeline;
mod schema;
pub mod staging;
pub mod storage;
mod transform;

pub use analyze::{
    compute_report, compute_weather_report, write_reports, write_weather_reports, AnalysisReport,
    AnalysisSummary, HourlyMean, HourlyTemp, Kpi, KpiReport, RiskShare, TableAnalyzer, TrendPoint,
    WeatherReport, WeatherSummary,
};
pub use artifacts::{city_from_slug, city_slug, Artifact, ArtifactTag, RawArtifactStore};
pub use config::{Backend, Config, StorageConfig};
pub use extract::{classify_body, query_params, FetchError, HttpExtractor};
pub use load::{normalize_row, BatchLoader, LoadSummary, RENAMED_FIELDS};
pub use models::{
    parse_utc_time, AqiCategory, City, Dataset, HourlyRecord, Pollutant, PollutantReadings,
    RiskFlag, TempCategory, WeatherMetric, WeatherReadings, WeatherRecord,
};
pub use pipeline::{Analyzer, Extractor, Loader, Pipeline, RunReport, Transformer};
pub use staging::{StagedRow, STAGED_COLUMNS, WEATHER_STAGED_COLUMNS};
pub use storage::{
    column_kind, table_columns, ColumnKind, Columns, Filter, MemoryTable, PostgresTable, Record,
    SupabaseTable, TableBackend, TableResult, AIR_QUALITY_COLUMNS, WEATHER_COLUMNS,
};
pub use transform::{
    flatten, flatten_weather, transform_artifacts, transform_weather_artifacts, StagedDataset,
    StagingTransformer,
};
