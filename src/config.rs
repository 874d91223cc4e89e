//! Configuration loader for the `airwatch` pipeline.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase; every component
//! receives the values it needs through its constructor.
//!
//! Loading is generic over a key lookup so tests can supply a map instead of
//! mutating the process environment.
use std::{env, path::PathBuf, time::Duration};

use anyhow::{anyhow, bail, Result};

use crate::{City, Dataset};

/// Parse an optional environment variable into `$ty` with a default value.
macro_rules! parse_env {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($lookup:expr, $var_name:expr) => {
        $lookup($var_name)
            .ok_or_else(|| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

pub const DEFAULT_API_URL: &str = "https://air-quality-api.open-meteo.com/v1/air-quality";
pub const DEFAULT_WEATHER_API_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_TABLE_NAME: &str = "air_quality_data";
pub const DEFAULT_WEATHER_TABLE_NAME: &str = "weather_data";

const DEFAULT_CITIES: &str = "Delhi:28.7041:77.1025;\
                              Mumbai:19.0760:72.8777;\
                              Bengaluru:12.9716:77.5946;\
                              Hyderabad:17.3850:78.4867;\
                              Kolkata:22.5726:88.3639";

/// Key lookup used by the loaders. Empty values count as unset.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn env_lookup(key: &str) -> Option<String> {
    // ---
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Strongly typed pipeline configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Upstream air-quality API endpoint.
    pub api_url: String,

    /// Upstream weather forecast endpoint.
    pub weather_api_url: String,

    /// Days of hourly forecast requested for weather (1..=16).
    pub weather_forecast_days: u32,

    /// Cities fetched on every run, in order.
    pub cities: Vec<City>,

    /// Root of the `raw/`, `staged/` and `processed/` directories.
    pub data_dir: PathBuf,

    /// Per-request timeout for extraction.
    pub http_timeout: Duration,

    /// Attempts per city before an error artifact is saved.
    pub extract_max_attempts: u32,

    /// Fixed delay between extraction attempts.
    pub extract_retry_delay: Duration,

    /// Pause between consecutive cities.
    pub extract_city_delay: Duration,

    /// Records per insert batch.
    pub load_batch_size: usize,

    /// Attempts per batch before it is counted failed.
    pub load_max_attempts: u32,

    /// Base backoff; the delay after attempt `k` is `k` times this.
    pub load_retry_delay: Duration,

    /// Timeout applied to each storage call.
    pub storage_timeout: Duration,
}

impl Config {
    // ---
    pub fn api_url_for(&self, dataset: Dataset) -> &str {
        // ---
        match dataset {
            Dataset::AirQuality => &self.api_url,
            Dataset::Weather => &self.weather_api_url,
        }
    }

    /// Air-quality artifacts live directly under `raw/`, weather ones in
    /// `raw/weather/` so neither listing picks up the other's files.
    pub fn raw_dir(&self, dataset: Dataset) -> PathBuf {
        // ---
        let raw = self.data_dir.join("raw");
        match dataset {
            Dataset::AirQuality => raw,
            Dataset::Weather => raw.join("weather"),
        }
    }

    pub fn staged_path(&self, dataset: Dataset) -> PathBuf {
        self.data_dir
            .join("staged")
            .join(format!("{}_transformed.csv", dataset.name()))
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }
}

/// Which remote table implementation to talk to.
#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    Postgres {
        db_url: String,
        pool_max: u32,
        create_schema: bool,
    },
    Supabase {
        url: String,
        key: String,
    },
    Memory,
}

/// Remote table settings; loaded separately because only `load`, `analyze`
/// and `run` need credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    // ---
    pub backend: Backend,
    pub table_name: String,
    pub weather_table_name: String,
}

impl StorageConfig {
    pub fn table_for(&self, dataset: Dataset) -> &str {
        // ---
        match dataset {
            Dataset::AirQuality => &self.table_name,
            Dataset::Weather => &self.weather_table_name,
        }
    }
}

/// Load pipeline configuration from environment variables with defaults.
///
/// Optional:
/// - `AQ_API_URL` – upstream endpoint (default: Open-Meteo air quality)
/// - `WEATHER_API_URL` – forecast endpoint (default: Open-Meteo forecast)
/// - `WEATHER_FORECAST_DAYS` (1, at most 16)
/// - `AQ_CITIES` – `Name:lat:lon;...` (default: five Indian metros)
/// - `DATA_DIR` – data root (default: `data`)
/// - `HTTP_TIMEOUT_SECS` (20), `EXTRACT_MAX_ATTEMPTS` (3),
///   `EXTRACT_RETRY_DELAY_MS` (2000), `EXTRACT_CITY_DELAY_MS` (500)
/// - `LOAD_BATCH_SIZE` (200), `LOAD_MAX_ATTEMPTS` (3),
///   `LOAD_RETRY_DELAY_MS` (2000), `STORAGE_TIMEOUT_SECS` (30)
///
/// Returns an error if any variable is invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    load_from(&env_lookup)
}

pub fn load_from(lookup: Lookup) -> Result<Config> {
    // ---
    let api_url = lookup("AQ_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let weather_api_url =
        lookup("WEATHER_API_URL").unwrap_or_else(|| DEFAULT_WEATHER_API_URL.to_string());
    let weather_forecast_days = parse_env!(lookup, "WEATHER_FORECAST_DAYS", u32, 1);
    let cities = parse_cities(&lookup("AQ_CITIES").unwrap_or_else(|| DEFAULT_CITIES.to_string()))?;
    let data_dir = PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| "data".to_string()));

    let http_timeout = Duration::from_secs(parse_env!(lookup, "HTTP_TIMEOUT_SECS", u64, 20));
    let extract_max_attempts = parse_env!(lookup, "EXTRACT_MAX_ATTEMPTS", u32, 3);
    let extract_retry_delay =
        Duration::from_millis(parse_env!(lookup, "EXTRACT_RETRY_DELAY_MS", u64, 2000));
    let extract_city_delay =
        Duration::from_millis(parse_env!(lookup, "EXTRACT_CITY_DELAY_MS", u64, 500));

    let load_batch_size = parse_env!(lookup, "LOAD_BATCH_SIZE", usize, 200);
    let load_max_attempts = parse_env!(lookup, "LOAD_MAX_ATTEMPTS", u32, 3);
    let load_retry_delay =
        Duration::from_millis(parse_env!(lookup, "LOAD_RETRY_DELAY_MS", u64, 2000));
    let storage_timeout = Duration::from_secs(parse_env!(lookup, "STORAGE_TIMEOUT_SECS", u64, 30));

    if extract_max_attempts == 0 {
        bail!("Invalid EXTRACT_MAX_ATTEMPTS: must be at least 1");
    }
    if load_max_attempts == 0 {
        bail!("Invalid LOAD_MAX_ATTEMPTS: must be at least 1");
    }
    if load_batch_size == 0 {
        bail!("Invalid LOAD_BATCH_SIZE: must be at least 1");
    }
    if !(1..=16).contains(&weather_forecast_days) {
        bail!("Invalid WEATHER_FORECAST_DAYS: must be between 1 and 16");
    }

    Ok(Config {
        api_url,
        weather_api_url,
        weather_forecast_days,
        cities,
        data_dir,
        http_timeout,
        extract_max_attempts,
        extract_retry_delay,
        extract_city_delay,
        load_batch_size,
        load_max_attempts,
        load_retry_delay,
        storage_timeout,
    })
}

/// Load remote table settings from environment variables.
///
/// `STORAGE_BACKEND` selects `postgres`, `supabase` or `memory`; when unset,
/// `DATABASE_URL` implies postgres and `SUPABASE_URL` implies supabase.
///
/// Required per backend:
/// - postgres: `DATABASE_URL` (optional `DB_POOL_MAX` (5), `DB_CREATE_SCHEMA` (false))
/// - supabase: `SUPABASE_URL`, `SUPABASE_KEY`
///
/// Missing credentials are a fatal error.
pub fn load_storage_from_env() -> Result<StorageConfig> {
    // ---
    load_storage_from(&env_lookup)
}

pub fn load_storage_from(lookup: Lookup) -> Result<StorageConfig> {
    // ---
    let table_name = lookup("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string());
    validate_table_name("TABLE_NAME", &table_name)?;
    let weather_table_name =
        lookup("WEATHER_TABLE_NAME").unwrap_or_else(|| DEFAULT_WEATHER_TABLE_NAME.to_string());
    validate_table_name("WEATHER_TABLE_NAME", &weather_table_name)?;

    let kind = match lookup("STORAGE_BACKEND") {
        Some(kind) => kind.trim().to_ascii_lowercase(),
        None if lookup("DATABASE_URL").is_some() => "postgres".to_string(),
        None if lookup("SUPABASE_URL").is_some() => "supabase".to_string(),
        None => bail!(
            "No storage configured: set DATABASE_URL, or SUPABASE_URL and SUPABASE_KEY, \
             or STORAGE_BACKEND=memory"
        ),
    };

    let backend = match kind.as_str() {
        "postgres" => Backend::Postgres {
            db_url: require_env!(lookup, "DATABASE_URL"),
            pool_max: parse_env!(lookup, "DB_POOL_MAX", u32, 5),
            create_schema: parse_bool(lookup, "DB_CREATE_SCHEMA")?,
        },
        "supabase" => Backend::Supabase {
            url: require_env!(lookup, "SUPABASE_URL"),
            key: require_env!(lookup, "SUPABASE_KEY"),
        },
        "memory" => Backend::Memory,
        other => bail!("Invalid STORAGE_BACKEND: {other} (expected postgres, supabase or memory)"),
    };

    Ok(StorageConfig {
        backend,
        table_name,
        weather_table_name,
    })
}

fn parse_bool(lookup: Lookup, var_name: &str) -> Result<bool> {
    // ---
    match lookup(var_name).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => Err(anyhow!("Invalid {}: {}", var_name, other)),
    }
}

/// Parse `Name:lat:lon;Name:lat:lon`.
fn parse_cities(list: &str) -> Result<Vec<City>> {
    // ---
    let mut cities = Vec::new();

    for entry in list.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let mut parts = entry.rsplitn(3, ':');
        let (Some(lon), Some(lat), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
            bail!("Invalid AQ_CITIES entry '{entry}': expected Name:lat:lon");
        };

        let latitude = lat
            .trim()
            .parse::<f64>()
            .map_err(|e| anyhow!("Invalid latitude in AQ_CITIES entry '{entry}': {e}"))?;
        let longitude = lon
            .trim()
            .parse::<f64>()
            .map_err(|e| anyhow!("Invalid longitude in AQ_CITIES entry '{entry}': {e}"))?;

        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            bail!("Invalid AQ_CITIES entry '{entry}': coordinates out of range");
        }
        let name = name.trim();
        if name.is_empty() {
            bail!("Invalid AQ_CITIES entry '{entry}': empty city name");
        }

        cities.push(City::new(name, latitude, longitude));
    }

    if cities.is_empty() {
        bail!("Invalid AQ_CITIES: no cities configured");
    }
    Ok(cities)
}

/// The table name is interpolated into SQL and URLs, so only plain
/// (optionally schema-qualified) identifiers are accepted.
fn validate_table_name(var_name: &str, name: &str) -> Result<()> {
    // ---
    let valid_ident = |s: &str| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() > 2 || !segments.iter().all(|s| valid_ident(s)) {
        bail!("Invalid {var_name}: {name}");
    }
    Ok(())
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        let cities: Vec<&str> = self.cities.iter().map(|c| c.name.as_str()).collect();

        tracing::info!("Configuration loaded:");
        tracing::info!("  AQ_API_URL             : {}", self.api_url);
        tracing::info!("  WEATHER_API_URL        : {}", self.weather_api_url);
        tracing::info!("  WEATHER_FORECAST_DAYS  : {}", self.weather_forecast_days);
        tracing::info!("  AQ_CITIES              : {}", cities.join(", "));
        tracing::info!("  DATA_DIR               : {}", self.data_dir.display());
        tracing::info!("  HTTP_TIMEOUT_SECS      : {}", self.http_timeout.as_secs());
        tracing::info!("  EXTRACT_MAX_ATTEMPTS   : {}", self.extract_max_attempts);
        tracing::info!("  EXTRACT_RETRY_DELAY_MS : {}", self.extract_retry_delay.as_millis());
        tracing::info!("  EXTRACT_CITY_DELAY_MS  : {}", self.extract_city_delay.as_millis());
        tracing::info!("  LOAD_BATCH_SIZE        : {}", self.load_batch_size);
        tracing::info!("  LOAD_MAX_ATTEMPTS      : {}", self.load_max_attempts);
        tracing::info!("  LOAD_RETRY_DELAY_MS    : {}", self.load_retry_delay.as_millis());
        tracing::info!("  STORAGE_TIMEOUT_SECS   : {}", self.storage_timeout.as_secs());
    }
}

impl StorageConfig {
    /// Log the storage settings, masking credentials.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Storage configuration:");
        tracing::info!("  TABLE_NAME         : {}", self.table_name);
        tracing::info!("  WEATHER_TABLE_NAME : {}", self.weather_table_name);

        match &self.backend {
            Backend::Postgres {
                db_url,
                pool_max,
                create_schema,
            } => {
                tracing::info!("  STORAGE_BACKEND  : postgres");
                tracing::info!("  DATABASE_URL     : {}", mask_db_url(db_url));
                tracing::info!("  DB_POOL_MAX      : {}", pool_max);
                tracing::info!("  DB_CREATE_SCHEMA : {}", create_schema);
            }
            Backend::Supabase { url, key } => {
                tracing::info!("  STORAGE_BACKEND  : supabase");
                tracing::info!("  SUPABASE_URL     : {}", url);
                tracing::info!("  SUPABASE_KEY     : {}", mask_secret(key));
            }
            Backend::Memory => {
                tracing::info!("  STORAGE_BACKEND  : memory");
            }
        }
    }
}

/// Mask the password in a database URL.
pub(crate) fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}

fn mask_secret(secret: &str) -> String {
    // ---
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}****")
}
