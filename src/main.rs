//! Command line entry point for the `airwatch` air-quality and weather pipeline.
//!
//! This binary loads configuration (environment variables or `.env`),
//! initializes structured logging and dispatches to one pipeline stage or to
//! the full run. Every command prints its structured result as JSON on
//! stdout; logs go to the tracing subscriber.
//!
//! # Environment Variables
//! - `AQ_API_URL`, `AQ_CITIES`, `DATA_DIR` – upstream and local data settings
//! - `WEATHER_API_URL`, `WEATHER_FORECAST_DAYS` – weather upstream settings
//! - `STORAGE_BACKEND` – `postgres`, `supabase` or `memory` (inferred when unset)
//! - `DATABASE_URL` / `SUPABASE_URL` + `SUPABASE_KEY` – remote table credentials
//! - `TABLE_NAME`, `WEATHER_TABLE_NAME` – remote table per dataset
//! - `PIPELINE_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `PIPELINE_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! Storage settings are only loaded by the commands that touch the remote
//! table, so `extract` and `transform` run without credentials.
use std::{env, sync::Arc};

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use serde::Serialize;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use airwatch::{
    config, extract, storage, Analyzer, BatchLoader, Config, Dataset, HttpExtractor, Loader,
    Pipeline, RawArtifactStore, StagingTransformer, TableAnalyzer, TableBackend, Transformer,
};

mod cli;

use cli::{Cli, Commands};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let dataset = Dataset::from(cli.dataset);
    let cfg = config::load_from_env()?;
    cfg.log_config();
    tracing::info!("Dataset: {}", dataset.name());

    match cli.command() {
        Commands::Run => {
            let backend = connect_storage(&cfg, dataset).await?;
            let report = Pipeline::from_config(&cfg, backend)?.run().await?;
            print_json(&report)?;
        }
        Commands::Extract => {
            let store = RawArtifactStore::open(cfg.raw_dir(dataset))?;
            let extractor = HttpExtractor::new(&cfg, dataset, store)?;
            let artifacts =
                extract::extract_all(&extractor, &cfg.cities, cfg.extract_city_delay).await;
            print_json(&artifacts)?;
        }
        Commands::Transform => {
            let artifacts = RawArtifactStore::open(cfg.raw_dir(dataset))?.list_known(&cfg.cities)?;
            tracing::info!("Found {} raw artifacts", artifacts.len());
            let staged = StagingTransformer::new(dataset, cfg.staged_path(dataset))
                .transform(&artifacts)?;
            print_json(&staged)?;
        }
        Commands::Load => {
            let backend = connect_storage(&cfg, dataset).await?;
            let summary = BatchLoader::new(&cfg, backend)
                .load(&cfg.staged_path(dataset))
                .await?;
            print_json(&summary)?;
        }
        Commands::Analyze { city } => {
            let backend = connect_storage(&cfg, dataset).await?;
            let mut analyzer = TableAnalyzer::new(&cfg, backend);
            if let Some(city) = city {
                analyzer = analyzer.with_city(city);
            }
            print_json(&analyzer.analyze().await?)?;
        }
    }

    Ok(())
}

async fn connect_storage(cfg: &Config, dataset: Dataset) -> Result<Arc<dyn TableBackend>> {
    // ---
    let storage_cfg = config::load_storage_from_env()?;
    storage_cfg.log_config();
    storage::connect(&storage_cfg, dataset, cfg.storage_timeout).await
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    // ---
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `PIPELINE_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, else the `PIPELINE_LOG_LEVEL` env var
///
/// Logs are written to stderr so stdout carries only the JSON result.
fn init_tracing() {
    // ---
    let span_events = match env::var("PIPELINE_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stderr().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to PIPELINE_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("PIPELINE_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
