//! Pipeline orchestration: Extract → Transform → Load → Analyze.
//!
//! The four stages are injected as trait objects, so tests can swap any of
//! them (or the table behind the loader and analyzer) for a fake. Stages run
//! strictly in order; each stage's output is the next stage's only input.

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::{
    extract, AnalysisSummary, Artifact, BatchLoader, City, Config, HttpExtractor, LoadSummary,
    RawArtifactStore, StagedDataset, StagingTransformer, TableAnalyzer, TableBackend,
};

// ---

/// Fetches one city. Must always return a saved artifact reference.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn fetch(&self, city: &City) -> Artifact;
}

/// Turns raw artifacts into the staged dataset.
pub trait Transformer: Send + Sync {
    fn transform(&self, artifacts: &[Artifact]) -> Result<StagedDataset>;
}

/// Inserts the staged dataset into the remote table.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, staged_path: &Path) -> Result<LoadSummary>;
}

/// Computes and persists reports over the remote table.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self) -> Result<AnalysisSummary>;
}

/// Structured outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    // ---
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub artifacts: Vec<Artifact>,
    pub staged_rows: usize,
    pub load: LoadSummary,
    pub analysis: Option<AnalysisSummary>,
    pub analysis_error: Option<String>,
}

pub struct Pipeline {
    // ---
    cities: Vec<City>,
    city_delay: Duration,
    extractor: Box<dyn Extractor>,
    transformer: Box<dyn Transformer>,
    loader: Box<dyn Loader>,
    analyzer: Box<dyn Analyzer>,
}

impl Pipeline {
    // ---
    pub fn new(
        cities: Vec<City>,
        city_delay: Duration,
        extractor: Box<dyn Extractor>,
        transformer: Box<dyn Transformer>,
        loader: Box<dyn Loader>,
        analyzer: Box<dyn Analyzer>,
    ) -> Self {
        // ---
        Pipeline {
            cities,
            city_delay,
            extractor,
            transformer,
            loader,
            analyzer,
        }
    }

    /// Wire the production stages around `backend`; the dataset is the one
    /// behind that backend's table.
    pub fn from_config(config: &Config, backend: Arc<dyn TableBackend>) -> Result<Self> {
        // ---
        let dataset = backend.dataset();
        let store = RawArtifactStore::open(config.raw_dir(dataset))?;

        Ok(Pipeline::new(
            config.cities.clone(),
            config.extract_city_delay,
            Box::new(HttpExtractor::new(config, dataset, store)?),
            Box::new(StagingTransformer::new(dataset, config.staged_path(dataset))),
            Box::new(BatchLoader::new(config, backend.clone())),
            Box::new(TableAnalyzer::new(config, backend)),
        ))
    }

    /// Run every stage once.
    ///
    /// Per-city, per-file and per-batch failures are absorbed by the stages.
    /// An `Err` here means a stage could not produce its output at all.
    /// An analysis failure is recorded in the report rather than returned,
    /// so the load counters are never lost.
    pub async fn run(&self) -> Result<RunReport> {
        // ---
        let run_id = Uuid::new_v4();
        self.run_stages(run_id)
            .instrument(info_span!("pipeline", %run_id))
            .await
    }

    async fn run_stages(&self, run_id: Uuid) -> Result<RunReport> {
        // ---
        let started_at = Utc::now();

        info!("Step 1: Extract ({} cities)", self.cities.len());
        let artifacts = extract::extract_all(self.extractor.as_ref(), &self.cities, self.city_delay).await;

        info!("Step 2: Transform");
        let staged = self
            .transformer
            .transform(&artifacts)
            .context("Transform stage failed")?;

        info!("Step 3: Load ({} staged rows)", staged.rows);
        let load = self
            .loader
            .load(&staged.path)
            .await
            .context("Load stage failed")?;

        info!("Step 4: Analyze");
        let (analysis, analysis_error) = match self.analyzer.analyze().await {
            Ok(summary) => (Some(summary), None),
            Err(e) => {
                error!("Analysis failed: {:#}", e);
                (None, Some(format!("{e:#}")))
            }
        };

        info!("Pipeline finished");
        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            artifacts,
            staged_rows: staged.rows,
            load,
            analysis,
            analysis_error,
        })
    }
}
