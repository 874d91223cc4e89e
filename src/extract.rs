//! Extraction stage: fetch one city's hourly payload from the upstream API.
//!
//! Extraction never fails its caller. Every call ends in a saved artifact:
//! - `raw`   – the verbatim API JSON
//! - `empty` – the API answered with an empty/falsy body (not retried)
//! - `error` – every attempt failed; holds the last error text

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{Artifact, ArtifactTag, City, Config, Dataset, Extractor, RawArtifactStore};

// ---

/// Why a single fetch attempt produced no payload.
#[derive(Debug, Error, PartialEq)]
pub enum FetchError {
    /// Empty or falsy body; saved immediately, never retried.
    #[error("Empty API response")]
    Empty,

    /// Network, status or parse failure; retried.
    #[error("{0}")]
    Transient(String),
}

/// Classify a response body.
pub fn classify_body(body: &[u8]) -> Result<Value, FetchError> {
    // ---
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(FetchError::Empty);
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| FetchError::Transient(format!("Invalid JSON body: {e}")))?;

    if is_falsy(&value) {
        return Err(FetchError::Empty);
    }
    Ok(value)
}

fn is_falsy(value: &Value) -> bool {
    // ---
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Query string for one city's request.
///
/// Times are left in UTC (no `timezone` parameter) so every dataset shares
/// the same hour-of-day convention.
pub fn query_params(dataset: Dataset, city: &City, forecast_days: u32) -> Vec<(&'static str, String)> {
    // ---
    let mut params = vec![
        ("latitude", city.latitude.to_string()),
        ("longitude", city.longitude.to_string()),
        ("hourly", dataset.hourly_query_param()),
    ];
    if dataset == Dataset::Weather {
        params.push(("forecast_days", forecast_days.to_string()));
    }
    params
}

/// Extractor backed by the Open-Meteo style HTTP API.
pub struct HttpExtractor {
    // ---
    client: reqwest::Client,
    dataset: Dataset,
    api_url: String,
    forecast_days: u32,
    store: RawArtifactStore,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpExtractor {
    // ---
    pub fn new(config: &Config, dataset: Dataset, store: RawArtifactStore) -> Result<Self> {
        // ---
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(HttpExtractor {
            client,
            dataset,
            api_url: config.api_url_for(dataset).to_string(),
            forecast_days: config.weather_forecast_days,
            store,
            max_attempts: config.extract_max_attempts,
            retry_delay: config.extract_retry_delay,
        })
    }

    async fn fetch_once(&self, city: &City) -> Result<Value, FetchError> {
        // ---
        let response = self
            .client
            .get(&self.api_url)
            .query(&query_params(self.dataset, city, self.forecast_days))
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Transient(format!("HTTP status {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        classify_body(&body)
    }

    fn persist(&self, city: &City, tag: ArtifactTag, payload: &Value) -> Artifact {
        // ---
        match self.store.save(&city.name, tag, payload) {
            Ok(artifact) => artifact,
            Err(e) => {
                // The reference points at the directory; the transformer skips it
                error!("Failed to save {} artifact for {}: {:#}", tag.as_str(), city.name, e);
                Artifact {
                    city: city.name.clone(),
                    tag: ArtifactTag::Error,
                    path: self.store.dir().to_path_buf(),
                }
            }
        }
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    // ---
    async fn fetch(&self, city: &City) -> Artifact {
        // ---
        info!(
            "Fetching {} for {} ({}, {})",
            self.dataset.name(),
            city.name,
            city.latitude,
            city.longitude
        );

        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self.fetch_once(city).await {
                Ok(payload) => {
                    let artifact = self.persist(city, ArtifactTag::Raw, &payload);
                    info!("Success: {} saved to {}", city.name, artifact.path.display());
                    return artifact;
                }
                Err(FetchError::Empty) => {
                    warn!("Empty API response for {}", city.name);
                    let sentinel = json!({ "city": city.name, "error": FetchError::Empty.to_string() });
                    return self.persist(city, ArtifactTag::Empty, &sentinel);
                }
                Err(FetchError::Transient(e)) => {
                    warn!(
                        "Attempt {}/{} failed for {}: {}",
                        attempt, self.max_attempts, city.name, e
                    );
                    last_error = e;

                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        let sentinel = json!({ "city": city.name, "error": last_error });
        let artifact = self.persist(city, ArtifactTag::Error, &sentinel);
        error!(
            "FAILED {} after {} attempts. Error file saved to {}",
            city.name,
            self.max_attempts,
            artifact.path.display()
        );
        artifact
    }
}

/// Fetch every city in order, pausing `city_delay` between cities.
pub async fn extract_all(
    extractor: &dyn Extractor,
    cities: &[City],
    city_delay: Duration,
) -> Vec<Artifact> {
    // ---
    let mut artifacts = Vec::with_capacity(cities.len());

    for (i, city) in cities.iter().enumerate() {
        if i > 0 && !city_delay.is_zero() {
            tokio::time::sleep(city_delay).await;
        }
        artifacts.push(extractor.fetch(city).await);
    }

    let failed = artifacts
        .iter()
        .filter(|a| a.tag != ArtifactTag::Raw)
        .count();
    info!(
        "Extraction complete: {} artifacts ({} without data)",
        artifacts.len(),
        failed
    );
    artifacts
}
