//! Supabase backend over the PostgREST HTTP API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use super::{table_columns, validate_filters, Filter, Record, TableBackend, TableResult};
use crate::Dataset;

// ---

/// Rows requested per page. The server's `max-rows` may cap pages lower.
const PAGE_SIZE: usize = 1000;

/// Safety limit on select pagination.
const MAX_PAGES: usize = 10_000;

pub struct SupabaseTable {
    // ---
    client: reqwest::Client,
    dataset: Dataset,
    endpoint: String,
}

impl SupabaseTable {
    // ---
    pub fn new(
        url: &str,
        key: &str,
        dataset: Dataset,
        table: String,
        timeout: Duration,
    ) -> Result<Self> {
        // ---
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(key).context("SUPABASE_KEY is not a valid header value")?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {key}"))
                .context("SUPABASE_KEY is not a valid header value")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to build Supabase HTTP client")?;

        Ok(SupabaseTable {
            client,
            dataset,
            endpoint: format!("{}/rest/v1/{}", url.trim_end_matches('/'), table),
        })
    }

    async fn insert_rows(&self, rows: &[Record]) -> Result<(), String> {
        // ---
        let response = self
            .client
            .post(&self.endpoint)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP status {status}: {body}"));
        }
        Ok(())
    }

    async fn select_rows(&self, filters: &[Filter]) -> Result<Vec<Record>, String> {
        // ---
        validate_filters(table_columns(self.dataset), filters)?;

        // id breaks ties so limit/offset pages never skip or repeat rows
        let mut query: Vec<(String, String)> = vec![
            ("select".into(), "*".into()),
            ("order".into(), "city.asc,time.asc,id.asc".into()),
        ];
        for filter in filters {
            let value = match &filter.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            query.push((filter.column.clone(), format!("eq.{value}")));
        }

        let mut all_rows = Vec::new();
        let mut offset = 0;

        for page in 0..MAX_PAGES {
            tracing::debug!("Fetching page {} (offset {}) from {}", page + 1, offset, self.endpoint);

            let response = self
                .client
                .get(&self.endpoint)
                .query(&query)
                .query(&[("limit", PAGE_SIZE), ("offset", offset)])
                .send()
                .await
                .map_err(|e| e.to_string())?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(format!("HTTP status {status}: {body}"));
            }

            let rows: Vec<Record> = response.json().await.map_err(|e| e.to_string())?;
            // A short page only means the server capped it; stop on an empty one
            if rows.is_empty() {
                break;
            }
            offset += rows.len();
            all_rows.extend(rows);
        }

        tracing::debug!("Fetched {} rows from {}", all_rows.len(), self.endpoint);
        Ok(all_rows)
    }
}

#[async_trait]
impl TableBackend for SupabaseTable {
    // ---
    fn name(&self) -> &'static str {
        "supabase"
    }

    fn dataset(&self) -> Dataset {
        self.dataset
    }

    async fn insert(&self, rows: &[Record]) -> TableResult {
        // ---
        match self.insert_rows(rows).await {
            Ok(()) => TableResult::ok(Vec::new()),
            Err(e) => TableResult::failed(e),
        }
    }

    async fn select(&self, filters: &[Filter]) -> TableResult {
        // ---
        match self.select_rows(filters).await {
            Ok(rows) => TableResult::ok(rows),
            Err(e) => TableResult::failed(e),
        }
    }
}
