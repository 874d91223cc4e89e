//! Shared fixtures: fake air-quality and forecast APIs served by axum on a
//! random port.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use airwatch::{config, Config};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use serde_json::{json, Value};

type Responder = dyn Fn(&HashMap<String, String>, usize) -> (StatusCode, String) + Send + Sync;

#[derive(Clone)]
struct Upstream {
    // ---
    hits: Arc<AtomicUsize>,
    respond: Arc<Responder>,
}

/// Handle on a running fake upstream.
pub struct FakeApi {
    // ---
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl FakeApi {
    /// Requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn hourly(
    State(upstream): State<Upstream>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    // ---
    let hit = upstream.hits.fetch_add(1, Ordering::SeqCst);
    (upstream.respond)(&params, hit)
}

/// Serve `respond(query, zero_based_hit_index)` for every request to either
/// `/v1/air-quality` or `/v1/forecast`; the hit counter is shared.
pub async fn spawn_upstream<F>(respond: F) -> Result<FakeApi>
where
    F: Fn(&HashMap<String, String>, usize) -> (StatusCode, String) + Send + Sync + 'static,
{
    // ---
    let hits = Arc::new(AtomicUsize::new(0));
    let state = Upstream {
        hits: hits.clone(),
        respond: Arc::new(respond),
    };

    let app = Router::new()
        .route("/v1/air-quality", get(hourly))
        .route("/v1/forecast", get(hourly))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok(FakeApi {
        url: format!("http://{addr}/v1/air-quality"),
        hits,
    })
}

/// A 24-hour payload starting 2025-12-11T00:00 with constant PM2.5.
pub fn hourly_payload(pm2_5: f64) -> Value {
    // ---
    let time: Vec<String> = (0..24).map(|h| format!("2025-12-11T{h:02}:00")).collect();
    json!({
        "latitude": 28.7,
        "longitude": 77.1,
        "hourly": {
            "time": time,
            "pm2_5": vec![pm2_5; 24],
            "pm10": vec![pm2_5 * 1.5; 24],
            "ozone": vec![30.0; 24],
            "uv_index": vec![0.0; 24],
        }
    })
}

/// 24 hours of weather starting 2025-12-11T00:00: temperature climbs one
/// degree per hour from `base_temp`, humidity and wind are constant.
pub fn weather_payload(base_temp: f64) -> Value {
    // ---
    let time: Vec<String> = (0..24).map(|h| format!("2025-12-11T{h:02}:00")).collect();
    let temperature: Vec<f64> = (0..24).map(|h| base_temp + h as f64).collect();
    json!({
        "latitude": 28.7,
        "longitude": 77.1,
        "hourly": {
            "time": time,
            "temperature_2m": temperature,
            "relativehumidity_2m": vec![50.0; 24],
            "windspeed_10m": vec![12.0; 24],
        }
    })
}

/// Configuration pointed at `api_url` (and the forecast route next to it)
/// and `data_dir`, with all sleeps zeroed.
pub fn test_config(api_url: &str, data_dir: &Path, cities: &str) -> Result<Config> {
    // ---
    let vars: HashMap<&str, String> = HashMap::from([
        ("AQ_API_URL", api_url.to_string()),
        ("WEATHER_API_URL", api_url.replace("/v1/air-quality", "/v1/forecast")),
        ("AQ_CITIES", cities.to_string()),
        ("DATA_DIR", data_dir.display().to_string()),
        ("HTTP_TIMEOUT_SECS", "5".to_string()),
        ("EXTRACT_RETRY_DELAY_MS", "0".to_string()),
        ("EXTRACT_CITY_DELAY_MS", "0".to_string()),
        ("LOAD_BATCH_SIZE", "10".to_string()),
        ("LOAD_RETRY_DELAY_MS", "0".to_string()),
    ]);
    let lookup = |key: &str| vars.get(key).cloned();
    config::load_from(&lookup)
}
