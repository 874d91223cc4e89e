//! `SupabaseTable` against a fake PostgREST endpoint served by axum.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use airwatch::{Dataset, Filter, Record, SupabaseTable, TableBackend};
use anyhow::Result;
use axum::{
    extract::{Query, RawQuery, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

const TABLE: &str = "air_quality_data";
const KEY: &str = "service-role-key";

#[derive(Default)]
struct Tables {
    rows: Vec<Value>,
    queries: Vec<String>,
    insert_headers: Vec<HeaderMap>,
    /// Server-side `max-rows`: pages never exceed this.
    page_cap: Option<usize>,
    failing: bool,
}

type Shared = Arc<Mutex<Tables>>;

fn cell_text(value: &Value) -> String {
    // ---
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn select_rows(
    State(state): State<Shared>,
    RawQuery(raw): RawQuery,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    // ---
    let mut tables = state.lock().unwrap();
    tables.queries.push(raw.unwrap_or_default());
    if tables.failing {
        return (StatusCode::INTERNAL_SERVER_ERROR, "relation is locked".into());
    }

    let number = |key: &str, default: usize| {
        params
            .get(key)
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(default)
    };
    let offset = number("offset", 0);
    let limit = number("limit", usize::MAX).min(tables.page_cap.unwrap_or(usize::MAX));

    let filters: Vec<(&String, &str)> = params
        .iter()
        .filter_map(|(k, v)| v.strip_prefix("eq.").map(|value| (k, value)))
        .collect();

    let page: Vec<&Value> = tables
        .rows
        .iter()
        .filter(|row| {
            filters
                .iter()
                .all(|(col, value)| row.get(col.as_str()).map(cell_text).as_deref() == Some(*value))
        })
        .skip(offset)
        .take(limit)
        .collect();

    (StatusCode::OK, json!(page).to_string())
}

async fn insert_rows(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(rows): Json<Vec<Value>>,
) -> (StatusCode, String) {
    // ---
    let mut tables = state.lock().unwrap();
    tables.insert_headers.push(headers);
    if tables.failing {
        return (StatusCode::INTERNAL_SERVER_ERROR, "relation is locked".into());
    }
    tables.rows.extend(rows);
    (StatusCode::CREATED, String::new())
}

async fn spawn_postgrest(state: Shared) -> Result<SupabaseTable> {
    // ---
    let app = Router::new()
        .route(&format!("/rest/v1/{TABLE}"), get(select_rows).post(insert_rows))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    // trailing slash is trimmed by the client
    SupabaseTable::new(
        &format!("http://{addr}/"),
        KEY,
        Dataset::AirQuality,
        TABLE.to_string(),
        Duration::from_secs(5),
    )
}

fn record(id: usize, city: &str, hour: u32) -> Record {
    // ---
    let value = json!({
        "id": id,
        "city": city,
        "time": format!("2025-12-11T{hour:02}:00:00Z"),
        "hour": hour,
        "pm2_5": 12.5,
    });
    value.as_object().cloned().unwrap()
}

fn seeded(rows: usize, page_cap: Option<usize>) -> Shared {
    // ---
    let rows = (0..rows)
        .map(|i| Value::Object(record(i + 1, "Delhi", (i % 24) as u32)))
        .collect();
    Arc::new(Mutex::new(Tables {
        rows,
        page_cap,
        ..Default::default()
    }))
}

#[tokio::test]
async fn insert_posts_rows_with_minimal_return() -> Result<()> {
    // ---
    let state: Shared = Arc::default();
    let table = spawn_postgrest(state.clone()).await?;

    let result = table.insert(&[record(1, "Delhi", 0), record(2, "Mumbai", 0)]).await;

    assert!(result.is_ok(), "insert failed: {:?}", result.error);
    assert!(result.data.is_empty());

    let tables = state.lock().unwrap();
    assert_eq!(tables.rows.len(), 2);
    let headers = &tables.insert_headers[0];
    assert_eq!(headers["prefer"], "return=minimal");
    assert_eq!(headers["apikey"], KEY);
    assert_eq!(headers["authorization"], format!("Bearer {KEY}"));
    Ok(())
}

#[tokio::test]
async fn select_pages_past_server_row_cap() -> Result<()> {
    // ---
    let state = seeded(25, Some(10));
    let table = spawn_postgrest(state.clone()).await?;

    let rows = table.select(&[]).await.into_result()?;

    let ids: Vec<u64> = rows.iter().filter_map(|r| r["id"].as_u64()).collect();
    assert_eq!(ids, (1..=25).collect::<Vec<u64>>());

    // pages of 10, 10 and 5 are all capped short; only the empty page ends it
    let queries = state.lock().unwrap().queries.clone();
    assert_eq!(queries.len(), 4);
    for (query, offset) in queries.iter().zip([0, 10, 20, 25]) {
        assert!(query.contains(&format!("offset={offset}")), "query {query}");
        assert!(query.contains("order=city.asc%2Ctime.asc%2Cid.asc"), "query {query}");
    }
    Ok(())
}

#[tokio::test]
async fn select_encodes_equality_filters() -> Result<()> {
    // ---
    let state = seeded(48, None);
    {
        let mut tables = state.lock().unwrap();
        tables.rows.push(Value::Object(record(49, "Mumbai", 3)));
    }
    let table = spawn_postgrest(state.clone()).await?;

    let rows = table
        .select(&[Filter::eq("city", "Delhi"), Filter::eq("hour", 3)])
        .await
        .into_result()?;

    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["city"] == "Delhi" && r["hour"] == 3));

    let first = state.lock().unwrap().queries[0].clone();
    assert!(first.contains("city=eq.Delhi"), "query {first}");
    assert!(first.contains("hour=eq.3"), "query {first}");
    Ok(())
}

#[tokio::test]
async fn server_errors_are_reported_not_raised() -> Result<()> {
    // ---
    let state: Shared = Arc::default();
    state.lock().unwrap().failing = true;
    let table = spawn_postgrest(state).await?;

    let insert = table.insert(&[record(1, "Delhi", 0)]).await;
    let error = insert.error.unwrap_or_default();
    assert!(error.contains("500"), "error {error}");
    assert!(error.contains("relation is locked"), "error {error}");

    let select = table.select(&[]).await;
    assert!(select.data.is_empty());
    assert!(select.error.is_some_and(|e| e.contains("500")));
    Ok(())
}

#[tokio::test]
async fn unknown_filter_column_never_reaches_the_server() -> Result<()> {
    // ---
    let state = seeded(3, None);
    let table = spawn_postgrest(state.clone()).await?;

    let result = table.select(&[Filter::eq("temp_category", "hot")]).await;

    assert!(result
        .error
        .is_some_and(|e| e.contains("Unknown filter column")));
    assert!(state.lock().unwrap().queries.is_empty());
    Ok(())
}
