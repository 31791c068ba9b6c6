//! Read-only HTTP surface over a loaded [`Dataset`].
//!
//! Every endpoint accepts the same filter query parameters (`from`, `to`,
//! `tech`, `region`, `city`, `site`) and recomputes its answer from the
//! shared in-memory records.

mod error;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use network_client::domain::{Tech, UsageRecord};
use serde::{Deserialize, Serialize};

pub use error::ApiError;

use crate::{
    aggregate::{
        busy_hour_of_day, busy_hours_by_site, compute_busy_hour, compute_tables, congested_records,
        kpis, rank_cells_in_window, site_hour, BusyHour, BusyHourOfDayRow, CellCongestion,
        CongestedRecord, HourWindow, Kpis, TableName,
    },
    config::AnalysisConfig,
    dataset::Dataset,
    export,
    filter::{parse_date, split_list, UsageFilter},
};

#[derive(Clone)]
pub struct AppState {
    dataset: Arc<Dataset>,
    analysis: Arc<AnalysisConfig>,
}

impl AppState {
    pub fn new(dataset: Dataset, analysis: AnalysisConfig) -> Self {
        Self {
            dataset: Arc::new(dataset),
            analysis: Arc::new(analysis),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/summary", get(summary))
        .route("/api/busy_hour", get(busy_hours))
        .route("/api/busy_hour/:site_id", get(busy_hour_for_site))
        .route("/api/busy_hour_of_day", get(busy_hours_of_day))
        .route("/api/prime_time", get(prime_time))
        .route("/api/congested", get(congested))
        .route("/api/tables/:name", get(table_csv))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub tech: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub site: Option<String>,
}

impl FilterParams {
    pub fn to_filter(&self) -> Result<UsageFilter, ApiError> {
        let date = |name: &str, v: &Option<String>| {
            v.as_deref()
                .map(parse_date)
                .transpose()
                .map_err(|e| ApiError::BadRequest(format!("invalid {name} date: {e}")))
        };
        let list = |v: &Option<String>| v.as_deref().map(split_list).unwrap_or_default();

        let techs = list(&self.tech)
            .iter()
            .map(|t| t.parse::<Tech>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;

        Ok(UsageFilter {
            from: date("from", &self.from)?,
            to: date("to", &self.to)?,
            techs,
            regions: list(&self.region),
            cities: list(&self.city),
            sites: list(&self.site),
        })
    }
}

fn select<'a>(
    state: &'a AppState,
    params: &FilterParams,
) -> Result<Vec<&'a UsageRecord>, ApiError> {
    let filter = params.to_filter()?;
    Ok(state.dataset.select(&filter))
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub fingerprint: String,
    pub loaded_rows: usize,
    #[serde(flatten)]
    pub kpis: Kpis,
}

async fn summary(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> Result<Json<Summary>, ApiError> {
    metrics::counter!("api_requests_total", "endpoint" => "summary").increment(1);
    let records = select(&state, &params)?;
    Ok(Json(Summary {
        fingerprint: state.dataset.fingerprint().to_string(),
        loaded_rows: state.dataset.len(),
        kpis: kpis(&records)?,
    }))
}

async fn busy_hours(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> Result<Json<Vec<BusyHour>>, ApiError> {
    metrics::counter!("api_requests_total", "endpoint" => "busy_hour").increment(1);
    let records = select(&state, &params)?;
    let rows = busy_hours_by_site(records, state.analysis.busy_hour_percentile)?;
    Ok(Json(rows))
}

async fn busy_hour_for_site(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    Query(params): Query<FilterParams>,
) -> Result<Json<BusyHour>, ApiError> {
    metrics::counter!("api_requests_total", "endpoint" => "busy_hour_site").increment(1);
    let records = select(&state, &params)?;
    let busy = compute_busy_hour(records, &site_id, state.analysis.busy_hour_percentile)?;
    Ok(Json(busy))
}

async fn busy_hours_of_day(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> Result<Json<Vec<BusyHourOfDayRow>>, ApiError> {
    metrics::counter!("api_requests_total", "endpoint" => "busy_hour_of_day").increment(1);
    let records = select(&state, &params)?;
    Ok(Json(busy_hour_of_day(&site_hour(&records)?)))
}

#[derive(Debug, Default, Deserialize)]
pub struct PrimeTimeParams {
    pub start_hour: Option<u8>,
    pub end_hour: Option<u8>,
    pub top_n: Option<usize>,
}

async fn prime_time(
    State(state): State<AppState>,
    Query(window): Query<PrimeTimeParams>,
    Query(params): Query<FilterParams>,
) -> Result<Json<Vec<CellCongestion>>, ApiError> {
    metrics::counter!("api_requests_total", "endpoint" => "prime_time").increment(1);
    let defaults = state.analysis.prime_time;
    let window_hours = HourWindow::new(
        window.start_hour.unwrap_or(defaults.start_hour()),
        window.end_hour.unwrap_or(defaults.end_hour()),
    )?;

    let records = select(&state, &params)?;
    let mut ranking = rank_cells_in_window(records, window_hours);
    ranking.truncate(window.top_n.unwrap_or(state.analysis.top_n));
    Ok(Json(ranking))
}

#[derive(Debug, Default, Deserialize)]
pub struct CongestedParams {
    pub threshold: Option<f64>,
}

async fn congested(
    State(state): State<AppState>,
    Query(congestion): Query<CongestedParams>,
    Query(params): Query<FilterParams>,
) -> Result<Json<Vec<CongestedRecord>>, ApiError> {
    metrics::counter!("api_requests_total", "endpoint" => "congested").increment(1);
    let threshold = congestion
        .threshold
        .unwrap_or(state.analysis.congestion_threshold_pct);
    let records = select(&state, &params)?;
    let rows = congested_records(records, Some(state.analysis.prime_time), threshold)?;
    Ok(Json(rows))
}

async fn table_csv(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<FilterParams>,
) -> Result<impl IntoResponse, ApiError> {
    metrics::counter!("api_requests_total", "endpoint" => "tables").increment(1);
    let table: TableName = name.parse().map_err(ApiError::NotFound)?;
    let records = select(&state, &params)?;
    let tables = compute_tables(&records, &state.analysis)?;
    let body =
        export::table_to_csv(&tables, table).map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{table}.csv\""),
            ),
            (header::ETAG, format!("\"{}\"", state.dataset.fingerprint())),
        ],
        body,
    ))
}
