use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use telemetry_client::domain::{Device, NewExportRecord, Reading};
use telemetry_client::StoreError;

use crate::broadcast::{BroadcastRegistry, SubscriberId};
use crate::bucketize::{bucketize, Bucket};
use crate::config::TariffConfig;
use crate::cost::{project_cost, CostProjection};
use crate::error::EngineError;
use crate::export::{build_export, ExportFormat, ExportRequest};
use crate::ingest::{Ingestor, ReadingPayload};
use crate::range::{default_interval, parse_timezone, resolve_range, RangeQuery, ResolvedRange};
use crate::store::RowStore;
use crate::summary::{build_summary, Summary};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RowStore>,
    pub ingestor: Arc<Ingestor>,
    pub broadcast: Arc<BroadcastRegistry>,
    pub tariff: TariffConfig,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/devices/:id/readings", post(ingest_reading))
        .route("/devices/:id/history", get(history))
        .route("/devices/:id/summary", get(summary))
        .route("/devices/:id/cost", get(cost))
        .route("/devices/:id/export", get(export))
        .route("/devices/:id/live", get(live))
        .with_state(state)
}

/// Error envelope for the API. Validation problems are the caller's
/// fault; storage failures are ours.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            EngineError::Storage(StoreError::UnknownDevice(id)) => {
                Self::new(StatusCode::NOT_FOUND, format!("unknown device: {id}"))
            }
            EngineError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage failure")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::from(EngineError::Storage(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// Device lookup plus api-key check for the write/live paths.
async fn authenticate(
    store: &dyn RowStore,
    device_id: &str,
    headers: &HeaderMap,
) -> Result<Device, ApiError> {
    let device = store
        .device(device_id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("unknown device: {device_id}")))?;

    let presented = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented != device.api_key {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid api key"));
    }

    Ok(device)
}

async fn ingest_reading(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ReadingPayload>,
) -> Result<Json<Reading>, ApiError> {
    authenticate(state.store.as_ref(), &device_id, &headers).await?;
    let stored = state.ingestor.ingest(&device_id, &payload).await?;
    Ok(Json(stored))
}

// serde_urlencoded cannot flatten RangeQuery into these structs, so
// the range fields are spelled out per handler.
#[derive(Debug, Default, Deserialize)]
struct HistoryParams {
    period: Option<String>,
    from: Option<String>,
    to: Option<String>,
    timezone: Option<String>,
    interval_seconds: Option<i64>,
}

impl HistoryParams {
    fn range(&self) -> RangeQuery {
        RangeQuery {
            period: self.period.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            timezone: self.timezone.clone(),
        }
    }
}

/// Resolve the range in the request timezone, falling back to the
/// device's own zone when the caller omits one. Unknown devices fall
/// through: queries against them yield empty results, not errors.
async fn resolve_for_device(
    store: &dyn RowStore,
    device_id: &str,
    range: &RangeQuery,
) -> Result<(ResolvedRange, chrono_tz::Tz, Vec<Reading>), ApiError> {
    let mut range = range.clone();
    if range.timezone.is_none() {
        if let Some(device) = store.device(device_id).await? {
            range.timezone = Some(device.timezone);
        }
    }

    let tz = parse_timezone(range.timezone.as_deref()).map_err(ApiError::from)?;
    let resolved = resolve_range(&range, chrono::Utc::now().timestamp())?;
    let readings = store
        .readings_in_range(device_id, resolved.from, resolved.to)
        .await?;

    Ok((resolved, tz, readings))
}

async fn history(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Bucket>>, ApiError> {
    let (resolved, _tz, readings) =
        resolve_for_device(state.store.as_ref(), &device_id, &params.range()).await?;

    let interval = match params.interval_seconds {
        Some(i) if i > 0 => i,
        Some(i) => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                format!("interval_seconds must be positive, got {i}"),
            ))
        }
        None => default_interval(resolved.duration_seconds),
    };

    Ok(Json(bucketize(&readings, interval)))
}

async fn summary(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Summary>, ApiError> {
    let (resolved, tz, readings) =
        resolve_for_device(state.store.as_ref(), &device_id, &params.range()).await?;

    let interval = params
        .interval_seconds
        .filter(|i| *i > 0)
        .unwrap_or_else(|| default_interval(resolved.duration_seconds));

    Ok(Json(build_summary(&readings, tz, interval)))
}

#[derive(Debug, Default, Deserialize)]
struct CostParams {
    period: Option<String>,
    from: Option<String>,
    to: Option<String>,
    timezone: Option<String>,
    tariff: Option<f64>,
    symbol: Option<String>,
}

async fn cost(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(params): Query<CostParams>,
) -> Result<Json<CostProjection>, ApiError> {
    let range = RangeQuery {
        period: params.period.clone(),
        from: params.from.clone(),
        to: params.to.clone(),
        timezone: params.timezone.clone(),
    };
    let (_resolved, _tz, readings) =
        resolve_for_device(state.store.as_ref(), &device_id, &range).await?;

    let tariff = params.tariff.unwrap_or(state.tariff.base_rate);
    let symbol = params
        .symbol
        .unwrap_or_else(|| state.tariff.currency_symbol.clone());

    Ok(Json(project_cost(&readings, tariff, &symbol)))
}

#[derive(Debug, Deserialize)]
struct ExportParams {
    period: Option<String>,
    from: Option<String>,
    to: Option<String>,
    timezone: Option<String>,
    format: ExportFormat,
    /// Comma-separated metric keys from the catalogue.
    metrics: String,
    #[serde(default = "default_sampling")]
    sampling: String,
    #[serde(default)]
    include_metadata: bool,
}

fn default_sampling() -> String {
    "all".to_string()
}

async fn export(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let range = RangeQuery {
        period: params.period.clone(),
        from: params.from.clone(),
        to: params.to.clone(),
        timezone: params.timezone.clone(),
    };
    let (resolved, _tz, readings) =
        resolve_for_device(state.store.as_ref(), &device_id, &range).await?;

    let request = ExportRequest {
        format: params.format,
        metrics: params
            .metrics
            .split(',')
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect(),
        sampling: params.sampling,
        include_metadata: params.include_metadata,
    };

    let dataset = build_export(&device_id, &readings, resolved.from, resolved.to, &request)?;

    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state
        .store
        .record_export(&NewExportRecord {
            user_id,
            format: request.format.as_str().to_string(),
            metrics: request.metrics.clone(),
            range_from: resolved.from,
            range_to: resolved.to,
        })
        .await?;

    match request.format {
        ExportFormat::Csv => {
            let body = encode_csv(&dataset)
                .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
            let disposition = format!("attachment; filename=\"{}\"", dataset.filename);
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response())
        }
        // XLSX byte encoding lives outside this service; hand the
        // dataset to the caller as-is.
        ExportFormat::Excel => Ok(Json(dataset).into_response()),
    }
}

fn encode_csv(dataset: &crate::export::ExportDataset) -> Result<String, anyhow::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&dataset.columns)?;

    let has_metadata = dataset
        .columns
        .last()
        .is_some_and(|c| c == "Metadata");
    for row in &dataset.rows {
        let mut record: Vec<String> = Vec::with_capacity(dataset.columns.len());
        record.push(row.timestamp.to_string());
        record.push(row.iso8601.clone());
        for value in &row.values {
            record.push(value.map(|v| v.to_string()).unwrap_or_default());
        }
        if has_metadata {
            record.push(row.metadata.clone().unwrap_or_default());
        }
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("csv flush failed: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}

/// Deregisters the subscriber when the SSE connection tears down.
struct SubscriptionGuard {
    registry: Arc<BroadcastRegistry>,
    id: SubscriberId,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.id);
    }
}

async fn live(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    authenticate(state.store.as_ref(), &device_id, &headers).await?;

    let (id, mut rx) = state.broadcast.subscribe();
    let guard = SubscriptionGuard {
        registry: state.broadcast.clone(),
        id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        // Connection-accepted signal before any reading arrives.
        yield Ok(Event::default().comment("connected"));
        while let Some(reading) = rx.recv().await {
            // The registry fans out every device; this connection only
            // watches one.
            if reading.device_id == device_id {
                yield Event::default().event("reading").json_data(reading.as_ref());
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
