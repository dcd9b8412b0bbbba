use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use talon_core::{ConfigError, Credentials, IntervalBounds, SeatPreference, StationCode, WatchPlan};
use talon_session::{PollStrategy, SessionHandle, SessionState};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/watches", post(create_watch).get(list_watches))
        .route("/v1/watches/{id}", get(get_watch).delete(cancel_watch))
        .route("/v1/watches/{id}/events", get(watch_events))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateWatchRequest {
    pub origin: String,
    pub destination: String,
    pub travel_date: NaiveDate,
    pub window_start: NaiveTime,
    pub window_end: NaiveTime,
    #[serde(default = "default_preference")]
    pub preference: SeatPreference,
    pub interval_min_secs: Option<u64>,
    pub interval_max_secs: Option<u64>,
    #[serde(default)]
    pub strategy: PollStrategy,
    /// Credentials override; the configured defaults apply when omitted.
    pub member_id: Option<String>,
    pub password: Option<String>,
}

fn default_preference() -> SeatPreference {
    SeatPreference::GeneralFirst
}

#[derive(Debug, Serialize)]
pub struct CreateWatchResponse {
    pub watch_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct WatchView {
    pub id: Uuid,
    pub origin: String,
    pub destination: String,
    pub travel_date: NaiveDate,
    pub window_start: NaiveTime,
    pub window_end: NaiveTime,
    pub preference: SeatPreference,
    pub strategy: PollStrategy,
    pub state: SessionState,
    pub iteration: u64,
    pub started_at: DateTime<Utc>,
    pub confirmation_code: Option<String>,
}

fn view(handle: &SessionHandle) -> WatchView {
    let status = handle.status();
    let plan = handle.plan();
    WatchView {
        id: handle.id(),
        origin: plan.origin.to_string(),
        destination: plan.destination.to_string(),
        travel_date: plan.travel_date,
        window_start: plan.window_start,
        window_end: plan.window_end,
        preference: plan.preference,
        strategy: handle.strategy(),
        state: status.state,
        iteration: status.iteration,
        started_at: status.started_at,
        confirmation_code: status.confirmation_code,
    }
}

fn invalid(err: ConfigError) -> AppError {
    AppError::ValidationError(err.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/watches
/// Validate the plan and spawn one polling session for it.
pub async fn create_watch(
    State(state): State<AppState>,
    Json(req): Json<CreateWatchRequest>,
) -> Result<(StatusCode, Json<CreateWatchResponse>), AppError> {
    let plan = WatchPlan {
        origin: StationCode::parse(&req.origin).map_err(invalid)?,
        destination: StationCode::parse(&req.destination).map_err(invalid)?,
        travel_date: req.travel_date,
        window_start: req.window_start,
        window_end: req.window_end,
        preference: req.preference,
        interval: IntervalBounds::new(
            req.interval_min_secs
                .unwrap_or(state.defaults.interval.min_secs),
            req.interval_max_secs
                .unwrap_or(state.defaults.interval.max_secs),
        )
        .map_err(invalid)?,
    };

    let credentials = match (req.member_id, req.password) {
        (Some(member_id), Some(password)) => Credentials::new(member_id, password),
        _ => state.defaults.credentials.clone(),
    };

    let handle = talon_session::spawn(
        plan,
        credentials,
        req.strategy,
        state.defaults.scan_retry,
        state.connector.clone(),
        state.notifier.clone(),
    )
    .map_err(invalid)?;

    let watch_id = state.watches.insert(handle).await;
    Ok((StatusCode::CREATED, Json(CreateWatchResponse { watch_id })))
}

/// GET /v1/watches
pub async fn list_watches(State(state): State<AppState>) -> Json<Vec<WatchView>> {
    let mut views: Vec<WatchView> = state
        .watches
        .list()
        .await
        .iter()
        .map(|h| view(h))
        .collect();
    views.sort_by_key(|v| v.started_at);
    Json(views)
}

/// GET /v1/watches/:id
pub async fn get_watch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WatchView>, AppError> {
    let handle = state
        .watches
        .get(&id)
        .await
        .ok_or_else(|| AppError::NotFoundError(format!("watch {id} not found")))?;
    Ok(Json(view(&handle)))
}

/// GET /v1/watches/:id/events
/// Bridge the session's broadcast stream onto SSE.
pub async fn watch_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let handle = state
        .watches
        .get(&id)
        .await
        .ok_or_else(|| AppError::NotFoundError(format!("watch {id} not found")))?;

    let rx = handle.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => serde_json::to_string(&event)
                .ok()
                .map(|data| Ok(Event::default().event("status").data(data))),
            // Lagged receivers skip what they missed.
            Err(_) => None,
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// DELETE /v1/watches/:id
/// External termination: abort the session task and forget the watch.
pub async fn cancel_watch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let handle = state
        .watches
        .remove(&id)
        .await
        .ok_or_else(|| AppError::NotFoundError(format!("watch {id} not found")))?;
    handle.abort();
    tracing::info!(watch = %id, "watch cancelled by operator");
    Ok(StatusCode::NO_CONTENT)
}
