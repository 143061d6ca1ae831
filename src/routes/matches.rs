use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::{
        matches::{
            ActionResponse, CounterRequest, MatchSummary, PeriodRequest, SetupRequest, ShotRequest,
        },
        stats::{FeedResponse, StatsQuery, StatsResponse},
    },
    error::AppError,
    services::match_service,
    state::SharedState,
};

/// Routes recording the live match.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/match",
            get(current_match).post(start_match).delete(reset_match),
        )
        .route("/match/period", post(set_period))
        .route("/match/actions/counter", post(record_counter))
        .route("/match/actions/shot", post(record_shot))
        .route("/match/undo", post(undo))
        .route("/match/redo", post(redo))
        .route("/match/stats", get(stats))
        .route("/match/feed", get(feed))
}

/// Complete the setup of a new match and start recording.
#[utoipa::path(
    post,
    path = "/match",
    tag = "match",
    request_body = SetupRequest,
    responses(
        (status = 200, description = "Match started", body = MatchSummary),
        (status = 400, description = "Invalid roster or configuration"),
        (status = 409, description = "A match is already active")
    )
)]
pub async fn start_match(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SetupRequest>>,
) -> Result<Json<MatchSummary>, AppError> {
    let summary = match_service::start_match(&state, payload).await?;
    Ok(Json(summary))
}

/// Return the live match.
#[utoipa::path(
    get,
    path = "/match",
    tag = "match",
    responses(
        (status = 200, description = "Live match", body = MatchSummary),
        (status = 404, description = "No active match")
    )
)]
pub async fn current_match(
    State(state): State<SharedState>,
) -> Result<Json<MatchSummary>, AppError> {
    let summary = match_service::current_match(&state).await?;
    Ok(Json(summary))
}

/// Drop the live match and return to idle.
#[utoipa::path(
    delete,
    path = "/match",
    tag = "match",
    responses(
        (status = 204, description = "Match reset"),
        (status = 409, description = "No match to reset")
    )
)]
pub async fn reset_match(State(state): State<SharedState>) -> Result<StatusCode, AppError> {
    match_service::reset_match(&state).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Switch the period new actions are recorded in.
#[utoipa::path(
    post,
    path = "/match/period",
    tag = "match",
    request_body = PeriodRequest,
    responses((status = 200, description = "Period handled", body = ActionResponse))
)]
pub async fn set_period(
    State(state): State<SharedState>,
    Json(payload): Json<PeriodRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let response = match_service::set_period(&state, payload).await?;
    Ok(Json(response))
}

/// Increment a tallied statistic.
#[utoipa::path(
    post,
    path = "/match/actions/counter",
    tag = "match",
    request_body = CounterRequest,
    responses((status = 200, description = "Counter handled", body = ActionResponse))
)]
pub async fn record_counter(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CounterRequest>>,
) -> Result<Json<ActionResponse>, AppError> {
    let response = match_service::record_counter(&state, payload).await?;
    Ok(Json(response))
}

/// Chart a shot.
#[utoipa::path(
    post,
    path = "/match/actions/shot",
    tag = "match",
    request_body = ShotRequest,
    responses((status = 200, description = "Shot handled", body = ActionResponse))
)]
pub async fn record_shot(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<ShotRequest>>,
) -> Result<Json<ActionResponse>, AppError> {
    let response = match_service::record_shot(&state, payload).await?;
    Ok(Json(response))
}

/// Revert the most recent action.
#[utoipa::path(
    post,
    path = "/match/undo",
    tag = "match",
    responses((status = 200, description = "Undo handled", body = ActionResponse))
)]
pub async fn undo(State(state): State<SharedState>) -> Result<Json<ActionResponse>, AppError> {
    let response = match_service::undo(&state).await?;
    Ok(Json(response))
}

/// Re-apply the most recently undone action.
#[utoipa::path(
    post,
    path = "/match/redo",
    tag = "match",
    responses((status = 200, description = "Redo handled", body = ActionResponse))
)]
pub async fn redo(State(state): State<SharedState>) -> Result<Json<ActionResponse>, AppError> {
    let response = match_service::redo(&state).await?;
    Ok(Json(response))
}

/// Derived statistics, optionally restricted to one period.
#[utoipa::path(
    get,
    path = "/match/stats",
    tag = "match",
    params(StatsQuery),
    responses((status = 200, description = "Statistics", body = StatsResponse))
)]
pub async fn stats(
    State(state): State<SharedState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, AppError> {
    let response = match_service::stats(&state, query).await?;
    Ok(Json(response))
}

/// Activity feed, most recent first.
#[utoipa::path(
    get,
    path = "/match/feed",
    tag = "match",
    responses((status = 200, description = "Activity feed", body = FeedResponse))
)]
pub async fn feed(State(state): State<SharedState>) -> Result<Json<FeedResponse>, AppError> {
    let response = match_service::feed(&state).await?;
    Ok(Json(response))
}
