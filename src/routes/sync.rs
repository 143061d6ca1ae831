use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::matches::{LoadQuery, MatchSummary, SaveRequest, SaveResponse, SavedMatchItem},
    error::AppError,
    services::sync_service,
    state::SharedState,
};

/// Routes saving the live match and loading saved ones.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/match/save", post(save_match))
        .route("/matches", get(list_matches))
        .route("/matches/{id}/load", post(load_match))
}

/// Save the live match under a name.
#[utoipa::path(
    post,
    path = "/match/save",
    tag = "sync",
    request_body = SaveRequest,
    responses(
        (status = 200, description = "Match saved", body = SaveResponse),
        (status = 503, description = "Storage unavailable; the save may be retried")
    )
)]
pub async fn save_match(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SaveRequest>>,
) -> Result<Json<SaveResponse>, AppError> {
    let response = sync_service::save_match(&state, payload).await?;
    Ok(Json(response))
}

/// List saved matches, most recently updated first.
#[utoipa::path(
    get,
    path = "/matches",
    tag = "sync",
    responses((status = 200, description = "Saved matches", body = [SavedMatchItem]))
)]
pub async fn list_matches(
    State(state): State<SharedState>,
) -> Result<Json<Vec<SavedMatchItem>>, AppError> {
    let items = sync_service::list_matches(&state).await?;
    Ok(Json(items))
}

/// Load a saved match, read-only unless `as_owner` is set.
#[utoipa::path(
    post,
    path = "/matches/{id}/load",
    tag = "sync",
    params(
        ("id" = String, Path, description = "Identifier of the match to load"),
        LoadQuery
    ),
    responses(
        (status = 200, description = "Match loaded", body = MatchSummary),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn load_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LoadQuery>,
) -> Result<Json<MatchSummary>, AppError> {
    let summary = sync_service::load_match(&state, id, query).await?;
    Ok(Json(summary))
}
