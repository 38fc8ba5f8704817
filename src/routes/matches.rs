use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::matches::{CreateMatchRequest, ListMatchesQuery, MatchListItem, MatchSnapshot},
    error::AppError,
    services::match_service,
    state::SharedState,
};

/// Routes managing stored matches.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches", get(list_matches).post(create_match))
        .route("/matches/{id}", get(get_match).delete(delete_match))
}

/// Create a pending match with an empty sequence per player.
#[utoipa::path(
    post,
    path = "/matches",
    tag = "matches",
    request_body = CreateMatchRequest,
    responses(
        (status = 200, description = "Match created", body = MatchSnapshot),
        (status = 400, description = "Invalid roster or duration"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_match(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateMatchRequest>>,
) -> Result<Json<MatchSnapshot>, AppError> {
    let snapshot = match_service::create_match(&state, payload).await?;
    Ok(Json(snapshot))
}

/// List stored matches, newest first.
#[utoipa::path(
    get,
    path = "/matches",
    tag = "matches",
    params(ListMatchesQuery),
    responses(
        (status = 200, description = "Stored matches", body = [MatchListItem]),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn list_matches(
    State(state): State<SharedState>,
    Query(query): Query<ListMatchesQuery>,
) -> Result<Json<Vec<MatchListItem>>, AppError> {
    let matches = match_service::list_matches(&state, query.status).await?;
    Ok(Json(matches))
}

/// Full state of a match, including sequences and scoreboard.
#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Identifier of the match")),
    responses(
        (status = 200, description = "Match state", body = MatchSnapshot),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn get_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSnapshot>, AppError> {
    let snapshot = match_service::get_match(&state, id).await?;
    Ok(Json(snapshot))
}

/// Delete a match that never started.
#[utoipa::path(
    delete,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Identifier of the match")),
    responses(
        (status = 204, description = "Match deleted"),
        (status = 404, description = "Unknown match"),
        (status = 409, description = "Match already started")
    )
)]
pub async fn delete_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    match_service::delete_match(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
