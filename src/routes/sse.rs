use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use uuid::Uuid;

use crate::{
    error::AppError,
    services::sse_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/matches/{id}/events",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Identifier of the match to follow")),
    responses(
        (status = 200, description = "Snapshot followed by every room broadcast", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown match")
    )
)]
/// Follow a match read-only.
pub async fn match_events(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let spectator = sse_service::subscribe_match(&state, id).await?;
    Ok(sse_service::to_sse_stream(spectator))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/matches/{id}/events", get(match_events))
}
