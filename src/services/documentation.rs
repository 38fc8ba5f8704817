use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the hit streak backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::matches::create_match,
        crate::routes::matches::list_matches,
        crate::routes::matches::get_match,
        crate::routes::matches::delete_match,
        crate::routes::sse::match_events,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::matches::CreateMatchRequest,
            crate::dto::matches::MatchListItem,
            crate::dto::matches::MatchSnapshot,
            crate::dto::matches::VisibleMatchPhase,
            crate::dao::models::MatchStatus,
            crate::state::scoring::Scoreboard,
            crate::state::scoring::ScoreboardRow,
            crate::state::scoring::PlayerStats,
            crate::state::scoring::Section,
            crate::state::sequence::Event,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "matches", description = "Match creation, listing and review"),
        (name = "sse", description = "Read-only spectator streams"),
        (name = "rooms", description = "WebSocket match rooms for scoring clients"),
    )
)]
pub struct ApiDoc;
