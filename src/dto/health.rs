use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Match rooms currently held in memory.
    pub live_rooms: usize,
}

impl HealthResponse {
    /// Storage is connected.
    pub fn ok(live_rooms: usize) -> Self {
        Self {
            status: "ok".to_string(),
            live_rooms,
        }
    }

    /// Running without a storage backend; live rooms keep working in memory.
    pub fn degraded(live_rooms: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            live_rooms,
        }
    }
}
