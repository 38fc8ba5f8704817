use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health check payloads.
pub mod health;
/// Match CRUD and snapshot payloads.
pub mod matches;
/// Server-sent event envelopes.
pub mod sse;
/// Request validation helpers.
pub mod validation;
/// WebSocket room protocol.
pub mod ws;

/// Render a timestamp as RFC 3339 for wire payloads.
pub fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
