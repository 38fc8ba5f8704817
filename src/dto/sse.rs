use serde::Serialize;

use crate::dto::ws::ServerMessage;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// SSE event name, if any.
    pub event: Option<String>,
    /// Serialized JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Room message named after its type (`snapshot`, `append`, ...).
    pub fn from_message(message: &ServerMessage) -> serde_json::Result<Self> {
        Self::json(message.kind().to_string(), message)
    }
}
