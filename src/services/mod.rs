/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Match creation, listing, review and deletion.
pub mod match_service;
/// Per-room queue of durable writes with retries.
pub mod persistence;
/// Read-only spectator streams over Server-Sent Events.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
