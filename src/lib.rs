//! Library crate for hitstreak-back: live hit streak scoring with match rooms,
//! exposed for the server binary and integration tests.

/// Environment-driven application settings.
pub mod config;
/// Storage backends and persisted models.
pub mod dao;
/// Wire types for HTTP, WebSocket and SSE.
pub mod dto;
/// Error types and their HTTP mapping.
pub mod error;
/// Axum route trees.
pub mod routes;
/// Use cases behind the routes.
pub mod services;
/// In-memory domain state.
pub mod state;
