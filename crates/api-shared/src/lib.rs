//! # API Shared
//!
//! Shared utilities and definitions for the chat APIs.
//!
//! Contains:
//! - Wire types (`dto` module), serialised as camelCase JSON with OpenAPI schemas
//! - Shared services like `HealthService`
//! - Authentication utilities: API key and forwarded identity validation
//!
//! Used by `api-rest` (server) and `chat-cli` (client).

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::{AuthError, Identity};
pub use dto::*;
pub use health::HealthService;
