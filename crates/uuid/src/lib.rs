//! UUID, sharded-path and timestamp-id utilities.
//!
//! Chat threads are stored under sharded directories derived from a UUID, and messages are
//! identified by time-prefixed ids that sort in insertion order.
//!
//! To keep path derivation deterministic, storage identifiers use a *canonical* UUID
//! representation: **32 lowercase hexadecimal characters** (no hyphens).
//!
//! This crate provides:
//! - [`UuidService`], a wrapper that *guarantees* the canonical format once constructed.
//! - Sharding logic to derive a thread directory from an identifier.
//! - [`TimestampId`], a `YYYYMMDDTHHMMSS.mmmZ-<uuid>` identifier that is strictly increasing
//!   when generated from the previous id inside a per-thread lock.
//!
//! ## Canonical UUID form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Non-canonical values (uppercase, hyphenated, wrong length, non-hex) are rejected by
//! [`UuidService::parse`].
//!
//! ## Sharded directory layout
//! For a canonical UUID `u`, data lives under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `chat_data/threads/55/0e/550e8400e29b41d4a716446655440000/`
//!
//! This keeps the fan-out of any single directory small even with many threads.

mod service;

pub use service::{TimestampId, Uuid, UuidService};

/// Error type for UUID operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for UUID operations.
pub type UuidResult<T> = Result<T, UuidError>;
