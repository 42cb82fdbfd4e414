//! Request authentication.
//!
//! The upstream gateway authenticates users and forwards their identity in headers,
//! together with the shared API key. This module validates both; it never derives
//! identity on its own.

use chat_types::{Role, UserId};

/// Header carrying the shared API key.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the authenticated user's role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("missing user identity")]
    MissingIdentity,
    #[error("invalid user identity: {0}")]
    InvalidIdentity(String),
}

/// The authenticated caller, as asserted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

/// Validates the provided API key against the expected one resolved at startup.
pub fn validate_api_key(provided_key: Option<&str>, expected_key: &str) -> Result<(), AuthError> {
    let provided_key = provided_key.ok_or(AuthError::MissingApiKey)?;
    if provided_key.as_bytes() == expected_key.as_bytes() {
        Ok(())
    } else {
        Err(AuthError::InvalidApiKey)
    }
}

/// Parses the forwarded identity headers.
pub fn parse_identity(user_id: Option<&str>, role: Option<&str>) -> Result<Identity, AuthError> {
    let (Some(user_id), Some(role)) = (user_id, role) else {
        return Err(AuthError::MissingIdentity);
    };
    let user_id =
        UserId::parse(user_id.trim()).map_err(|e| AuthError::InvalidIdentity(e.to_string()))?;
    let role = role
        .parse::<Role>()
        .map_err(|e| AuthError::InvalidIdentity(e.to_string()))?;
    Ok(Identity { user_id, role })
}
