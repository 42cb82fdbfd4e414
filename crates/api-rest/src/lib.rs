//! # API REST
//!
//! REST and server-sent events API for the clinic chat service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - The live event stream (`GET /events`)
//! - Caller authentication from gateway-forwarded headers
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status codes)
//!
//! Uses `chat-core` for all chat operations and `api-shared` for wire types.

#![warn(rust_2018_idioms)]

mod convert;
mod events;
mod handlers;

use api_shared::auth::{
    parse_identity, validate_api_key, API_KEY_HEADER, USER_ID_HEADER, USER_ROLE_HEADER,
};
use api_shared::dto;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    routing::get,
    Router,
};
use chat_core::config::{event_capacity_from_env_value, notification_windows_from_env_values};
use chat_core::constants::DEFAULT_CHAT_DATA_DIR;
use chat_core::{
    ChatError, ChatService, CoreConfig, Participant, YamlAppointmentSource, YamlUserDirectory,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use utoipa::{IntoParams, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

/// Default listen address.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Default interval between SSE keep-alive comments, in seconds.
pub const DEFAULT_SSE_KEEPALIVE_SECS: u64 = 15;

/// Application state for the REST API server.
///
/// Shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    chat: Arc<ChatService>,
    api_key: Arc<str>,
    keep_alive: Duration,
}

impl AppState {
    pub fn new(chat: Arc<ChatService>, api_key: impl Into<Arc<str>>, keep_alive: Duration) -> Self {
        Self {
            chat,
            api_key: api_key.into(),
            keep_alive,
        }
    }

    pub fn chat(&self) -> &Arc<ChatService> {
        &self.chat
    }
}

/// Server configuration, resolved once from the environment at startup.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: String,
    pub core: CoreConfig,
    pub api_key: String,
    pub keep_alive: Duration,
    pub user_directory: PathBuf,
    pub appointments_file: PathBuf,
}

impl ServerConfig {
    /// Reads the server configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `API_KEY` is not set,
    /// - the chat data directory does not exist,
    /// - a numeric setting cannot be parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        let addr = std::env::var("CHAT_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

        let api_key = std::env::var("API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("API_KEY must be set"))?;

        let chat_data_dir = PathBuf::from(
            std::env::var("CHAT_DATA_DIR").unwrap_or_else(|_| DEFAULT_CHAT_DATA_DIR.into()),
        );
        if !chat_data_dir.is_dir() {
            anyhow::bail!(
                "Chat data directory does not exist: {}",
                chat_data_dir.display()
            );
        }

        let event_capacity =
            event_capacity_from_env_value(std::env::var("CHAT_EVENT_CAPACITY").ok())?;
        let windows = notification_windows_from_env_values(
            std::env::var("CHAT_PRE_THERAPY_LEAD_HOURS").ok(),
            std::env::var("CHAT_POST_THERAPY_TRAIL_HOURS").ok(),
        )?;
        let keep_alive = keep_alive_from_env_value(std::env::var("CHAT_SSE_KEEPALIVE_SECS").ok())?;

        let user_directory = std::env::var("CHAT_USER_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| chat_data_dir.join("users.yaml"));
        let appointments_file = std::env::var("CHAT_APPOINTMENTS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| chat_data_dir.join("appointments.yaml"));

        Ok(Self {
            addr,
            core: CoreConfig::new(chat_data_dir, event_capacity, windows)?,
            api_key,
            keep_alive,
            user_directory,
            appointments_file,
        })
    }
}

/// Parses the SSE keep-alive interval; empty or unset means the default.
pub fn keep_alive_from_env_value(value: Option<String>) -> anyhow::Result<Duration> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(Duration::from_secs(DEFAULT_SSE_KEEPALIVE_SECS)),
        Some(v) => match v.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => anyhow::bail!("CHAT_SSE_KEEPALIVE_SECS must be a positive integer, got '{}'", v),
        },
    }
}

/// Builds the application state: loads the user directory and wires the chat service.
pub fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let directory = YamlUserDirectory::load(&config.user_directory)?;
    let appointments = YamlAppointmentSource::new(config.appointments_file.clone());
    let chat = ChatService::new(
        Arc::new(config.core.clone()),
        Arc::new(directory),
        Arc::new(appointments),
    );
    Ok(AppState::new(
        Arc::new(chat),
        config.api_key.as_str(),
        config.keep_alive,
    ))
}

/// Identity headers forwarded by the gateway (documentation only).
#[derive(IntoParams)]
#[into_params(names("x-api-key", "x-user-id", "x-user-role"), parameter_in = Header)]
#[allow(dead_code)]
pub(crate) struct IdentityHeaders(String, String, String);

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::list_threads,
        handlers::open_thread,
        handlers::admin_doctor_thread,
        handlers::list_messages,
        handlers::send_message,
        handlers::notifications,
        events::events,
    ),
    components(schemas(
        dto::HealthRes,
        dto::ParticipantDto,
        dto::CounterpartDto,
        dto::ThreadSummaryDto,
        dto::ThreadListRes,
        dto::OpenThreadReq,
        dto::OpenThreadRes,
        dto::MessageDto,
        dto::ThreadMessagesRes,
        dto::SendMessageReq,
        dto::NotificationDto,
        dto::NotificationsRes,
        dto::MessageCreatedEvent,
        dto::ThreadCreatedEvent,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router with all routes, Swagger UI and CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/threads",
            get(handlers::list_threads).post(handlers::open_thread),
        )
        .route(
            "/admin/doctors/:doctor_id/thread",
            get(handlers::admin_doctor_thread),
        )
        .route(
            "/threads/:thread_id/messages",
            get(handlers::list_messages).post(handlers::send_message),
        )
        .route("/notifications", get(handlers::notifications))
        .route("/events", get(events::events))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs the REST server until it fails.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let state = build_state(&config)?;
    if !state.chat.storage_reachable() {
        tracing::warn!(
            "chat storage not reachable at {}",
            config.core.chat_data_dir().display()
        );
    }
    let app = router(state);

    tracing::info!("++ Starting chat REST on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The caller, authenticated from the forwarded identity headers.
pub struct AuthenticatedUser(pub Participant);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let authenticated = validate_api_key(header(headers, API_KEY_HEADER), &state.api_key)
            .and_then(|()| {
                parse_identity(
                    header(headers, USER_ID_HEADER),
                    header(headers, USER_ROLE_HEADER),
                )
            });

        match authenticated {
            Ok(identity) => Ok(Self(Participant::new(identity.user_id, identity.role))),
            Err(e) => {
                tracing::warn!("Rejected request: {}", e);
                Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
            }
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Maps a core error to a status code and a short static body; details go to the log.
pub(crate) fn chat_error_response(context: &str, e: ChatError) -> (StatusCode, &'static str) {
    match e {
        ChatError::InvalidInput(_) | ChatError::Types(_) | ChatError::Uuid(_) => {
            tracing::warn!("{} rejected: {}", context, e);
            (StatusCode::BAD_REQUEST, "Invalid request")
        }
        ChatError::Forbidden(_) => {
            tracing::warn!("{} forbidden: {}", context, e);
            (StatusCode::FORBIDDEN, "Forbidden")
        }
        ChatError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
        e if e.is_retryable() => {
            tracing::error!("{} error: {:?}", context, e);
            (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
        }
        e => {
            tracing::error!("{} error: {:?}", context, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
