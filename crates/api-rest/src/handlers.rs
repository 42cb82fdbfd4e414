//! HTTP handlers.
//!
//! Every handler except `health` requires an [`AuthenticatedUser`]; the extractor rejects
//! unauthenticated requests with `401` before any core operation runs. Core errors are
//! mapped to status codes by [`chat_error_response`].

use crate::convert::{notifications_res, thread_messages_res, thread_summary_dto};
use crate::{chat_error_response, AppState, AuthenticatedUser, IdentityHeaders};
use api_shared::dto::{
    HealthRes, NotificationsRes, OpenThreadReq, OpenThreadRes, SendMessageReq, ThreadListRes,
    ThreadMessagesRes,
};
use api_shared::HealthService;
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Json,
};
use chat_core::{MessageId, OutgoingMessage, ThreadId, UserId};
use serde::Deserialize;
use utoipa::IntoParams;

type HandlerError = (StatusCode, &'static str);

/// Optional pagination of a thread's messages.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct MessagesQuery {
    /// Return only messages after this message id.
    after: Option<String>,
    /// Maximum number of messages to return.
    limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint.
///
/// Reports liveness and whether chat storage is reachable.
#[axum::debug_handler]
pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health(state.chat.storage_reachable()))
}

#[utoipa::path(
    get,
    path = "/threads",
    params(IdentityHeaders),
    responses(
        (status = 200, description = "Threads of the caller, most recent first", body = ThreadListRes),
        (status = 401, description = "Unauthenticated"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// List the caller's threads.
#[axum::debug_handler]
pub(crate) async fn list_threads(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> Result<Json<ThreadListRes>, HandlerError> {
    match state.chat.threads_for(&caller) {
        Ok(listings) => Ok(Json(ThreadListRes {
            threads: listings.iter().map(thread_summary_dto).collect(),
        })),
        Err(e) => Err(chat_error_response("List threads", e)),
    }
}

#[utoipa::path(
    post,
    path = "/threads",
    params(IdentityHeaders),
    request_body = OpenThreadReq,
    responses(
        (status = 200, description = "Thread between caller and counterpart", body = OpenThreadRes),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthenticated"),
        (status = 404, description = "Unknown counterpart"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Get or create the thread between the caller and a counterpart.
#[axum::debug_handler]
pub(crate) async fn open_thread(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(req): Json<OpenThreadReq>,
) -> Result<Json<OpenThreadRes>, HandlerError> {
    let counterpart_id = parse_user_id(&req.counterpart_id)?;
    match state.chat.open_thread(&caller, &counterpart_id) {
        Ok(thread) => Ok(Json(OpenThreadRes {
            thread_id: thread.id.to_string(),
        })),
        Err(e) => Err(chat_error_response("Open thread", e)),
    }
}

#[utoipa::path(
    get,
    path = "/admin/doctors/{doctor_id}/thread",
    params(
        ("doctor_id" = String, Path, description = "Doctor user id"),
        IdentityHeaders
    ),
    responses(
        (status = 200, description = "Doctor-admin thread", body = OpenThreadRes),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Unknown doctor")
    )
)]
/// Get or create the thread between an admin caller and a doctor.
#[axum::debug_handler]
pub(crate) async fn admin_doctor_thread(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    AxumPath(doctor_id): AxumPath<String>,
) -> Result<Json<OpenThreadRes>, HandlerError> {
    let doctor_id = parse_user_id(&doctor_id)?;
    match state.chat.admin_thread_for_doctor(&caller, &doctor_id) {
        Ok(thread) => Ok(Json(OpenThreadRes {
            thread_id: thread.id.to_string(),
        })),
        Err(e) => Err(chat_error_response("Admin doctor thread", e)),
    }
}

#[utoipa::path(
    get,
    path = "/threads/{thread_id}/messages",
    params(
        ("thread_id" = String, Path, description = "Thread id"),
        MessagesQuery,
        IdentityHeaders
    ),
    responses(
        (status = 200, description = "Messages in creation order", body = ThreadMessagesRes),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "Caller is not a participant"),
        (status = 404, description = "Unknown thread")
    )
)]
/// Read a thread's messages, optionally one page at a time.
#[axum::debug_handler]
pub(crate) async fn list_messages(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    AxumPath(thread_id): AxumPath<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<ThreadMessagesRes>, HandlerError> {
    let thread_id = parse_thread_id(&thread_id)?;

    if query.after.is_none() && query.limit.is_none() {
        return match state.chat.thread_messages(&caller, &thread_id) {
            Ok((thread, messages)) => Ok(Json(thread_messages_res(&thread, &messages, None))),
            Err(e) => Err(chat_error_response("List messages", e)),
        };
    }

    let after = match query.after.as_deref() {
        Some(raw) => Some(raw.parse::<MessageId>().map_err(|e| {
            tracing::warn!("Invalid message cursor: {:?}", e);
            (StatusCode::BAD_REQUEST, "Invalid message cursor")
        })?),
        None => None,
    };
    let limit = query.limit.unwrap_or(chat_core::constants::MAX_PAGE_LIMIT);

    match state
        .chat
        .thread_messages_page(&caller, &thread_id, after.as_ref(), limit)
    {
        Ok((thread, page)) => Ok(Json(thread_messages_res(
            &thread,
            &page.messages,
            page.next_after.as_ref(),
        ))),
        Err(e) => Err(chat_error_response("List messages page", e)),
    }
}

#[utoipa::path(
    post,
    path = "/threads/{thread_id}/messages",
    params(
        ("thread_id" = String, Path, description = "Thread id"),
        IdentityHeaders
    ),
    request_body = SendMessageReq,
    responses(
        (status = 200, description = "Message stored; full updated message list", body = ThreadMessagesRes),
        (status = 400, description = "Empty or invalid message"),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "Caller is not a participant or sender mismatch"),
        (status = 404, description = "Unknown thread"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Send a message as the caller.
#[axum::debug_handler]
pub(crate) async fn send_message(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    AxumPath(thread_id): AxumPath<String>,
    Json(req): Json<SendMessageReq>,
) -> Result<Json<ThreadMessagesRes>, HandlerError> {
    let thread_id = parse_thread_id(&thread_id)?;
    let sender_id = match req.sender_id.as_deref() {
        Some(raw) => Some(parse_user_id(raw)?),
        None => None,
    };

    let outgoing = OutgoingMessage {
        sender_id,
        text: req.text,
        attachment_url: req.attachment_url,
    };
    match state.chat.send_message(&caller, &thread_id, outgoing) {
        Ok((thread, messages)) => Ok(Json(thread_messages_res(&thread, &messages, None))),
        Err(e) => Err(chat_error_response("Send message", e)),
    }
}

#[utoipa::path(
    get,
    path = "/notifications",
    params(IdentityHeaders),
    responses(
        (status = 200, description = "Pre- and post-therapy notifications", body = NotificationsRes),
        (status = 401, description = "Unauthenticated"),
        (status = 503, description = "Appointment store unavailable")
    )
)]
/// Notifications derived from the caller's appointments.
#[axum::debug_handler]
pub(crate) async fn notifications(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> Result<Json<NotificationsRes>, HandlerError> {
    match state.chat.notifications(&caller) {
        Ok(notifications) => Ok(Json(notifications_res(&notifications))),
        Err(e) => Err(chat_error_response("Notifications", e)),
    }
}

fn parse_thread_id(raw: &str) -> Result<ThreadId, HandlerError> {
    ThreadId::parse(raw).map_err(|e| {
        tracing::warn!("Invalid thread id: {:?}", e);
        (StatusCode::BAD_REQUEST, "Invalid thread id")
    })
}

fn parse_user_id(raw: &str) -> Result<UserId, HandlerError> {
    UserId::parse(raw.trim()).map_err(|e| {
        tracing::warn!("Invalid user id: {:?}", e);
        (StatusCode::BAD_REQUEST, "Invalid user id")
    })
}
