//! Live Session Stream over server-sent events.
//!
//! Each `GET /events` request opens one [`chat_core::LiveSession`] for the caller and
//! forwards its events as named SSE events. The stream ends when the session ends (the
//! subscriber lagged behind); the client is expected to reconnect and reload. When the
//! client disconnects, axum drops the stream and with it the bus subscription.

use crate::convert::{message_dto, participant_dto};
use crate::{AppState, AuthenticatedUser, IdentityHeaders};
use api_shared::dto::{MessageCreatedEvent, ThreadCreatedEvent};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use chat_core::ChatEvent;
use futures::{future, Stream, StreamExt};
use std::convert::Infallible;

#[utoipa::path(
    get,
    path = "/events",
    params(IdentityHeaders),
    responses(
        (status = 200, description = "Server-sent events: message.created, thread.created",
            body = String, content_type = "text/event-stream"),
        (status = 401, description = "Unauthenticated")
    )
)]
/// Live event stream for the caller's threads.
#[axum::debug_handler]
pub(crate) async fn events(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = state.chat.connect(&caller);
    tracing::info!(user_id = %caller.id, "live session opened");

    let stream = session
        .into_stream()
        .filter_map(|event| future::ready(sse_event(&event)))
        .map(Ok);

    Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keep_alive))
}

/// Converts a domain event into its SSE form. `message.created` carries the message id as
/// the SSE event id.
pub(crate) fn sse_event(event: &ChatEvent) -> Option<Event> {
    let built = match event {
        ChatEvent::MessageCreated {
            thread_id, message, ..
        } => Event::default()
            .event(event.event_type())
            .id(message.id.to_string())
            .json_data(MessageCreatedEvent {
                thread_id: thread_id.to_string(),
                message: message_dto(message),
            }),
        ChatEvent::ThreadCreated { thread } => Event::default()
            .event(event.event_type())
            .json_data(ThreadCreatedEvent {
                thread_id: thread.id.to_string(),
                participants: thread.participants.iter().map(participant_dto).collect(),
            }),
    };

    match built {
        Ok(sse) => Some(sse),
        Err(e) => {
            tracing::error!(event_type = event.event_type(), "SSE encoding error: {:?}", e);
            None
        }
    }
}
