//! JSON wire types shared by the REST server and the CLI client.
//!
//! Field names are camelCase on the wire. Ids and timestamps travel as strings
//! (timestamps in RFC 3339).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// SSE event name for a new message.
pub const EVENT_MESSAGE_CREATED: &str = "message.created";
/// SSE event name for a new thread.
pub const EVENT_THREAD_CREATED: &str = "thread.created";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
    pub storage_reachable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDto {
    pub id: String,
    pub role: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CounterpartDto {
    pub id: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummaryDto {
    pub thread_id: String,
    pub counterpart: CounterpartDto,
    pub last_activity_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThreadListRes {
    pub threads: Vec<ThreadSummaryDto>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenThreadReq {
    pub counterpart_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenThreadRes {
    pub thread_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: String,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    pub created_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessagesRes {
    pub thread_id: String,
    pub participants: Vec<ParticipantDto>,
    pub messages: Vec<MessageDto>,
    /// Cursor for the next page, present only when more messages follow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_after: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageReq {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDto {
    /// `pre_therapy` or `post_therapy`.
    pub kind: String,
    pub appointment_id: String,
    pub counterpart_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub therapy: Option<String>,
    pub at: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsRes {
    pub pre: Vec<NotificationDto>,
    pub post: Vec<NotificationDto>,
}

/// Data of a `message.created` server-sent event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreatedEvent {
    pub thread_id: String,
    pub message: MessageDto,
}

/// Data of a `thread.created` server-sent event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThreadCreatedEvent {
    pub thread_id: String,
    pub participants: Vec<ParticipantDto>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_request_accepts_partial_bodies() {
        let req: SendMessageReq = serde_json::from_str(r#"{"text":"Hello"}"#).unwrap();
        assert_eq!(req.text.as_deref(), Some("Hello"));
        assert!(req.sender_id.is_none());

        let req: SendMessageReq =
            serde_json::from_str(r#"{"senderId":"p1","attachmentUrl":"https://x.example/a"}"#)
                .unwrap();
        assert_eq!(req.sender_id.as_deref(), Some("p1"));
        assert!(req.attachment_url.is_some());
    }

    #[test]
    fn responses_use_camel_case() {
        let res = ThreadMessagesRes {
            thread_id: "t".into(),
            participants: vec![],
            messages: vec![MessageDto {
                id: "m".into(),
                sender: "p1".into(),
                text: None,
                attachment_url: Some("https://x.example/a".into()),
                created_at: "2026-01-01T00:00:00Z".into(),
            }],
            next_after: None,
        };
        let json = serde_json::to_string(&res).unwrap();
        assert!(json.contains("\"threadId\""));
        assert!(json.contains("\"attachmentUrl\""));
        assert!(json.contains("\"createdAt\""));
        assert!(!json.contains("nextAfter"));
        assert!(!json.contains("\"text\""));
    }
}
