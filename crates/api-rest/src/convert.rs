//! Mapping between core types and wire DTOs.

use api_shared::dto::{
    CounterpartDto, MessageDto, NotificationDto, NotificationsRes, ParticipantDto,
    ThreadMessagesRes, ThreadSummaryDto,
};
use chat_core::{
    Message, MessageId, Notification, NotificationKind, Notifications, Participant, Thread,
    ThreadListing,
};
use chrono::{DateTime, SecondsFormat, Utc};

pub(crate) fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn participant_dto(participant: &Participant) -> ParticipantDto {
    ParticipantDto {
        id: participant.id.to_string(),
        role: participant.role.to_string(),
    }
}

pub(crate) fn message_dto(message: &Message) -> MessageDto {
    MessageDto {
        id: message.id.to_string(),
        sender: message.sender.to_string(),
        text: message.text.as_ref().map(|t| t.as_str().to_string()),
        attachment_url: message.attachment_url.clone(),
        created_at: timestamp(message.created_at),
    }
}

pub(crate) fn thread_messages_res(
    thread: &Thread,
    messages: &[Message],
    next_after: Option<&MessageId>,
) -> ThreadMessagesRes {
    ThreadMessagesRes {
        thread_id: thread.id.to_string(),
        participants: thread.participants.iter().map(participant_dto).collect(),
        messages: messages.iter().map(message_dto).collect(),
        next_after: next_after.map(|id| id.to_string()),
    }
}

pub(crate) fn thread_summary_dto(listing: &ThreadListing) -> ThreadSummaryDto {
    let counterpart = &listing.summary.counterpart;
    let profile = listing.counterpart_profile.as_ref();
    ThreadSummaryDto {
        thread_id: listing.summary.thread_id.to_string(),
        counterpart: CounterpartDto {
            id: counterpart.id.to_string(),
            role: counterpart.role.to_string(),
            display_name: profile.map(|p| p.display_name.clone()),
            avatar_url: profile.and_then(|p| p.avatar_url.clone()),
        },
        last_activity_at: timestamp(listing.summary.last_activity_at),
    }
}

fn notification_dto(notification: &Notification) -> NotificationDto {
    let kind = match notification.kind {
        NotificationKind::PreTherapy => "pre_therapy",
        NotificationKind::PostTherapy => "post_therapy",
    };
    NotificationDto {
        kind: kind.into(),
        appointment_id: notification.appointment_id.clone(),
        counterpart_id: notification.counterpart_id.to_string(),
        therapy: notification.therapy.clone(),
        at: timestamp(notification.at),
    }
}

pub(crate) fn notifications_res(notifications: &Notifications) -> NotificationsRes {
    NotificationsRes {
        pre: notifications.pre.iter().map(notification_dto).collect(),
        post: notifications.post.iter().map(notification_dto).collect(),
    }
}
