//! Chat domain types: participants, threads and messages.
//!
//! Threads are two-party conversations keyed by an unordered participant pair. Messages
//! belong to exactly one thread and are totally ordered by their [`MessageId`].

use crate::constants::{MAX_ATTACHMENT_URL_LEN, MAX_MESSAGE_TEXT_CHARS, PAIR_KEY_SEPARATOR};
use crate::{ChatError, ChatResult};
use chat_types::{NonEmptyText, Role, UserId};
use chat_uuid::{TimestampId, UuidService};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Thread identifier (canonical UUID).
pub type ThreadId = UuidService;

/// Message identifier: time-prefixed and strictly increasing within a thread.
pub type MessageId = TimestampId;

/// A user taking part in a thread, with the role the identity provider assigned.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub id: UserId,
    pub role: Role,
}

impl Participant {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }
}

/// The two kinds of conversation the clinic supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadKind {
    PatientDoctor,
    DoctorAdmin,
}

impl ThreadKind {
    /// Returns the kind for an unordered pair of roles, or `None` if the pair is not allowed.
    pub fn for_roles(a: Role, b: Role) -> Option<Self> {
        match (a, b) {
            (Role::Patient, Role::Doctor) | (Role::Doctor, Role::Patient) => {
                Some(ThreadKind::PatientDoctor)
            }
            (Role::Doctor, Role::Admin) | (Role::Admin, Role::Doctor) => {
                Some(ThreadKind::DoctorAdmin)
            }
            _ => None,
        }
    }
}

/// Order-independent key for a participant pair: `<lower id>~<higher id>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PairKey(String);

impl PairKey {
    pub fn for_ids(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{}{}{}", lo, PAIR_KEY_SEPARATOR, hi))
    }

    /// Splits a key (for example a pair index file stem) back into its two user ids.
    pub fn parse(input: &str) -> Option<(UserId, UserId)> {
        let (a, b) = input.split_once(PAIR_KEY_SEPARATOR)?;
        let a = UserId::parse(a).ok()?;
        let b = UserId::parse(b).ok()?;
        (a < b).then_some((a, b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated participant pair in canonical (sorted by id) order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParticipantPair {
    participants: [Participant; 2],
    kind: ThreadKind,
}

impl ParticipantPair {
    /// Validates a pair of participants.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidInput`] if both participants are the same user or the
    /// roles are not patient+doctor or doctor+admin.
    pub fn new(a: Participant, b: Participant) -> ChatResult<Self> {
        if a.id == b.id {
            return Err(ChatError::InvalidInput(
                "a thread needs two distinct participants".into(),
            ));
        }
        let kind = ThreadKind::for_roles(a.role, b.role).ok_or_else(|| {
            ChatError::InvalidInput(format!(
                "unsupported participant pair: {} and {}",
                a.role, b.role
            ))
        })?;
        let participants = if a.id <= b.id { [a, b] } else { [b, a] };
        Ok(Self { participants, kind })
    }

    pub fn key(&self) -> PairKey {
        PairKey::for_ids(&self.participants[0].id, &self.participants[1].id)
    }

    pub fn kind(&self) -> ThreadKind {
        self.kind
    }

    pub fn participants(&self) -> &[Participant; 2] {
        &self.participants
    }
}

/// Persisted thread record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub kind: ThreadKind,
    /// Exactly two participants, sorted by id.
    pub participants: [Participant; 2],
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Thread {
    pub fn has_participant(&self, user: &UserId) -> bool {
        self.participants.iter().any(|p| &p.id == user)
    }

    /// The other participant, seen from `user`.
    pub fn counterpart_of(&self, user: &UserId) -> Option<&Participant> {
        match &self.participants {
            [a, b] if &a.id == user => Some(b),
            [a, b] if &b.id == user => Some(a),
            _ => None,
        }
    }

    pub fn participant_ids(&self) -> [UserId; 2] {
        [
            self.participants[0].id.clone(),
            self.participants[1].id.clone(),
        ]
    }

    pub fn pair_key(&self) -> PairKey {
        PairKey::for_ids(&self.participants[0].id, &self.participants[1].id)
    }
}

/// A stored chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub sender: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Validated content of a message to append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageBody {
    text: Option<NonEmptyText>,
    attachment_url: Option<String>,
}

impl MessageBody {
    /// Validates message content.
    ///
    /// Blank text and blank attachment URLs count as absent.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidInput`] if:
    /// - both text and attachment URL are absent
    /// - the text exceeds the maximum length
    /// - the attachment URL is not an http(s) URL, contains whitespace or is too long
    pub fn new(text: Option<String>, attachment_url: Option<String>) -> ChatResult<Self> {
        let text = NonEmptyText::optional(text);
        let attachment_url = attachment_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        if text.is_none() && attachment_url.is_none() {
            return Err(ChatError::InvalidInput(
                "message needs text or an attachment".into(),
            ));
        }

        if let Some(text) = &text {
            if text.as_str().chars().count() > MAX_MESSAGE_TEXT_CHARS {
                return Err(ChatError::InvalidInput(format!(
                    "message text exceeds {} characters",
                    MAX_MESSAGE_TEXT_CHARS
                )));
            }
        }

        if let Some(url) = &attachment_url {
            validate_attachment_url(url)?;
        }

        Ok(Self {
            text,
            attachment_url,
        })
    }

    pub fn text(&self) -> Option<&NonEmptyText> {
        self.text.as_ref()
    }

    pub fn attachment_url(&self) -> Option<&str> {
        self.attachment_url.as_deref()
    }
}

fn validate_attachment_url(url: &str) -> ChatResult<()> {
    if url.len() > MAX_ATTACHMENT_URL_LEN {
        return Err(ChatError::InvalidInput(format!(
            "attachment URL exceeds {} bytes",
            MAX_ATTACHMENT_URL_LEN
        )));
    }
    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));
    match rest {
        Some(rest) if !rest.is_empty() && !url.chars().any(char::is_whitespace) => Ok(()),
        _ => Err(ChatError::InvalidInput(
            "attachment URL must be an http(s) URL".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn participant(id: &str, role: Role) -> Participant {
        Participant::new(user(id), role)
    }

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(
            PairKey::for_ids(&user("p1"), &user("d1")),
            PairKey::for_ids(&user("d1"), &user("p1"))
        );
        assert_eq!(PairKey::for_ids(&user("p1"), &user("d1")).as_str(), "d1~p1");
    }

    #[test]
    fn pair_key_parse_round_trips() {
        let key = PairKey::for_ids(&user("p1"), &user("d1"));
        let (a, b) = PairKey::parse(key.as_str()).unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("d1", "p1"));
        assert!(PairKey::parse("p1~d1").is_none());
        assert!(PairKey::parse("nope").is_none());
    }

    #[test]
    fn participant_pair_accepts_supported_roles() {
        let pair = ParticipantPair::new(
            participant("p1", Role::Patient),
            participant("d1", Role::Doctor),
        )
        .unwrap();
        assert_eq!(pair.kind(), ThreadKind::PatientDoctor);
        assert_eq!(pair.participants()[0].id.as_str(), "d1");

        let pair = ParticipantPair::new(
            participant("a1", Role::Admin),
            participant("d1", Role::Doctor),
        )
        .unwrap();
        assert_eq!(pair.kind(), ThreadKind::DoctorAdmin);
    }

    #[test]
    fn participant_pair_rejects_malformed_pairs() {
        let same = ParticipantPair::new(
            participant("d1", Role::Doctor),
            participant("d1", Role::Patient),
        );
        assert!(matches!(same, Err(ChatError::InvalidInput(_))));

        let patients = ParticipantPair::new(
            participant("p1", Role::Patient),
            participant("p2", Role::Patient),
        );
        assert!(matches!(patients, Err(ChatError::InvalidInput(_))));

        let patient_admin = ParticipantPair::new(
            participant("p1", Role::Patient),
            participant("a1", Role::Admin),
        );
        assert!(matches!(patient_admin, Err(ChatError::InvalidInput(_))));
    }

    #[test]
    fn message_body_requires_text_or_attachment() {
        assert!(matches!(
            MessageBody::new(None, None),
            Err(ChatError::InvalidInput(_))
        ));
        assert!(matches!(
            MessageBody::new(Some("   ".into()), Some("".into())),
            Err(ChatError::InvalidInput(_))
        ));
        assert!(MessageBody::new(Some("Hello".into()), None).is_ok());
        assert!(MessageBody::new(None, Some("https://cdn.example.com/x.png".into())).is_ok());
    }

    #[test]
    fn message_body_validates_attachment_url() {
        assert!(MessageBody::new(None, Some("ftp://example.com/x".into())).is_err());
        assert!(MessageBody::new(None, Some("https://".into())).is_err());
        assert!(MessageBody::new(None, Some("https://a b".into())).is_err());
        let long = format!("https://example.com/{}", "a".repeat(MAX_ATTACHMENT_URL_LEN));
        assert!(MessageBody::new(None, Some(long)).is_err());
    }

    #[test]
    fn message_body_limits_text_length() {
        let long = "x".repeat(MAX_MESSAGE_TEXT_CHARS + 1);
        assert!(MessageBody::new(Some(long), None).is_err());
    }

    #[test]
    fn thread_counterpart_lookup() {
        let thread = Thread {
            id: ThreadId::new(),
            kind: ThreadKind::PatientDoctor,
            participants: [
                participant("d1", Role::Doctor),
                participant("p1", Role::Patient),
            ],
            created_at: Utc::now(),
            last_activity_at: Utc::now(),
        };
        assert_eq!(thread.counterpart_of(&user("p1")).unwrap().id.as_str(), "d1");
        assert_eq!(thread.counterpart_of(&user("d1")).unwrap().id.as_str(), "p1");
        assert!(thread.counterpart_of(&user("d2")).is_none());
        assert!(!thread.has_participant(&user("d2")));
    }

    #[test]
    fn message_omits_absent_fields_when_serialised() {
        let message = Message {
            id: MessageId::generate(None),
            thread_id: ThreadId::new(),
            sender: user("p1"),
            text: NonEmptyText::optional(Some("Hello")),
            attachment_url: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"text\":\"Hello\""));
        assert!(!json.contains("attachment_url"));
    }
}
