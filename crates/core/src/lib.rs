//! # Chat Core
//!
//! Core business logic for the clinic chat service.
//!
//! This crate contains the chat domain and its file-backed storage:
//! - Thread Registry: one persistent thread per participant pair, with sharded storage
//! - Message Store: per-thread append-only message logs
//! - Event Bus and Live Session Stream: in-process fan-out of new messages to open sessions
//! - Unread Tracker: client-side unread counters driven by live events
//! - Notification Aggregator: pre/post-therapy notifications derived from appointments
//!
//! **No API concerns**: authentication, HTTP servers and wire formats belong in `api-rest`
//! and `api-shared`.

pub mod bus;
pub mod config;
pub mod constants;
pub mod directory;
pub mod error;
pub mod model;
pub mod notifications;
pub mod repositories;
pub mod service;
pub mod session;
pub mod unread;

pub use bus::{ChatEvent, EventBus, EventKind, EventSubscription, SubscriptionEnded};
pub use config::CoreConfig;
pub use directory::{UserDirectory, UserProfile, YamlUserDirectory};
pub use error::{ChatError, ChatResult};
pub use model::{
    Message, MessageBody, MessageId, PairKey, Participant, ParticipantPair, Thread, ThreadId,
    ThreadKind,
};
pub use notifications::{
    aggregate, Appointment, AppointmentSource, AppointmentStatus, Notification,
    NotificationAggregator, NotificationKind, NotificationWindows, Notifications,
    YamlAppointmentSource,
};
pub use repositories::messages::{MessagePage, MessageStore};
pub use repositories::threads::{ThreadRegistry, ThreadSummary};
pub use service::{ChatService, OutgoingMessage, ThreadListing};
pub use session::LiveSession;
pub use unread::UnreadTracker;

pub use chat_types::{NonEmptyText, Role, UserId};
