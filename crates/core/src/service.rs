//! Chat service facade.
//!
//! [`ChatService`] wires the registry, store, bus, user directory and notification
//! aggregator together and applies the caller-level authorization rules shared by every
//! transport: only participants may read or write a thread, only admins may open
//! doctor-admin threads on a doctor's behalf, and a message is always sent as the caller.

use crate::bus::EventBus;
use crate::config::CoreConfig;
use crate::directory::{UserDirectory, UserProfile};
use crate::model::{Message, MessageId, Participant, Thread, ThreadId};
use crate::notifications::{AppointmentSource, NotificationAggregator, Notifications};
use crate::repositories::messages::{MessagePage, MessageStore};
use crate::repositories::threads::{ThreadRegistry, ThreadSummary};
use crate::session::LiveSession;
use crate::{ChatError, ChatResult};
use chat_types::{Role, UserId};
use std::sync::Arc;

/// A thread list entry with the counterpart's directory profile, if known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadListing {
    pub summary: ThreadSummary,
    pub counterpart_profile: Option<UserProfile>,
}

/// Content of a message to send, as received from a client.
#[derive(Clone, Debug, Default)]
pub struct OutgoingMessage {
    /// Claimed sender; when present it must be the caller.
    pub sender_id: Option<UserId>,
    pub text: Option<String>,
    pub attachment_url: Option<String>,
}

pub struct ChatService {
    cfg: Arc<CoreConfig>,
    bus: EventBus,
    registry: Arc<ThreadRegistry>,
    store: MessageStore,
    directory: Arc<dyn UserDirectory>,
    notifications: NotificationAggregator,
}

impl ChatService {
    pub fn new(
        cfg: Arc<CoreConfig>,
        directory: Arc<dyn UserDirectory>,
        appointments: Arc<dyn AppointmentSource>,
    ) -> Self {
        let bus = EventBus::new(cfg.event_capacity());
        let registry = Arc::new(ThreadRegistry::new(Arc::clone(&cfg), bus.clone()));
        let store = MessageStore::new(Arc::clone(&registry), bus.clone());
        let notifications = NotificationAggregator::new(appointments, cfg.notification_windows());

        Self {
            cfg,
            bus,
            registry,
            store,
            directory,
            notifications,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Opens (get-or-create) the thread between the caller and `counterpart_id`.
    ///
    /// # Errors
    ///
    /// - [`ChatError::NotFound`] if the counterpart is not in the user directory
    /// - [`ChatError::InvalidInput`] if the role pair is not allowed
    pub fn open_thread(&self, caller: &Participant, counterpart_id: &UserId) -> ChatResult<Thread> {
        let counterpart = self.require_profile(counterpart_id)?;
        self.registry.get_or_create(
            caller,
            &Participant::new(counterpart.id, counterpart.role),
        )
    }

    /// Opens the doctor-admin thread between an admin caller and `doctor_id`.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Forbidden`] if the caller is not an admin
    /// - [`ChatError::NotFound`] if `doctor_id` is not a known doctor
    pub fn admin_thread_for_doctor(
        &self,
        caller: &Participant,
        doctor_id: &UserId,
    ) -> ChatResult<Thread> {
        if caller.role != Role::Admin {
            return Err(ChatError::Forbidden(format!(
                "{} is not an admin",
                caller.id
            )));
        }
        let doctor = self.require_profile(doctor_id)?;
        if doctor.role != Role::Doctor {
            return Err(ChatError::NotFound(format!("doctor {}", doctor_id)));
        }
        self.registry
            .get_or_create(caller, &Participant::new(doctor.id, Role::Doctor))
    }

    /// Lists the caller's threads, most recently active first.
    pub fn threads_for(&self, caller: &Participant) -> ChatResult<Vec<ThreadListing>> {
        self.registry
            .threads_for(&caller.id)?
            .into_iter()
            .map(|summary| {
                let counterpart_profile = self.directory.profile(&summary.counterpart.id)?;
                Ok(ThreadListing {
                    summary,
                    counterpart_profile,
                })
            })
            .collect()
    }

    /// Loads a thread the caller participates in.
    ///
    /// # Errors
    ///
    /// - [`ChatError::NotFound`] for an unknown thread
    /// - [`ChatError::Forbidden`] if the caller is not a participant
    pub fn thread(&self, caller: &Participant, thread_id: &ThreadId) -> ChatResult<Thread> {
        let thread = self.registry.get(thread_id)?;
        if !thread.has_participant(&caller.id) {
            return Err(ChatError::Forbidden(format!(
                "{} is not a participant of thread {}",
                caller.id, thread_id
            )));
        }
        Ok(thread)
    }

    /// All messages of a thread, oldest first.
    pub fn thread_messages(
        &self,
        caller: &Participant,
        thread_id: &ThreadId,
    ) -> ChatResult<(Thread, Vec<Message>)> {
        let thread = self.thread(caller, thread_id)?;
        let messages = self.store.list(thread_id)?;
        Ok((thread, messages))
    }

    /// One page of a thread's messages after the `after` cursor.
    pub fn thread_messages_page(
        &self,
        caller: &Participant,
        thread_id: &ThreadId,
        after: Option<&MessageId>,
        limit: usize,
    ) -> ChatResult<(Thread, MessagePage)> {
        let thread = self.thread(caller, thread_id)?;
        let page = self.store.list_page(thread_id, after, limit)?;
        Ok((thread, page))
    }

    /// Appends a message as the caller and returns the thread's full updated message list.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Forbidden`] if `sender_id` names someone other than the caller, or the
    ///   caller is not a participant
    /// - as [`MessageStore::append`]
    pub fn send_message(
        &self,
        caller: &Participant,
        thread_id: &ThreadId,
        outgoing: OutgoingMessage,
    ) -> ChatResult<(Thread, Vec<Message>)> {
        if let Some(sender_id) = &outgoing.sender_id {
            if sender_id != &caller.id {
                return Err(ChatError::Forbidden(format!(
                    "{} cannot send as {}",
                    caller.id, sender_id
                )));
            }
        }

        let message = self.store.append(
            thread_id,
            &caller.id,
            outgoing.text,
            outgoing.attachment_url,
        )?;
        tracing::info!(thread_id = %thread_id, message_id = %message.id, "message sent");

        self.thread_messages(caller, thread_id)
    }

    /// Opens a live session for the caller.
    pub fn connect(&self, caller: &Participant) -> LiveSession {
        LiveSession::connect(&self.bus, caller.id.clone())
    }

    pub fn notifications(&self, caller: &Participant) -> ChatResult<Notifications> {
        self.notifications.list_notifications(&caller.id)
    }

    /// True if the chat data directory exists and is a directory.
    pub fn storage_reachable(&self) -> bool {
        std::fs::metadata(self.cfg.chat_data_dir())
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    fn require_profile(&self, id: &UserId) -> ChatResult<UserProfile> {
        self.directory
            .profile(id)?
            .ok_or_else(|| ChatError::NotFound(format!("user {}", id)))
    }
}
