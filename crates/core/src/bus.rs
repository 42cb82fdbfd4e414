//! Process-wide Event Bus for chat domain events.
//!
//! A single broadcast channel fans every published event out to all current subscribers,
//! in publish order. There is no durability: a subscriber only sees events published while
//! it is subscribed, and the Message Store remains the source of truth.
//!
//! Publishing never blocks. Each subscriber has a bounded buffer (the bus capacity); a
//! subscriber that falls further behind is *lagged* and its subscription ends, so a slow
//! consumer can never stall the publisher.

use crate::model::{Message, Thread, ThreadId};
use chat_types::UserId;
use tokio::sync::broadcast::{self, error::RecvError};

/// Kinds of event carried by the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageCreated,
    ThreadCreated,
}

impl EventKind {
    /// Namespaced event name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageCreated => "message.created",
            EventKind::ThreadCreated => "thread.created",
        }
    }
}

/// A chat domain event.
///
/// Events carry the thread's participant ids so that subscribers can authorise every
/// event without a store lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    /// A message was durably appended to a thread.
    MessageCreated {
        thread_id: ThreadId,
        participants: [UserId; 2],
        message: Message,
    },
    /// A thread was created by the registry.
    ThreadCreated { thread: Thread },
}

impl ChatEvent {
    pub fn message_created(thread: &Thread, message: Message) -> Self {
        ChatEvent::MessageCreated {
            thread_id: thread.id.clone(),
            participants: thread.participant_ids(),
            message,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ChatEvent::MessageCreated { .. } => EventKind::MessageCreated,
            ChatEvent::ThreadCreated { .. } => EventKind::ThreadCreated,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind().as_str()
    }

    pub fn thread_id(&self) -> &ThreadId {
        match self {
            ChatEvent::MessageCreated { thread_id, .. } => thread_id,
            ChatEvent::ThreadCreated { thread } => &thread.id,
        }
    }

    /// True if `user` is one of the thread's two participants.
    pub fn is_visible_to(&self, user: &UserId) -> bool {
        match self {
            ChatEvent::MessageCreated { participants, .. } => participants.contains(user),
            ChatEvent::ThreadCreated { thread } => thread.has_participant(user),
        }
    }
}

/// Broadcast-based event bus.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    /// Create a new event bus with the given per-subscriber buffer capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; [`crate::CoreConfig`] rejects that value at startup.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to every current subscriber.
    ///
    /// Returns the number of subscribers the event was queued for. With no subscribers the
    /// event is dropped.
    pub fn publish(&self, event: ChatEvent) -> usize {
        let subscriber_count = self.tx.receiver_count();
        tracing::debug!(
            event_type = event.event_type(),
            thread_id = %event.thread_id(),
            subscriber_count,
            "event bus publish"
        );
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to the given event kinds. Only events published after this call are seen.
    pub fn subscribe(&self, kinds: &[EventKind]) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            kinds: kinds.to_vec(),
            ended: None,
        }
    }

    /// Returns the number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Why a subscription stopped yielding events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionEnded {
    /// The subscriber fell behind by more than the bus capacity and missed events.
    #[error("subscriber lagged behind by {0} events")]
    Lagged(u64),
    /// The bus was dropped.
    #[error("event bus closed")]
    Closed,
}

/// A single subscriber's view of the bus, filtered by event kind.
///
/// Dropping the subscription unsubscribes immediately. Once ended (lag or close) it stays
/// ended; subscribe again to restart.
#[derive(Debug)]
pub struct EventSubscription {
    rx: broadcast::Receiver<ChatEvent>,
    kinds: Vec<EventKind>,
    ended: Option<SubscriptionEnded>,
}

impl EventSubscription {
    /// Waits for the next event of a subscribed kind.
    pub async fn recv(&mut self) -> Result<ChatEvent, SubscriptionEnded> {
        if let Some(ended) = self.ended {
            return Err(ended);
        }
        loop {
            match self.rx.recv().await {
                Ok(event) if self.kinds.contains(&event.kind()) => return Ok(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    self.ended = Some(SubscriptionEnded::Lagged(missed));
                    return Err(SubscriptionEnded::Lagged(missed));
                }
                Err(RecvError::Closed) => {
                    self.ended = Some(SubscriptionEnded::Closed);
                    return Err(SubscriptionEnded::Closed);
                }
            }
        }
    }
}
