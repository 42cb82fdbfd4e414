//! Live Session Stream.
//!
//! A [`LiveSession`] is one connected client's view of the Event Bus: it subscribes on
//! connect and forwards only the events of threads the user participates in. The filter is
//! evaluated per event from the participants the event carries, so threads created after
//! the session connected are covered too.
//!
//! A session that lags behind the bus ends; the client reconnects and reloads from the
//! Message Store. Dropping the session (or its stream) unsubscribes.

use crate::bus::{ChatEvent, EventBus, EventKind, EventSubscription, SubscriptionEnded};
use chat_types::UserId;
use futures::stream::{self, Stream};

/// Event kinds delivered to clients.
const SESSION_EVENT_KINDS: [EventKind; 2] = [EventKind::MessageCreated, EventKind::ThreadCreated];

#[derive(Debug)]
pub struct LiveSession {
    user_id: UserId,
    subscription: EventSubscription,
}

impl LiveSession {
    /// Subscribes a session for `user_id`. Only events published from now on are delivered.
    pub fn connect(bus: &EventBus, user_id: UserId) -> Self {
        let subscription = bus.subscribe(&SESSION_EVENT_KINDS);
        tracing::debug!(
            user_id = %user_id,
            subscriber_count = bus.subscriber_count(),
            "live session connected"
        );
        Self {
            user_id,
            subscription,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Waits for the next event visible to this session's user.
    ///
    /// Returns `None` once the session has ended (lagged or bus closed).
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        loop {
            match self.subscription.recv().await {
                Ok(event) if event.is_visible_to(&self.user_id) => return Some(event),
                Ok(_) => continue,
                Err(SubscriptionEnded::Lagged(missed)) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        missed,
                        "live session lagged, closing"
                    );
                    return None;
                }
                Err(SubscriptionEnded::Closed) => return None,
            }
        }
    }

    /// Converts the session into a stream of visible events that ends with the session.
    pub fn into_stream(self) -> impl Stream<Item = ChatEvent> + Send + 'static {
        stream::unfold(self, |mut session| async move {
            let event = session.recv().await?;
            Some((event, session))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Message, MessageId, Participant, Thread, ThreadId, ThreadKind};
    use chat_types::{NonEmptyText, Role};
    use chrono::Utc;
    use futures::StreamExt;
    use std::time::Duration;

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn thread(a: (&str, Role), b: (&str, Role)) -> Thread {
        Thread {
            id: ThreadId::new(),
            kind: ThreadKind::for_roles(a.1, b.1).unwrap(),
            participants: [
                Participant::new(user(a.0), a.1),
                Participant::new(user(b.0), b.1),
            ],
            created_at: Utc::now(),
            last_activity_at: Utc::now(),
        }
    }

    fn message(thread: &Thread, sender: &str, text: &str) -> ChatEvent {
        ChatEvent::message_created(
            thread,
            Message {
                id: MessageId::generate(None),
                thread_id: thread.id.clone(),
                sender: user(sender),
                text: NonEmptyText::optional(Some(text)),
                attachment_url: None,
                created_at: Utc::now(),
            },
        )
    }

    #[tokio::test]
    async fn participants_receive_and_outsiders_do_not() {
        let bus = EventBus::new(32);
        let mut d1 = LiveSession::connect(&bus, user("d1"));
        let mut d2 = LiveSession::connect(&bus, user("d2"));
        let t = thread(("p1", Role::Patient), ("d1", Role::Doctor));

        bus.publish(message(&t, "p1", "Hello"));

        let event = d1.recv().await.unwrap();
        assert_eq!(event.thread_id(), &t.id);

        let leaked = tokio::time::timeout(Duration::from_millis(50), d2.recv()).await;
        assert!(leaked.is_err(), "d2 must not see the p1-d1 thread");
    }

    #[tokio::test]
    async fn threads_created_after_connect_are_delivered() {
        let bus = EventBus::new(32);
        let mut p1 = LiveSession::connect(&bus, user("p1"));

        let later = thread(("p1", Role::Patient), ("d9", Role::Doctor));
        bus.publish(ChatEvent::ThreadCreated {
            thread: later.clone(),
        });
        bus.publish(message(&later, "d9", "Welcome"));

        assert_eq!(p1.recv().await.unwrap().kind(), EventKind::ThreadCreated);
        assert_eq!(p1.recv().await.unwrap().kind(), EventKind::MessageCreated);
    }

    #[tokio::test]
    async fn lagged_session_ends() {
        let bus = EventBus::new(2);
        let mut slow = LiveSession::connect(&bus, user("p1"));
        let t = thread(("p1", Role::Patient), ("d1", Role::Doctor));

        for i in 0..6 {
            bus.publish(message(&t, "d1", &format!("m{i}")));
        }
        assert!(slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn stream_yields_visible_events_and_unsubscribes_on_drop() {
        let bus = EventBus::new(32);
        let stream = LiveSession::connect(&bus, user("d1")).into_stream();
        assert_eq!(bus.subscriber_count(), 1);

        let mine = thread(("p1", Role::Patient), ("d1", Role::Doctor));
        let other = thread(("p2", Role::Patient), ("d2", Role::Doctor));
        bus.publish(message(&other, "p2", "not for d1"));
        bus.publish(message(&mine, "p1", "for d1"));

        let mut stream = Box::pin(stream);
        let event = stream.next().await.unwrap();
        assert_eq!(event.thread_id(), &mine.id);

        drop(stream);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn stream_ends_when_bus_is_dropped() {
        let bus = EventBus::new(4);
        let mut stream = Box::pin(LiveSession::connect(&bus, user("p1")).into_stream());
        drop(bus);
        assert!(stream.next().await.is_none());
    }
}
