//! `chat watch`: follows the live event stream and keeps unread counters.
//!
//! The stream is reopened after any error or close. After each (re)connect the active
//! thread is listed again, which covers anything missed while disconnected, and its
//! unread counter is reset.

use crate::client::ChatClient;
use crate::sse::{SseDecoder, SseEvent};
use api_shared::dto::{
    MessageCreatedEvent, MessageDto, ThreadCreatedEvent, EVENT_MESSAGE_CREATED,
    EVENT_THREAD_CREATED,
};
use chat_core::{ThreadId, UnreadTracker};
use futures::StreamExt;
use std::time::Duration;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Client-side view state fed by stream events.
pub struct WatchState {
    tracker: UnreadTracker,
}

impl WatchState {
    pub fn new(active: Option<ThreadId>) -> Self {
        let mut tracker = UnreadTracker::new();
        if let Some(thread_id) = active {
            tracker.open(thread_id);
        }
        Self { tracker }
    }

    pub fn active(&self) -> Option<&ThreadId> {
        self.tracker.active()
    }

    pub fn tracker(&self) -> &UnreadTracker {
        &self.tracker
    }

    /// Marks the active thread as freshly loaded.
    pub fn reloaded(&mut self) {
        if let Some(active) = self.tracker.active().cloned() {
            self.tracker.loaded(&active);
        }
    }

    /// Applies one stream event and returns the line to show, if any.
    pub fn apply(&mut self, event: &SseEvent) -> anyhow::Result<Option<String>> {
        match event.event.as_str() {
            EVENT_MESSAGE_CREATED => {
                let created: MessageCreatedEvent = serde_json::from_str(&event.data)?;
                let thread_id = ThreadId::parse(&created.thread_id)?;
                self.tracker.on_message(&thread_id);

                if self.tracker.active() == Some(&thread_id) {
                    Ok(Some(format_message(&created.message)))
                } else {
                    Ok(Some(format!(
                        "[{} unread] new message in {} from {}",
                        self.tracker.count(&thread_id),
                        thread_id,
                        created.message.sender
                    )))
                }
            }
            EVENT_THREAD_CREATED => {
                let created: ThreadCreatedEvent = serde_json::from_str(&event.data)?;
                let ids: Vec<&str> = created.participants.iter().map(|p| p.id.as_str()).collect();
                Ok(Some(format!(
                    "new thread {} ({})",
                    created.thread_id,
                    ids.join(", ")
                )))
            }
            other => {
                tracing::debug!(event = other, "ignoring unknown event");
                Ok(None)
            }
        }
    }
}

pub fn format_message(message: &MessageDto) -> String {
    let mut line = format!("{} {}:", message.created_at, message.sender);
    if let Some(text) = &message.text {
        line.push(' ');
        line.push_str(text);
    }
    if let Some(url) = &message.attachment_url {
        line.push_str(&format!(" [attachment {}]", url));
    }
    line
}

/// Runs until the process is interrupted.
pub async fn run(client: &ChatClient, active: Option<ThreadId>) -> anyhow::Result<()> {
    let mut state = WatchState::new(active);
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match client.health().await {
            Ok(health) if !health.storage_reachable => {
                println!("offline: server storage unreachable");
            }
            Ok(_) => {}
            Err(e) => println!("offline: {}", e),
        }

        match client.events().await {
            Ok(response) => {
                backoff = INITIAL_BACKOFF;
                if let Err(e) = reload_active(client, &mut state).await {
                    tracing::warn!("failed to reload active thread: {:#}", e);
                }

                let mut decoder = SseDecoder::new();
                let mut body = response.bytes_stream();
                while let Some(chunk) = body.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            tracing::warn!("live stream error: {}", e);
                            break;
                        }
                    };
                    for event in decoder.push(&chunk) {
                        match state.apply(&event) {
                            Ok(Some(line)) => println!("{}", line),
                            Ok(None) => {}
                            Err(e) => tracing::warn!("bad event {}: {:#}", event.event, e),
                        }
                    }
                }
                println!("live stream closed; reconnecting");
            }
            Err(e) => {
                tracing::warn!("failed to open live stream: {:#}", e);
            }
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn reload_active(client: &ChatClient, state: &mut WatchState) -> anyhow::Result<()> {
    let Some(active) = state.active().cloned() else {
        return Ok(());
    };
    let res = client.messages(&active.to_string(), None, None).await?;
    println!("-- {} ({} messages)", active, res.messages.len());
    for message in &res.messages {
        println!("{}", format_message(message));
    }
    state.reloaded();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_event(thread_id: &ThreadId, sender: &str, text: &str) -> SseEvent {
        let data = serde_json::json!({
            "threadId": thread_id.to_string(),
            "message": {
                "id": "m1",
                "sender": sender,
                "text": text,
                "createdAt": "2026-01-01T10:00:00.000Z"
            }
        });
        SseEvent {
            event: EVENT_MESSAGE_CREATED.into(),
            data: data.to_string(),
            id: Some("m1".into()),
        }
    }

    #[test]
    fn messages_in_other_threads_count_as_unread() {
        let active = ThreadId::new();
        let other = ThreadId::new();
        let mut state = WatchState::new(Some(active.clone()));

        let line = state.apply(&message_event(&other, "d1", "hi")).unwrap();
        assert!(line.unwrap().starts_with("[1 unread]"));
        state.apply(&message_event(&other, "d1", "again")).unwrap();
        assert_eq!(state.tracker().count(&other), 2);

        let line = state
            .apply(&message_event(&active, "d2", "in view"))
            .unwrap()
            .unwrap();
        assert!(line.ends_with("d2: in view"));
        assert_eq!(state.tracker().count(&active), 0);
    }

    #[test]
    fn reload_clears_only_the_active_thread() {
        let active = ThreadId::new();
        let other = ThreadId::new();
        let mut state = WatchState::new(None);
        state.apply(&message_event(&active, "d1", "x")).unwrap();
        state.apply(&message_event(&other, "d1", "y")).unwrap();

        state.reloaded();
        assert_eq!(state.tracker().total(), 2);

        let mut state = WatchState::new(Some(active.clone()));
        state.apply(&message_event(&other, "d1", "y")).unwrap();
        state.reloaded();
        assert_eq!(state.tracker().count(&other), 1);
    }

    #[test]
    fn malformed_event_data_is_an_error() {
        let mut state = WatchState::new(None);
        let bad = SseEvent {
            event: EVENT_MESSAGE_CREATED.into(),
            data: "not json".into(),
            id: None,
        };
        assert!(state.apply(&bad).is_err());
        assert_eq!(state.tracker().total(), 0);

        let unknown = SseEvent {
            event: "presence".into(),
            data: "{}".into(),
            id: None,
        };
        assert!(state.apply(&unknown).unwrap().is_none());
    }

    #[test]
    fn attachments_are_shown() {
        let message = MessageDto {
            id: "m".into(),
            sender: "p1".into(),
            text: None,
            attachment_url: Some("https://files.example/x.png".into()),
            created_at: "2026-01-01T10:00:00.000Z".into(),
        };
        assert_eq!(
            format_message(&message),
            "2026-01-01T10:00:00.000Z p1: [attachment https://files.example/x.png]"
        );
    }
}
