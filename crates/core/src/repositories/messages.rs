//! Message Store.
//!
//! Durable, per-thread append-only message log. Each thread keeps its messages in
//! `messages.jsonl` next to its `thread.yaml`, one JSON object per line, in append order.
//!
//! Appends to the same thread serialise on that thread's lock; appends to different threads
//! proceed in parallel. Inside the lock the store generates the message id from the previous
//! one (so ids and `created_at` never go backwards), writes and syncs the line, updates the
//! thread's last activity and publishes `message.created`. Publishing before the lock is
//! released makes the per-thread event order equal to the append order.
//!
//! A single server process owns appends for a data directory. The store remembers the log
//! length after its own last write; if the file on disk has a different length (a torn tail
//! left by a failed write) the log is primed again, which cuts the torn tail first. A write
//! or sync failure rolls the log back to its previous length, so a failed append stores
//! nothing and publishes nothing.

use crate::bus::{ChatEvent, EventBus};
use crate::constants::{MAX_PAGE_LIMIT, THREAD_MESSAGES_FILENAME};
use crate::error::{ChatError, ChatResult};
use crate::model::{Message, MessageBody, MessageId, ThreadId};
use crate::repositories::threads::ThreadRegistry;
use chat_types::UserId;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One page of a thread's messages, oldest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Cursor for the next page; `None` when this page reaches the end of the thread.
    pub next_after: Option<MessageId>,
}

#[derive(Debug, Default)]
struct AppendState {
    primed: bool,
    last_id: Option<MessageId>,
    /// Log length after the last successful write.
    len: u64,
}

/// File-backed message store.
///
/// `locks` keeps one small entry per thread appended to since startup, so it is bounded by
/// the number of threads in the data directory.
pub struct MessageStore {
    registry: Arc<ThreadRegistry>,
    bus: EventBus,
    locks: Mutex<HashMap<ThreadId, Arc<Mutex<AppendState>>>>,
}

impl MessageStore {
    pub fn new(registry: Arc<ThreadRegistry>, bus: EventBus) -> Self {
        Self {
            registry,
            bus,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Appends a message to a thread and publishes `message.created`.
    ///
    /// # Errors
    ///
    /// - [`ChatError::InvalidInput`] if neither text nor attachment is present (nothing is
    ///   stored or published)
    /// - [`ChatError::NotFound`] if the thread does not exist
    /// - [`ChatError::Forbidden`] if `sender` is not a participant
    /// - storage variants if the log cannot be written
    pub fn append(
        &self,
        thread_id: &ThreadId,
        sender: &UserId,
        text: Option<String>,
        attachment_url: Option<String>,
    ) -> ChatResult<Message> {
        let body = MessageBody::new(text, attachment_url)?;
        let thread = self.registry.get(thread_id)?;
        if !thread.has_participant(sender) {
            return Err(ChatError::Forbidden(format!(
                "{} is not a participant of thread {}",
                sender, thread_id
            )));
        }

        let log_path = self.log_path(thread_id);
        let lock = self.thread_lock(thread_id)?;
        let mut state = lock.lock()?;

        if !state.primed || log_len(&log_path)? != state.len {
            state.primed = false;
            let (last_id, len) = prime_log(&log_path)?;
            state.last_id = last_id;
            state.len = len;
            state.primed = true;
        }

        let id = MessageId::generate(state.last_id.as_ref());
        let message = Message {
            created_at: id.timestamp(),
            id,
            thread_id: thread.id.clone(),
            sender: sender.clone(),
            text: body.text().cloned(),
            attachment_url: body.attachment_url().map(str::to_string),
        };

        let mut line = serde_json::to_string(&message).map_err(ChatError::Serialization)?;
        line.push('\n');
        match append_line(&log_path, &line, state.len) {
            Ok(len) => state.len = len,
            Err(e) => {
                state.primed = false;
                return Err(e);
            }
        }
        state.last_id = Some(message.id.clone());

        if let Err(e) = self.registry.record_activity(thread_id, message.created_at) {
            // The message is durable; only the thread list order is stale.
            tracing::warn!(thread_id = %thread_id, "failed to record thread activity: {}", e);
        }

        let delivered = self
            .bus
            .publish(ChatEvent::message_created(&thread, message.clone()));
        drop(state);

        tracing::debug!(
            thread_id = %thread_id,
            message_id = %message.id,
            subscriber_count = delivered,
            "message appended"
        );
        Ok(message)
    }

    /// Returns all messages of a thread in creation order.
    ///
    /// # Errors
    ///
    /// - [`ChatError::NotFound`] if the thread does not exist
    /// - [`ChatError::CorruptStore`] if a complete line cannot be parsed
    pub fn list(&self, thread_id: &ThreadId) -> ChatResult<Vec<Message>> {
        self.registry.get(thread_id)?;
        read_log(&self.log_path(thread_id))
    }

    /// Returns up to `limit` messages created after `after` (or from the start).
    ///
    /// `limit` is capped at the store's maximum page size.
    ///
    /// # Errors
    ///
    /// As [`MessageStore::list`], plus [`ChatError::InvalidInput`] for a zero limit.
    pub fn list_page(
        &self,
        thread_id: &ThreadId,
        after: Option<&MessageId>,
        limit: usize,
    ) -> ChatResult<MessagePage> {
        if limit == 0 {
            return Err(ChatError::InvalidInput("limit must be at least 1".into()));
        }
        let limit = limit.min(MAX_PAGE_LIMIT);

        let mut remaining = self
            .list(thread_id)?
            .into_iter()
            .filter(|m| after.map_or(true, |cursor| &m.id > cursor))
            .peekable();

        let messages: Vec<Message> = remaining.by_ref().take(limit).collect();
        let next_after = match remaining.peek() {
            Some(_) => messages.last().map(|m| m.id.clone()),
            None => None,
        };

        Ok(MessagePage {
            messages,
            next_after,
        })
    }

    fn log_path(&self, thread_id: &ThreadId) -> PathBuf {
        self.registry
            .thread_dir(thread_id)
            .join(THREAD_MESSAGES_FILENAME)
    }

    fn thread_lock(&self, thread_id: &ThreadId) -> ChatResult<Arc<Mutex<AppendState>>> {
        let mut locks = self.locks.lock()?;
        Ok(Arc::clone(locks.entry(thread_id.clone()).or_default()))
    }
}

/// Appends `line` to a log of length `start` and returns the new length.
///
/// On failure the log is cut back to `start`.
fn append_line(path: &Path, line: &str, start: u64) -> ChatResult<u64> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(ChatError::FileWrite)?;

    match file
        .write_all(line.as_bytes())
        .and_then(|()| file.sync_data())
    {
        Ok(()) => Ok(start + line.len() as u64),
        Err(e) => {
            if let Err(rollback) = file.set_len(start).and_then(|()| file.sync_data()) {
                tracing::error!(
                    "failed to roll back message log {}: {}",
                    path.display(),
                    rollback
                );
            }
            Err(ChatError::FileWrite(e))
        }
    }
}

fn log_len(path: &Path) -> ChatResult<u64> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(ChatError::FileRead(e)),
    }
}

fn read_log_contents(path: &Path) -> ChatResult<String> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(ChatError::FileRead(e)),
    }
}

fn read_log(path: &Path) -> ChatResult<Vec<Message>> {
    let contents = read_log_contents(path)?;
    parse_log(&contents, path)
}

fn parse_log(contents: &str, path: &Path) -> ChatResult<Vec<Message>> {
    let complete_len = contents.rfind('\n').map_or(0, |i| i + 1);
    let (complete, torn) = contents.split_at(complete_len);

    if !torn.trim().is_empty() {
        tracing::warn!(
            "skipping incomplete trailing message line in {}",
            path.display()
        );
    }

    complete
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<Message>(line).map_err(|e| {
                ChatError::CorruptStore(format!(
                    "{} line {}: {}",
                    path.display(),
                    index + 1,
                    e
                ))
            })
        })
        .collect()
}

/// Loads the id of the last stored message and cuts off a torn trailing line, so the next
/// append starts on a fresh line. Returns that id and the resulting log length.
fn prime_log(path: &Path) -> ChatResult<(Option<MessageId>, u64)> {
    let contents = read_log_contents(path)?;
    let complete_len = contents.rfind('\n').map_or(0, |i| i + 1);

    if complete_len < contents.len() {
        tracing::warn!(
            "truncating incomplete trailing message line in {}",
            path.display()
        );
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(ChatError::FileWrite)?;
        file.set_len(complete_len as u64)
            .map_err(ChatError::FileWrite)?;
        file.sync_data().map_err(ChatError::FileWrite)?;
    }

    let messages = parse_log(&contents[..complete_len], path)?;
    Ok((messages.last().map(|m| m.id.clone()), complete_len as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventKind;
    use crate::config::CoreConfig;
    use crate::model::{Participant, Thread};
    use chat_types::Role;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        registry: Arc<ThreadRegistry>,
        store: MessageStore,
        bus: EventBus,
    }

    fn setup() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let cfg = Arc::new(CoreConfig::with_defaults(tmp.path().to_path_buf()));
        let bus = EventBus::new(256);
        let registry = Arc::new(ThreadRegistry::new(cfg, bus.clone()));
        let store = MessageStore::new(Arc::clone(&registry), bus.clone());
        Fixture {
            _tmp: tmp,
            registry,
            store,
            bus,
        }
    }

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn patient_doctor_thread(fx: &Fixture) -> Thread {
        fx.registry
            .get_or_create(
                &Participant::new(user("p1"), Role::Patient),
                &Participant::new(user("d1"), Role::Doctor),
            )
            .unwrap()
    }

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages
            .iter()
            .map(|m| m.text.as_ref().map(|t| t.as_str()).unwrap_or(""))
            .collect()
    }

    #[test]
    fn test_append_then_list_in_order() {
        let fx = setup();
        let thread = patient_doctor_thread(&fx);

        fx.store
            .append(&thread.id, &user("p1"), Some("Hello".into()), None)
            .unwrap();
        fx.store
            .append(&thread.id, &user("d1"), Some("Hi".into()), None)
            .unwrap();

        let messages = fx.store.list(&thread.id).unwrap();
        assert_eq!(texts(&messages), vec!["Hello", "Hi"]);
        assert!(messages[0].id < messages[1].id);
        assert!(messages[0].created_at < messages[1].created_at);
        assert_eq!(messages[1].sender, user("d1"));
    }

    #[test]
    fn test_same_tick_appends_keep_order() {
        let fx = setup();
        let thread = patient_doctor_thread(&fx);

        let a = fx
            .store
            .append(&thread.id, &user("p1"), Some("A".into()), None)
            .unwrap();
        let b = fx
            .store
            .append(&thread.id, &user("p1"), Some("B".into()), None)
            .unwrap();

        assert!(b.created_at > a.created_at);
        assert_eq!(texts(&fx.store.list(&thread.id).unwrap()), vec!["A", "B"]);
    }

    #[test]
    fn test_attachment_only_message_is_accepted() {
        let fx = setup();
        let thread = patient_doctor_thread(&fx);

        let message = fx
            .store
            .append(
                &thread.id,
                &user("p1"),
                None,
                Some("https://cdn.example.com/scan.png".into()),
            )
            .unwrap();
        assert!(message.text.is_none());
        assert_eq!(
            fx.store.list(&thread.id).unwrap()[0].attachment_url.as_deref(),
            Some("https://cdn.example.com/scan.png")
        );
    }

    #[tokio::test]
    async fn test_empty_body_rejected_without_store_or_publish() {
        let fx = setup();
        let thread = patient_doctor_thread(&fx);
        let mut rx = fx.bus.subscribe(&[EventKind::MessageCreated]);

        let result = fx
            .store
            .append(&thread.id, &user("p1"), Some("   ".into()), None);
        assert!(matches!(result, Err(ChatError::InvalidInput(_))));
        assert!(fx.store.list(&thread.id).unwrap().is_empty());

        let event = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
        assert!(event.is_err(), "nothing may be published");
    }

    #[test]
    fn test_append_to_unknown_thread_is_not_found() {
        let fx = setup();
        let result = fx
            .store
            .append(&ThreadId::new(), &user("p1"), Some("x".into()), None);
        assert!(matches!(result, Err(ChatError::NotFound(_))));
        assert!(matches!(
            fx.store.list(&ThreadId::new()),
            Err(ChatError::NotFound(_))
        ));
    }

    #[test]
    fn test_append_by_non_participant_is_forbidden() {
        let fx = setup();
        let thread = patient_doctor_thread(&fx);
        let result = fx
            .store
            .append(&thread.id, &user("d2"), Some("sneaky".into()), None);
        assert!(matches!(result, Err(ChatError::Forbidden(_))));
        assert!(fx.store.list(&thread.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_publishes_one_event_with_participants() {
        let fx = setup();
        let thread = patient_doctor_thread(&fx);
        let mut rx = fx.bus.subscribe(&[EventKind::MessageCreated]);

        let message = fx
            .store
            .append(&thread.id, &user("p1"), Some("Hello".into()), None)
            .unwrap();

        match rx.recv().await.unwrap() {
            ChatEvent::MessageCreated {
                thread_id,
                participants,
                message: published,
            } => {
                assert_eq!(thread_id, thread.id);
                assert!(participants.contains(&user("d1")));
                assert_eq!(published, message);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_append_updates_last_activity() {
        let fx = setup();
        let thread = patient_doctor_thread(&fx);
        let message = fx
            .store
            .append(&thread.id, &user("p1"), Some("Hello".into()), None)
            .unwrap();

        let reloaded = fx.registry.get(&thread.id).unwrap();
        assert!(reloaded.last_activity_at >= message.created_at);
        assert_eq!(reloaded.created_at, thread.created_at);
    }

    #[test]
    fn test_torn_trailing_line_is_skipped_and_repaired() {
        let fx = setup();
        let thread = patient_doctor_thread(&fx);
        fx.store
            .append(&thread.id, &user("p1"), Some("kept".into()), None)
            .unwrap();

        let path = fx.store.log_path(&thread.id);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"id\":\"2026").unwrap();

        assert_eq!(texts(&fx.store.list(&thread.id).unwrap()), vec!["kept"]);

        // A fresh store primes from disk and cuts the torn tail before appending.
        let store = MessageStore::new(Arc::clone(&fx.registry), fx.bus.clone());
        store
            .append(&thread.id, &user("d1"), Some("next".into()), None)
            .unwrap();
        assert_eq!(
            texts(&store.list(&thread.id).unwrap()),
            vec!["kept", "next"]
        );
    }

    #[test]
    fn test_torn_tail_after_failed_write_is_cut_by_same_store() {
        let fx = setup();
        let thread = patient_doctor_thread(&fx);
        fx.store
            .append(&thread.id, &user("p1"), Some("kept".into()), None)
            .unwrap();

        // Partial bytes from a write that failed while this store was already primed.
        let path = fx.store.log_path(&thread.id);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"id\":\"2026").unwrap();
        drop(file);

        fx.store
            .append(&thread.id, &user("d1"), Some("next".into()), None)
            .unwrap();
        fx.store
            .append(&thread.id, &user("p1"), Some("last".into()), None)
            .unwrap();

        assert_eq!(
            texts(&fx.store.list(&thread.id).unwrap()),
            vec!["kept", "next", "last"]
        );
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.ends_with('\n'));
    }

    #[test]
    fn test_append_line_reports_new_length() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(THREAD_MESSAGES_FILENAME);

        let len = append_line(&path, "one\n", 0).unwrap();
        assert_eq!(len, 4);
        let len = append_line(&path, "two\n", len).unwrap();
        assert_eq!(len, 8);
        assert_eq!(log_len(&path).unwrap(), 8);
        assert_eq!(log_len(&tmp.path().join("missing.jsonl")).unwrap(), 0);
    }

    #[test]
    fn test_lock_map_holds_one_entry_per_thread() {
        let fx = setup();
        let thread = patient_doctor_thread(&fx);
        for text in ["a", "b", "c"] {
            fx.store
                .append(&thread.id, &user("p1"), Some(text.into()), None)
                .unwrap();
        }
        assert_eq!(fx.store.locks.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_complete_line_is_an_error() {
        let fx = setup();
        let thread = patient_doctor_thread(&fx);
        fs::write(fx.store.log_path(&thread.id), "not json\n").unwrap();

        assert!(matches!(
            fx.store.list(&thread.id),
            Err(ChatError::CorruptStore(_))
        ));
    }

    #[test]
    fn test_restarted_store_continues_after_last_id() {
        let fx = setup();
        let thread = patient_doctor_thread(&fx);
        let first = fx
            .store
            .append(&thread.id, &user("p1"), Some("one".into()), None)
            .unwrap();

        let store = MessageStore::new(Arc::clone(&fx.registry), fx.bus.clone());
        let second = store
            .append(&thread.id, &user("p1"), Some("two".into()), None)
            .unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn test_list_page_walks_the_thread() {
        let fx = setup();
        let thread = patient_doctor_thread(&fx);
        for text in ["1", "2", "3", "4", "5"] {
            fx.store
                .append(&thread.id, &user("p1"), Some(text.into()), None)
                .unwrap();
        }

        let first = fx.store.list_page(&thread.id, None, 2).unwrap();
        assert_eq!(texts(&first.messages), vec!["1", "2"]);
        let cursor = first.next_after.unwrap();

        let second = fx.store.list_page(&thread.id, Some(&cursor), 2).unwrap();
        assert_eq!(texts(&second.messages), vec!["3", "4"]);

        let last = fx
            .store
            .list_page(&thread.id, second.next_after.as_ref(), 2)
            .unwrap();
        assert_eq!(texts(&last.messages), vec!["5"]);
        assert!(last.next_after.is_none());

        assert!(matches!(
            fx.store.list_page(&thread.id, None, 0),
            Err(ChatError::InvalidInput(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_totally_ordered() {
        let fx = setup();
        let thread = patient_doctor_thread(&fx);
        let store = Arc::new(fx.store);
        let mut rx = fx.bus.subscribe(&[EventKind::MessageCreated]);

        let mut handles = Vec::new();
        for i in 0..40 {
            let store = Arc::clone(&store);
            let thread_id = thread.id.clone();
            let sender = if i % 2 == 0 { user("p1") } else { user("d1") };
            handles.push(tokio::task::spawn_blocking(move || {
                store.append(&thread_id, &sender, Some(format!("m{i}")), None)
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.list(&thread.id).unwrap();
        assert_eq!(stored.len(), 40);
        assert!(stored.windows(2).all(|w| w[0].id < w[1].id));

        // Event order matches storage order.
        for expected in &stored {
            match rx.recv().await.unwrap() {
                ChatEvent::MessageCreated { message, .. } => assert_eq!(&message, expected),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }
}
