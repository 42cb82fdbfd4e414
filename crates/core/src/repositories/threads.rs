//! Thread Registry.
//!
//! Maps an unordered participant pair to exactly one persistent thread.
//!
//! ## Storage
//!
//! ```text
//! <chat_data_dir>/threads/<s1>/<s2>/<thread-uuid>/thread.yaml
//! <chat_data_dir>/pairs/<lo>~<hi>.pair        # contains the thread uuid
//! ```
//!
//! The pair index entry is the commit point of thread creation. It is published with an
//! exclusive hard link only after the thread record is fully written, so a pair entry
//! always points at a complete record. A thread directory without a pair entry (a lost
//! creation race or a crash) is never listed.

use crate::bus::{ChatEvent, EventBus};
use crate::config::CoreConfig;
use crate::constants::{PAIR_FILE_EXTENSION, THREAD_RECORD_FILENAME};
use crate::error::{ChatError, ChatResult};
use crate::model::{PairKey, Participant, ParticipantPair, Thread, ThreadId};
use crate::repositories::shared::{
    create_uuid_and_shard_dir, publish_file_exclusive, read_yaml, write_yaml_atomic,
};
use chat_types::UserId;
use chat_uuid::UuidService;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// One entry of a user's thread list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadSummary {
    pub thread_id: ThreadId,
    pub counterpart: Participant,
    pub last_activity_at: DateTime<Utc>,
}

/// File-backed thread registry.
pub struct ThreadRegistry {
    cfg: Arc<CoreConfig>,
    bus: EventBus,
    // Serialises creators within this process; the pair index handles other processes.
    create_lock: Mutex<()>,
}

impl ThreadRegistry {
    pub fn new(cfg: Arc<CoreConfig>, bus: EventBus) -> Self {
        Self {
            cfg,
            bus,
            create_lock: Mutex::new(()),
        }
    }

    /// Returns the thread for the pair `{a, b}`, creating it if none exists.
    ///
    /// Idempotent and independent of argument order: every caller for the same pair gets
    /// the same thread id, including callers racing each other. A `thread.created` event is
    /// published only when a thread is actually created.
    ///
    /// # Errors
    ///
    /// - [`ChatError::InvalidInput`] for a malformed participant pair
    /// - storage variants if the record or pair index cannot be read or written
    pub fn get_or_create(&self, a: &Participant, b: &Participant) -> ChatResult<Thread> {
        let pair = ParticipantPair::new(a.clone(), b.clone())?;
        let key = pair.key();

        let _guard = self.create_lock.lock()?;

        if let Some(existing) = self.find_by_key(&key)? {
            return Ok(existing);
        }

        let threads_dir = self.cfg.threads_dir();
        let pairs_dir = self.cfg.pairs_dir();
        fs::create_dir_all(&pairs_dir).map_err(ChatError::DirCreation)?;

        let (thread_id, thread_dir) = create_uuid_and_shard_dir(&threads_dir, UuidService::new)?;
        let now = Utc::now();
        let thread = Thread {
            id: thread_id,
            kind: pair.kind(),
            participants: pair.participants().clone(),
            created_at: now,
            last_activity_at: now,
        };

        let published = write_yaml_atomic(&thread_dir.join(THREAD_RECORD_FILENAME), &thread)
            .and_then(|()| {
                publish_file_exclusive(&self.pair_path(&key), thread.id.to_string().as_bytes())
            });

        match published {
            Ok(true) => {
                tracing::info!(thread_id = %thread.id, pair = %key, "thread created");
                self.bus.publish(ChatEvent::ThreadCreated {
                    thread: thread.clone(),
                });
                Ok(thread)
            }
            Ok(false) => {
                // Another process published this pair first.
                remove_provisional_dir(&thread_dir);
                self.find_by_key(&key)?.ok_or_else(|| {
                    ChatError::CorruptStore(format!("pair entry {} has no thread", key))
                })
            }
            Err(e) => {
                remove_provisional_dir(&thread_dir);
                Err(e)
            }
        }
    }

    /// Loads a thread record.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotFound`] if no thread has this id.
    pub fn get(&self, thread_id: &ThreadId) -> ChatResult<Thread> {
        let path = self.record_path(thread_id);
        if !path.is_file() {
            return Err(ChatError::NotFound(format!("thread {}", thread_id)));
        }
        read_yaml(&path)
    }

    /// Looks up the thread for a pair without creating it.
    pub fn find(&self, a: &UserId, b: &UserId) -> ChatResult<Option<Thread>> {
        if a == b {
            return Ok(None);
        }
        self.find_by_key(&PairKey::for_ids(a, b))
    }

    /// Lists every thread `user` participates in.
    ///
    /// Ordered by last activity, most recent first; ties are broken by thread id so the
    /// order is stable.
    pub fn threads_for(&self, user: &UserId) -> ChatResult<Vec<ThreadSummary>> {
        let entries = match fs::read_dir(self.cfg.pairs_dir()) {
            Ok(it) => it,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ChatError::FileRead(e)),
        };

        let mut summaries = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PAIR_FILE_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some((lo, hi)) = PairKey::parse(stem) else {
                tracing::warn!("ignoring malformed pair entry: {}", path.display());
                continue;
            };
            if &lo != user && &hi != user {
                continue;
            }

            let thread = match read_pair_entry(&path).and_then(|id| self.get(&id)) {
                Ok(thread) => thread,
                Err(e) => {
                    tracing::warn!("skipping unreadable thread {}: {}", path.display(), e);
                    continue;
                }
            };
            if let Some(counterpart) = thread.counterpart_of(user) {
                summaries.push(ThreadSummary {
                    thread_id: thread.id.clone(),
                    counterpart: counterpart.clone(),
                    last_activity_at: thread.last_activity_at,
                });
            }
        }

        summaries.sort_by(|x, y| {
            y.last_activity_at
                .cmp(&x.last_activity_at)
                .then_with(|| x.thread_id.cmp(&y.thread_id))
        });
        Ok(summaries)
    }

    /// Moves the thread's `last_activity_at` forward to `at`.
    ///
    /// Callers must hold the thread's append lock; the record is rewritten atomically.
    pub(crate) fn record_activity(&self, thread_id: &ThreadId, at: DateTime<Utc>) -> ChatResult<()> {
        let path = self.record_path(thread_id);
        let mut thread: Thread = read_yaml(&path)?;
        if at <= thread.last_activity_at {
            return Ok(());
        }
        thread.last_activity_at = at;
        write_yaml_atomic(&path, &thread)
    }

    /// Directory holding a thread's record and message log.
    pub(crate) fn thread_dir(&self, thread_id: &ThreadId) -> PathBuf {
        thread_id.sharded_dir(&self.cfg.threads_dir())
    }

    fn record_path(&self, thread_id: &ThreadId) -> PathBuf {
        self.thread_dir(thread_id).join(THREAD_RECORD_FILENAME)
    }

    fn pair_path(&self, key: &PairKey) -> PathBuf {
        self.cfg
            .pairs_dir()
            .join(format!("{}.{}", key, PAIR_FILE_EXTENSION))
    }

    fn find_by_key(&self, key: &PairKey) -> ChatResult<Option<Thread>> {
        let path = self.pair_path(key);
        if !path.is_file() {
            return Ok(None);
        }
        let thread_id = read_pair_entry(&path)?;
        self.get(&thread_id).map(Some).map_err(|e| match e {
            ChatError::NotFound(_) => {
                ChatError::CorruptStore(format!("pair entry {} points at a missing thread", key))
            }
            other => other,
        })
    }
}

fn read_pair_entry(path: &std::path::Path) -> ChatResult<ThreadId> {
    let contents = fs::read_to_string(path).map_err(ChatError::FileRead)?;
    UuidService::parse(contents.trim()).map_err(|_| {
        ChatError::CorruptStore(format!("invalid pair entry: {}", path.display()))
    })
}

fn remove_provisional_dir(dir: &std::path::Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        tracing::warn!("failed to remove provisional thread dir {}: {}", dir.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventKind;
    use crate::model::ThreadKind;
    use chat_types::Role;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ThreadRegistry, EventBus) {
        let temp_dir = TempDir::new().unwrap();
        let cfg = Arc::new(CoreConfig::with_defaults(temp_dir.path().to_path_buf()));
        let bus = EventBus::new(64);
        let registry = ThreadRegistry::new(cfg, bus.clone());
        (temp_dir, registry, bus)
    }

    fn participant(id: &str, role: Role) -> Participant {
        Participant::new(UserId::parse(id).unwrap(), role)
    }

    #[test]
    fn test_get_or_create_is_idempotent_and_order_independent() {
        let (_tmp, registry, _bus) = setup();
        let p1 = participant("p1", Role::Patient);
        let d1 = participant("d1", Role::Doctor);

        let first = registry.get_or_create(&p1, &d1).unwrap();
        let second = registry.get_or_create(&d1, &p1).unwrap();
        let third = registry.get_or_create(&p1, &d1).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.id, third.id);
        assert_eq!(first.kind, ThreadKind::PatientDoctor);
        assert_eq!(registry.get(&first.id).unwrap(), first);
    }

    #[test]
    fn test_distinct_pairs_get_distinct_threads() {
        let (_tmp, registry, _bus) = setup();
        let p1 = participant("p1", Role::Patient);
        let d1 = participant("d1", Role::Doctor);
        let d2 = participant("d2", Role::Doctor);

        let t1 = registry.get_or_create(&p1, &d1).unwrap();
        let t2 = registry.get_or_create(&p1, &d2).unwrap();
        assert_ne!(t1.id, t2.id);
    }

    #[test]
    fn test_get_or_create_rejects_malformed_pairs() {
        let (tmp, registry, _bus) = setup();
        let p1 = participant("p1", Role::Patient);
        let p2 = participant("p2", Role::Patient);

        assert!(matches!(
            registry.get_or_create(&p1, &p2),
            Err(ChatError::InvalidInput(_))
        ));
        assert!(matches!(
            registry.get_or_create(&p1, &p1),
            Err(ChatError::InvalidInput(_))
        ));
        assert!(!tmp.path().join("pairs").exists());
    }

    #[tokio::test]
    async fn test_thread_created_event_only_on_creation() {
        let (_tmp, registry, bus) = setup();
        let mut rx = bus.subscribe(&[EventKind::ThreadCreated]);
        let p1 = participant("p1", Role::Patient);
        let d1 = participant("d1", Role::Doctor);

        let thread = registry.get_or_create(&p1, &d1).unwrap();
        registry.get_or_create(&d1, &p1).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.thread_id(), &thread.id);
        let second = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
        assert!(second.is_err(), "second call must not publish");
    }

    #[test]
    fn test_get_unknown_thread_is_not_found() {
        let (_tmp, registry, _bus) = setup();
        assert!(matches!(
            registry.get(&ThreadId::new()),
            Err(ChatError::NotFound(_))
        ));
    }

    #[test]
    fn test_find_does_not_create() {
        let (tmp, registry, _bus) = setup();
        let p1 = UserId::parse("p1").unwrap();
        let d1 = UserId::parse("d1").unwrap();

        assert!(registry.find(&p1, &d1).unwrap().is_none());
        assert!(!tmp.path().join("threads").exists());

        let created = registry
            .get_or_create(
                &participant("p1", Role::Patient),
                &participant("d1", Role::Doctor),
            )
            .unwrap();
        assert_eq!(registry.find(&d1, &p1).unwrap().unwrap().id, created.id);
    }

    #[test]
    fn test_lost_race_entry_returns_winner() {
        let (tmp, registry, _bus) = setup();
        let p1 = participant("p1", Role::Patient);
        let d1 = participant("d1", Role::Doctor);

        let winner = registry.get_or_create(&p1, &d1).unwrap();

        // A second process-local registry simulates another server process.
        let cfg = Arc::new(CoreConfig::with_defaults(tmp.path().to_path_buf()));
        let other = ThreadRegistry::new(cfg, EventBus::new(4));
        assert_eq!(other.get_or_create(&d1, &p1).unwrap().id, winner.id);
    }

    #[test]
    fn test_threads_for_lists_counterparts_by_recent_activity() {
        let (_tmp, registry, _bus) = setup();
        let p1 = participant("p1", Role::Patient);
        let d1 = participant("d1", Role::Doctor);
        let d2 = participant("d2", Role::Doctor);
        let a1 = participant("a1", Role::Admin);

        let t1 = registry.get_or_create(&p1, &d1).unwrap();
        let t2 = registry.get_or_create(&p1, &d2).unwrap();
        registry.get_or_create(&d1, &a1).unwrap();

        registry
            .record_activity(&t1.id, Utc::now() + chrono::Duration::seconds(10))
            .unwrap();

        let list = registry.threads_for(&p1.id).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].thread_id, t1.id);
        assert_eq!(list[0].counterpart, d1);
        assert_eq!(list[1].thread_id, t2.id);

        let doctor_view = registry.threads_for(&d1.id).unwrap();
        let counterparts: HashSet<_> = doctor_view
            .iter()
            .map(|s| s.counterpart.id.as_str().to_string())
            .collect();
        assert_eq!(counterparts, HashSet::from(["p1".into(), "a1".into()]));

        assert!(registry
            .threads_for(&UserId::parse("nobody").unwrap())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_threads_for_skips_unreadable_entries() {
        let (_tmp, registry, _bus) = setup();
        let p1 = participant("p1", Role::Patient);
        let d1 = participant("d1", Role::Doctor);
        let d2 = participant("d2", Role::Doctor);
        let d3 = participant("d3", Role::Doctor);

        let kept = registry.get_or_create(&p1, &d1).unwrap();
        registry.get_or_create(&p1, &d2).unwrap();
        let missing_record = registry.get_or_create(&p1, &d3).unwrap();

        fs::write(
            registry.pair_path(&PairKey::for_ids(&p1.id, &d2.id)),
            "garbage",
        )
        .unwrap();
        fs::remove_file(registry.record_path(&missing_record.id)).unwrap();

        let list = registry.threads_for(&p1.id).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].thread_id, kept.id);
    }

    #[test]
    fn test_record_activity_never_moves_backwards() {
        let (_tmp, registry, _bus) = setup();
        let thread = registry
            .get_or_create(
                &participant("p1", Role::Patient),
                &participant("d1", Role::Doctor),
            )
            .unwrap();

        registry
            .record_activity(&thread.id, thread.last_activity_at - chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(
            registry.get(&thread.id).unwrap().last_activity_at,
            thread.last_activity_at
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_yields_one_thread() {
        let (tmp, registry, bus) = setup();
        let registry = Arc::new(registry);
        let mut rx = bus.subscribe(&[EventKind::ThreadCreated]);

        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::task::spawn_blocking(move || {
                let p1 = participant("p1", Role::Patient);
                let d1 = participant("d1", Role::Doctor);
                if i % 2 == 0 {
                    registry.get_or_create(&p1, &d1)
                } else {
                    registry.get_or_create(&d1, &p1)
                }
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().unwrap().id);
        }
        assert_eq!(ids.len(), 1);

        rx.recv().await.unwrap();
        let extra = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
        assert!(extra.is_err(), "exactly one thread.created event");

        let pair_entries = fs::read_dir(tmp.path().join("pairs")).unwrap().count();
        assert_eq!(pair_entries, 1);
    }
}
