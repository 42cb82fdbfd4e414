//! Constants used throughout the chat core crate.
//!
//! Path and filename constants live here so the on-disk layout is defined in one place.

/// Default directory for chat data when no explicit directory is configured.
pub const DEFAULT_CHAT_DATA_DIR: &str = "chat_data";

/// Directory name for thread records storage.
pub const THREADS_DIR_NAME: &str = "threads";

/// Directory name for the participant-pair index.
pub const PAIRS_DIR_NAME: &str = "pairs";

/// Filename for a thread record.
pub const THREAD_RECORD_FILENAME: &str = "thread.yaml";

/// Filename for a thread's append-only message log.
pub const THREAD_MESSAGES_FILENAME: &str = "messages.jsonl";

/// Extension of pair index entries.
pub const PAIR_FILE_EXTENSION: &str = "pair";

/// Separator between the two user ids of a pair key. User ids never contain it.
pub const PAIR_KEY_SEPARATOR: char = '~';

/// Default Event Bus buffer per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default lead window for pre-therapy reminders, in hours.
pub const DEFAULT_PRE_THERAPY_LEAD_HOURS: i64 = 24;

/// Default trailing window for post-therapy follow-ups, in hours.
pub const DEFAULT_POST_THERAPY_TRAIL_HOURS: i64 = 48;

/// Maximum length of a message text, in characters.
pub const MAX_MESSAGE_TEXT_CHARS: usize = 10_000;

/// Maximum length of an attachment URL, in bytes.
pub const MAX_ATTACHMENT_URL_LEN: usize = 2_048;

/// Largest page a paginated message listing returns.
pub const MAX_PAGE_LIMIT: usize = 500;
