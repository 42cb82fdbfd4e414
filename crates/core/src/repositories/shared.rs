//! Shared repository utilities.
//!
//! File system operations used by both the thread registry and the message store:
//!
//! - **Directory allocation**: [`create_uuid_and_shard_dir`] creates a unique sharded
//!   directory for a new record.
//! - **Atomic writes**: [`write_file_atomic`] replaces a file via temp + rename, so readers
//!   see either the old or the new content.
//! - **Exclusive publish**: [`publish_file_exclusive`] creates a file only if no other
//!   writer (in this or another process) has created it first.
//! - **Traversal**: [`sharded_record_dirs`] walks the `<s1>/<s2>/<uuid>/` layout.

use crate::error::{ChatError, ChatResult};
use chat_uuid::UuidService;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};

/// Creates a unique sharded directory within the base records directory.
///
/// UUIDs come from `uuid_source`; a candidate that already exists is skipped, up to 5
/// attempts.
///
/// # Errors
///
/// Returns [`ChatError::DirCreation`] if parent directory creation fails or no unique
/// directory could be allocated.
pub(crate) fn create_uuid_and_shard_dir(
    base_dir: &Path,
    mut uuid_source: impl FnMut() -> UuidService,
) -> ChatResult<(UuidService, PathBuf)> {
    for _attempt in 0..5 {
        let uuid = uuid_source();
        let candidate = uuid.sharded_dir(base_dir);

        if candidate.exists() {
            continue;
        }

        if let Some(parent) = candidate.parent() {
            fs::create_dir_all(parent).map_err(ChatError::DirCreation)?;
        }

        match fs::create_dir(&candidate) {
            Ok(()) => return Ok((uuid, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(ChatError::DirCreation(e)),
        }
    }

    Err(ChatError::DirCreation(io::Error::new(
        ErrorKind::AlreadyExists,
        "failed to allocate a unique thread directory after 5 attempts",
    )))
}

/// Writes `contents` to a uniquely named temp file next to `path` and syncs it.
fn write_temp_sibling(path: &Path, contents: &[u8]) -> ChatResult<PathBuf> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    let temp = parent.join(format!(".{}.{}.tmp", file_name, UuidService::new()));

    let result = (|| {
        let mut file = fs::File::create(&temp)?;
        file.write_all(contents)?;
        file.sync_all()
    })();

    match result {
        Ok(()) => Ok(temp),
        Err(e) => {
            let _ = fs::remove_file(&temp);
            Err(ChatError::FileWrite(e))
        }
    }
}

/// Replaces the file at `path` atomically.
///
/// # Errors
///
/// Returns [`ChatError::FileWrite`] if the temp file cannot be written or renamed.
pub(crate) fn write_file_atomic(path: &Path, contents: &[u8]) -> ChatResult<()> {
    let temp = write_temp_sibling(path, contents)?;
    fs::rename(&temp, path).map_err(|e| {
        let _ = fs::remove_file(&temp);
        ChatError::FileWrite(e)
    })
}

/// Creates the file at `path` with `contents` unless it already exists.
///
/// The content is fully written and synced before it becomes visible, and the final step
/// is a hard link, which fails if the target exists. Of several concurrent callers exactly
/// one gets `Ok(true)`; the others get `Ok(false)` and must read the winner's file.
///
/// # Errors
///
/// Returns [`ChatError::FileWrite`] on any I/O failure other than the target existing.
pub(crate) fn publish_file_exclusive(path: &Path, contents: &[u8]) -> ChatResult<bool> {
    let temp = write_temp_sibling(path, contents)?;
    let linked = fs::hard_link(&temp, path);
    let _ = fs::remove_file(&temp);

    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(ChatError::FileWrite(e)),
    }
}

/// Reads and parses a YAML record.
pub(crate) fn read_yaml<T: DeserializeOwned>(path: &Path) -> ChatResult<T> {
    let contents = fs::read_to_string(path).map_err(ChatError::FileRead)?;
    serde_yaml::from_str(&contents).map_err(ChatError::YamlDeserialization)
}

/// Serialises `value` as YAML and writes it atomically.
pub(crate) fn write_yaml_atomic<T: Serialize>(path: &Path, value: &T) -> ChatResult<()> {
    let contents = serde_yaml::to_string(value).map_err(ChatError::YamlSerialization)?;
    write_file_atomic(path, contents.as_bytes())
}

/// Returns every record directory under a sharded base directory.
///
/// Expects `<base>/<s1>/<s2>/<32hex-uuid>/`. Entries that are not directories or whose
/// leaf name is not a canonical UUID are skipped. A missing base directory yields an
/// empty list.
///
/// # Errors
///
/// Returns [`ChatError::FileRead`] if a directory exists but cannot be listed.
pub(crate) fn sharded_record_dirs(base_dir: &Path) -> ChatResult<Vec<(UuidService, PathBuf)>> {
    let mut records = Vec::new();

    for s1 in read_subdirs(base_dir)? {
        for s2 in read_subdirs(&s1)? {
            for leaf in read_subdirs(&s2)? {
                let Some(name) = leaf.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                match UuidService::parse(name) {
                    Ok(uuid) => records.push((uuid, leaf)),
                    Err(_) => {
                        tracing::debug!("skipping non-record directory: {}", leaf.display());
                    }
                }
            }
        }
    }

    Ok(records)
}

fn read_subdirs(dir: &Path) -> ChatResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(it) => it,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ChatError::FileRead(e)),
    };

    Ok(entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect())
}
