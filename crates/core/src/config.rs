//! Core runtime configuration.
//!
//! This module defines configuration that is resolved once at process startup and then
//! passed into core services. Environment variables are never read during request handling,
//! which keeps behaviour consistent across multi-threaded runtimes and test harnesses.

use crate::constants::{
    DEFAULT_EVENT_CAPACITY, DEFAULT_POST_THERAPY_TRAIL_HOURS, DEFAULT_PRE_THERAPY_LEAD_HOURS,
    PAIRS_DIR_NAME, THREADS_DIR_NAME,
};
use crate::notifications::NotificationWindows;
use crate::{ChatError, ChatResult};
use chrono::Duration;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    chat_data_dir: PathBuf,
    event_capacity: usize,
    notification_windows: NotificationWindows,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidInput`] if the event capacity is zero or either
    /// notification window is not positive.
    pub fn new(
        chat_data_dir: PathBuf,
        event_capacity: usize,
        notification_windows: NotificationWindows,
    ) -> ChatResult<Self> {
        if event_capacity == 0 {
            return Err(ChatError::InvalidInput(
                "event capacity must be greater than zero".into(),
            ));
        }
        if notification_windows.pre_lead <= Duration::zero()
            || notification_windows.post_trail <= Duration::zero()
        {
            return Err(ChatError::InvalidInput(
                "notification windows must be positive".into(),
            ));
        }

        Ok(Self {
            chat_data_dir,
            event_capacity,
            notification_windows,
        })
    }

    /// Configuration with default capacity and windows, rooted at `chat_data_dir`.
    pub fn with_defaults(chat_data_dir: PathBuf) -> Self {
        Self {
            chat_data_dir,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            notification_windows: NotificationWindows::default(),
        }
    }

    pub fn chat_data_dir(&self) -> &Path {
        &self.chat_data_dir
    }

    pub fn threads_dir(&self) -> PathBuf {
        self.chat_data_dir.join(THREADS_DIR_NAME)
    }

    pub fn pairs_dir(&self) -> PathBuf {
        self.chat_data_dir.join(PAIRS_DIR_NAME)
    }

    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    pub fn notification_windows(&self) -> NotificationWindows {
        self.notification_windows
    }
}

impl Default for NotificationWindows {
    fn default() -> Self {
        Self {
            pre_lead: Duration::hours(DEFAULT_PRE_THERAPY_LEAD_HOURS),
            post_trail: Duration::hours(DEFAULT_POST_THERAPY_TRAIL_HOURS),
        }
    }
}

/// Parse the Event Bus capacity from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default capacity.
pub fn event_capacity_from_env_value(value: Option<String>) -> ChatResult<usize> {
    match non_empty(value) {
        None => Ok(DEFAULT_EVENT_CAPACITY),
        Some(v) => match v.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ChatError::InvalidInput(format!(
                "event capacity must be a positive integer, got '{}'",
                v
            ))),
        },
    }
}

/// Parse a window length in whole hours from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns `default_hours`.
pub fn hours_from_env_value(
    name: &str,
    value: Option<String>,
    default_hours: i64,
) -> ChatResult<Duration> {
    match non_empty(value) {
        None => Ok(Duration::hours(default_hours)),
        Some(v) => match v.parse::<i64>() {
            Ok(h) if h > 0 => Ok(Duration::hours(h)),
            _ => Err(ChatError::InvalidInput(format!(
                "{} must be a positive number of hours, got '{}'",
                name, v
            ))),
        },
    }
}

/// Builds notification windows from the two optional hour values.
pub fn notification_windows_from_env_values(
    pre_lead_hours: Option<String>,
    post_trail_hours: Option<String>,
) -> ChatResult<NotificationWindows> {
    Ok(NotificationWindows {
        pre_lead: hours_from_env_value(
            "CHAT_PRE_THERAPY_LEAD_HOURS",
            pre_lead_hours,
            DEFAULT_PRE_THERAPY_LEAD_HOURS,
        )?,
        post_trail: hours_from_env_value(
            "CHAT_POST_THERAPY_TRAIL_HOURS",
            post_trail_hours,
            DEFAULT_POST_THERAPY_TRAIL_HOURS,
        )?,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_defaults_when_unset_or_blank() {
        assert_eq!(
            event_capacity_from_env_value(None).unwrap(),
            DEFAULT_EVENT_CAPACITY
        );
        assert_eq!(
            event_capacity_from_env_value(Some("  ".into())).unwrap(),
            DEFAULT_EVENT_CAPACITY
        );
        assert_eq!(event_capacity_from_env_value(Some("64".into())).unwrap(), 64);
    }

    #[test]
    fn capacity_rejects_zero_and_garbage() {
        assert!(event_capacity_from_env_value(Some("0".into())).is_err());
        assert!(event_capacity_from_env_value(Some("lots".into())).is_err());
    }

    #[test]
    fn hours_parse_and_validate() {
        assert_eq!(
            hours_from_env_value("X", Some("12".into()), 24).unwrap(),
            Duration::hours(12)
        );
        assert_eq!(
            hours_from_env_value("X", None, 24).unwrap(),
            Duration::hours(24)
        );
        let err = hours_from_env_value("X", Some("-3".into()), 24).unwrap_err();
        assert!(err.to_string().contains("X must be a positive number"));
    }

    #[test]
    fn core_config_rejects_zero_capacity() {
        let result = CoreConfig::new(
            PathBuf::from("/tmp/chat"),
            0,
            NotificationWindows::default(),
        );
        assert!(matches!(result, Err(ChatError::InvalidInput(_))));
    }

    #[test]
    fn core_config_derives_storage_dirs() {
        let cfg = CoreConfig::with_defaults(PathBuf::from("/srv/chat"));
        assert_eq!(cfg.threads_dir(), PathBuf::from("/srv/chat/threads"));
        assert_eq!(cfg.pairs_dir(), PathBuf::from("/srv/chat/pairs"));
    }
}
