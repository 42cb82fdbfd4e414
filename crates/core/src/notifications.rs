//! Notification Aggregator.
//!
//! Notifications are a projection over appointment records, computed on demand and never
//! stored:
//!
//! - **pre-therapy**: upcoming scheduled or confirmed appointments starting within the lead
//!   window, soonest first
//! - **post-therapy**: appointments completed within the trailing window, most recent first
//!
//! Appointments are owned by an external collaborator reached through [`AppointmentSource`].

use crate::{ChatError, ChatResult};
use chat_types::UserId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Time windows used to select pre- and post-therapy notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotificationWindows {
    pub pre_lead: Duration,
    pub post_trail: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

/// An appointment as exported by the appointment store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_id: UserId,
    pub doctor_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub therapy: Option<String>,
    pub start_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Appointment {
    fn involves(&self, user: &UserId) -> bool {
        &self.patient_id == user || &self.doctor_id == user
    }

    fn counterpart_of(&self, user: &UserId) -> &UserId {
        if &self.patient_id == user {
            &self.doctor_id
        } else {
            &self.patient_id
        }
    }
}

/// Source of appointment records.
pub trait AppointmentSource: Send + Sync {
    /// Returns all appointments.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Collaborator`] if the store is unreachable.
    fn appointments(&self) -> ChatResult<Vec<Appointment>>;
}

/// Reads appointments from a YAML export on every call.
///
/// The file holds a YAML sequence of [`Appointment`] records.
#[derive(Clone, Debug)]
pub struct YamlAppointmentSource {
    path: PathBuf,
}

impl YamlAppointmentSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl AppointmentSource for YamlAppointmentSource {
    fn appointments(&self) -> ChatResult<Vec<Appointment>> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            ChatError::Collaborator(format!(
                "appointments file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        serde_yaml::from_str(&contents).map_err(|e| {
            ChatError::Collaborator(format!(
                "appointments file {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PreTherapy,
    PostTherapy,
}

/// A derived notification about one appointment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub appointment_id: String,
    /// The other party of the appointment, seen from the recipient.
    pub counterpart_id: UserId,
    pub therapy: Option<String>,
    /// Start time for pre-therapy, completion time for post-therapy.
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Notifications {
    pub pre: Vec<Notification>,
    pub post: Vec<Notification>,
}

/// Selects the notifications for `user` at `now`.
pub fn aggregate(
    appointments: &[Appointment],
    user: &UserId,
    now: DateTime<Utc>,
    windows: NotificationWindows,
) -> Notifications {
    let pre_until = now + windows.pre_lead;
    let post_since = now - windows.post_trail;

    let notification = |kind, appointment: &Appointment, at| Notification {
        kind,
        appointment_id: appointment.id.clone(),
        counterpart_id: appointment.counterpart_of(user).clone(),
        therapy: appointment.therapy.clone(),
        at,
    };

    let mut pre: Vec<Notification> = appointments
        .iter()
        .filter(|a| a.involves(user))
        .filter(|a| {
            matches!(
                a.status,
                AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
            )
        })
        .filter(|a| a.start_time > now && a.start_time <= pre_until)
        .map(|a| notification(NotificationKind::PreTherapy, a, a.start_time))
        .collect();

    let mut post: Vec<Notification> = appointments
        .iter()
        .filter(|a| a.involves(user) && a.status == AppointmentStatus::Completed)
        .filter_map(|a| {
            let completed = a.completed_at.unwrap_or(a.start_time);
            (completed >= post_since && completed <= now)
                .then(|| notification(NotificationKind::PostTherapy, a, completed))
        })
        .collect();

    pre.sort_by(|x, y| {
        x.at.cmp(&y.at)
            .then_with(|| x.appointment_id.cmp(&y.appointment_id))
    });
    post.sort_by(|x, y| {
        y.at.cmp(&x.at)
            .then_with(|| x.appointment_id.cmp(&y.appointment_id))
    });

    Notifications { pre, post }
}

/// Computes notifications from the configured appointment source.
#[derive(Clone)]
pub struct NotificationAggregator {
    source: Arc<dyn AppointmentSource>,
    windows: NotificationWindows,
}

impl NotificationAggregator {
    pub fn new(source: Arc<dyn AppointmentSource>, windows: NotificationWindows) -> Self {
        Self { source, windows }
    }

    pub fn list_notifications(&self, user: &UserId) -> ChatResult<Notifications> {
        self.list_notifications_at(user, Utc::now())
    }

    pub fn list_notifications_at(
        &self,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> ChatResult<Notifications> {
        let appointments = self.source.appointments()?;
        Ok(aggregate(&appointments, user, now, self.windows))
    }
}
