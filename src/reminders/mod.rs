//! Reminders for the children the assistant looks after.

pub mod store;

pub use store::ReminderStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How often a reminder repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    /// Fires once.
    None,
    /// Every day.
    Daily,
    /// Every week.
    Weekly,
    /// Every month.
    Monthly,
}

/// A stored reminder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    /// Generated identifier.
    pub id: String,
    /// What to remind about.
    pub title: String,
    /// When it is due.
    #[serde(rename = "dateTime")]
    pub date_time: DateTime<Utc>,
    /// Repeat cadence.
    pub repeat: Repeat,
    /// Whether it has been completed.
    pub completed: bool,
    /// When it was created.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Owning child, when the household has several.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Fields for creating a reminder.
#[derive(Debug, Clone)]
pub struct NewReminder {
    /// What to remind about.
    pub title: String,
    /// When it is due.
    pub date_time: DateTime<Utc>,
    /// Repeat cadence.
    pub repeat: Repeat,
    /// Owning child, if any.
    pub owner: Option<String>,
}

impl Reminder {
    fn create(new: NewReminder, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: new.title,
            date_time: new.date_time,
            repeat: new.repeat,
            completed: false,
            created_at: now,
            owner: new.owner,
        }
    }
}

/// Partial update applied to an existing reminder. Unset fields keep their
/// current value.
#[derive(Debug, Clone, Default)]
pub struct ReminderChanges {
    /// New title.
    pub title: Option<String>,
    /// New due time.
    pub date_time: Option<DateTime<Utc>>,
    /// New repeat cadence.
    pub repeat: Option<Repeat>,
    /// New completed flag.
    pub completed: Option<bool>,
}
