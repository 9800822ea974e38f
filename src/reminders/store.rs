//! Filesystem-backed reminder store.
//!
//! Each reminder lives in `{data_dir}/{id}.json`. Writes are atomic (temp
//! file + fsync + rename) to prevent corruption on crash. Before every list
//! fetch a maintenance pass marks overdue non-repeating reminders completed.

use crate::error::{AssistantError, Result};
use crate::reminders::{NewReminder, Reminder, ReminderChanges, Repeat};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filesystem-backed reminder store.
#[derive(Debug, Clone)]
pub struct ReminderStore {
    data_dir: PathBuf,
}

impl ReminderStore {
    /// Create a store, creating the data directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|e| {
            AssistantError::Store(format!(
                "failed to create reminder directory {}: {e}",
                data_dir.display()
            ))
        })?;
        Ok(Self { data_dir })
    }

    /// The directory holding the reminder documents.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Create and persist a reminder.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn create(&self, new: NewReminder) -> Result<Reminder> {
        let reminder = Reminder::create(new, Utc::now());
        self.write_atomic(&reminder)?;
        Ok(reminder)
    }

    /// Load one reminder.
    ///
    /// # Errors
    ///
    /// Returns an error if the reminder does not exist or cannot be parsed.
    pub fn get(&self, id: &str) -> Result<Reminder> {
        let path = self.reminder_path(id);
        if !path.exists() {
            return Err(AssistantError::Store(format!("reminder not found: {id}")));
        }
        self.read_file(&path)
    }

    /// List reminders, newest first, optionally filtered by owner.
    ///
    /// Runs the maintenance pass first, so overdue one-shot reminders come
    /// back already completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read. Unparseable
    /// documents are skipped, not fatal.
    pub fn list(&self, owner: Option<&str>) -> Result<Vec<Reminder>> {
        self.run_maintenance(Utc::now())?;
        let mut reminders = self.load_all()?;
        if let Some(owner) = owner {
            reminders.retain(|r| r.owner.as_deref() == Some(owner));
        }
        reminders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reminders)
    }

    /// Apply a partial update to a reminder.
    ///
    /// # Errors
    ///
    /// Returns an error if the reminder does not exist or cannot be written.
    pub fn update(&self, id: &str, changes: ReminderChanges) -> Result<Reminder> {
        let mut reminder = self.get(id)?;
        if let Some(title) = changes.title {
            reminder.title = title;
        }
        if let Some(date_time) = changes.date_time {
            reminder.date_time = date_time;
        }
        if let Some(repeat) = changes.repeat {
            reminder.repeat = repeat;
        }
        if let Some(completed) = changes.completed {
            reminder.completed = completed;
        }
        self.write_atomic(&reminder)?;
        Ok(reminder)
    }

    /// Delete a reminder. Deleting a missing reminder is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the document exists but cannot be removed.
    pub fn delete(&self, id: &str) -> Result<()> {
        let path = self.reminder_path(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AssistantError::Store(format!(
                "failed to delete {}: {e}",
                path.display()
            ))),
        }
    }

    /// Mark overdue non-repeating reminders completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or an updated
    /// document cannot be written.
    pub fn run_maintenance(&self, now: DateTime<Utc>) -> Result<()> {
        for mut reminder in self.load_all()? {
            if reminder.repeat == Repeat::None && !reminder.completed && reminder.date_time < now {
                debug!(id = %reminder.id, "marking overdue reminder completed");
                reminder.completed = true;
                self.write_atomic(&reminder)?;
            }
        }
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Reminder>> {
        let entries = std::fs::read_dir(&self.data_dir).map_err(|e| {
            AssistantError::Store(format!(
                "failed to read reminder directory {}: {e}",
                self.data_dir.display()
            ))
        })?;

        let mut reminders = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match self.read_file(&path) {
                Ok(reminder) => reminders.push(reminder),
                Err(e) => debug!(path = %path.display(), %e, "skipping unreadable reminder"),
            }
        }
        Ok(reminders)
    }

    fn reminder_path(&self, id: &str) -> PathBuf {
        self.data_dir.join(format!("{id}.json"))
    }

    fn read_file(&self, path: &Path) -> Result<Reminder> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AssistantError::Store(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AssistantError::Store(format!("failed to parse {}: {e}", path.display()))
        })
    }

    fn write_atomic(&self, reminder: &Reminder) -> Result<()> {
        let path = self.reminder_path(&reminder.id);
        let json = serde_json::to_string_pretty(reminder)
            .map_err(|e| AssistantError::Store(format!("failed to serialize reminder: {e}")))?;

        let tmp_path = self.data_dir.join(format!(".{}.tmp", reminder.id));
        std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| {
            AssistantError::Store(format!("failed to write {}: {e}", tmp_path.display()))
        })?;

        if let Ok(file) = std::fs::File::open(&tmp_path) {
            let _ = file.sync_all();
        }

        std::fs::rename(&tmp_path, &path).map_err(|e| {
            AssistantError::Store(format!("failed to rename into {}: {e}", path.display()))
        })?;

        Ok(())
    }
}
