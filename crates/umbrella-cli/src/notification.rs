//! Local notification scheduling.
//!
//! [`NotificationScheduler`] is the seam to the host's notification service.
//! [`LocalScheduler`] is the desktop implementation: recurring triggers are
//! kept in `notifications.json` and delivered notifications are appended to
//! `outbox.jsonl`. A timer (cron, systemd) runs `umbrella-cli reminder fire`
//! once a minute to deliver whatever is due.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::NotificationTime;
use crate::storage::write_atomic;

const SCHEDULE_FILE: &str = "notifications.json";
const OUTBOX_FILE: &str = "outbox.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionResult {
    Granted,
    Denied,
}

/// Raw forecast numbers carried alongside a reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryPayload {
    pub rain_probability: u8,
    pub precipitation_mm: f64,
    pub max_temp_c: i64,
    pub min_temp_c: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<AdvisoryPayload>,
}

/// Fires every day at `hour:minute` local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTrigger {
    pub hour: u8,
    pub minute: u8,
}

impl DailyTrigger {
    pub fn matches(self, time: NotificationTime) -> bool {
        self.hour == time.hour() && self.minute == time.minute()
    }
}

impl From<NotificationTime> for DailyTrigger {
    fn from(value: NotificationTime) -> Self {
        Self {
            hour: value.hour(),
            minute: value.minute(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    pub trigger: DailyTrigger,
    pub content: NotificationContent,
}

pub trait NotificationScheduler {
    fn request_permission(&self) -> Result<PermissionResult, SchedulerError>;
    /// Removes every registered recurring trigger. No-op when none exist.
    fn cancel_all(&self) -> Result<(), SchedulerError>;
    fn schedule_recurring(
        &self,
        trigger: DailyTrigger,
        content: &NotificationContent,
    ) -> Result<(), SchedulerError>;
    fn send_immediate(&self, content: &NotificationContent) -> Result<(), SchedulerError>;
    fn scheduled(&self) -> Result<Vec<ScheduledNotification>, SchedulerError>;
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("notification store i/o failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("notification store at {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
}

#[derive(Debug, Serialize)]
struct DeliveredRecord<'a> {
    delivered_at: String,
    #[serde(flatten)]
    content: &'a NotificationContent,
}

#[derive(Debug, Clone)]
pub struct LocalScheduler {
    dir: PathBuf,
    enabled: bool,
}

impl LocalScheduler {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
        }
    }

    pub fn schedule_path(&self) -> PathBuf {
        self.dir.join(SCHEDULE_FILE)
    }

    pub fn outbox_path(&self) -> PathBuf {
        self.dir.join(OUTBOX_FILE)
    }

    pub fn due_at(&self, time: NotificationTime) -> Result<Vec<ScheduledNotification>, SchedulerError> {
        Ok(self
            .scheduled()?
            .into_iter()
            .filter(|entry| entry.trigger.matches(time))
            .collect())
    }

    /// Delivers every trigger registered for `time` and returns what was sent.
    /// Nothing is delivered while notifications are disabled.
    pub fn deliver_due(
        &self,
        time: NotificationTime,
    ) -> Result<Vec<ScheduledNotification>, SchedulerError> {
        if !self.enabled {
            tracing::debug!("notifications disabled, skipping delivery");
            return Ok(Vec::new());
        }
        let due = self.due_at(time)?;
        for entry in &due {
            self.send_immediate(&entry.content)?;
        }
        Ok(due)
    }

    fn write_schedule(&self, entries: &[ScheduledNotification]) -> Result<(), SchedulerError> {
        let path = self.schedule_path();
        let payload = serde_json::to_vec(entries).map_err(|error| SchedulerError::Corrupt {
            path: path.clone(),
            message: error.to_string(),
        })?;
        write_atomic(&path, &payload).map_err(|source| SchedulerError::Io { path, source })
    }
}

impl NotificationScheduler for LocalScheduler {
    fn request_permission(&self) -> Result<PermissionResult, SchedulerError> {
        if self.enabled {
            Ok(PermissionResult::Granted)
        } else {
            Ok(PermissionResult::Denied)
        }
    }

    fn cancel_all(&self) -> Result<(), SchedulerError> {
        let path = self.schedule_path();
        if !path.exists() {
            return Ok(());
        }
        self.write_schedule(&[])?;
        tracing::info!("cancelled all scheduled notifications");
        Ok(())
    }

    fn schedule_recurring(
        &self,
        trigger: DailyTrigger,
        content: &NotificationContent,
    ) -> Result<(), SchedulerError> {
        let mut entries = self.scheduled()?;
        entries.push(ScheduledNotification {
            trigger,
            content: content.clone(),
        });
        self.write_schedule(&entries)?;
        tracing::info!(
            hour = trigger.hour,
            minute = trigger.minute,
            "scheduled daily notification"
        );
        Ok(())
    }

    fn send_immediate(&self, content: &NotificationContent) -> Result<(), SchedulerError> {
        let path = self.outbox_path();
        let record = DeliveredRecord {
            delivered_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            content,
        };
        let mut line = serde_json::to_string(&record).map_err(|error| SchedulerError::Corrupt {
            path: path.clone(),
            message: error.to_string(),
        })?;
        line.push('\n');

        let io_error = |source| SchedulerError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_error)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_error)?;
        file.write_all(line.as_bytes()).map_err(io_error)?;

        tracing::info!(title = %content.title, "notification delivered");
        Ok(())
    }

    fn scheduled(&self) -> Result<Vec<ScheduledNotification>, SchedulerError> {
        let path = self.schedule_path();
        let payload = match fs::read_to_string(&path) {
            Ok(payload) => payload,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(SchedulerError::Io { path, source }),
        };

        serde_json::from_str(&payload).map_err(|error| SchedulerError::Corrupt {
            path,
            message: error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(title: &str) -> NotificationContent {
        NotificationContent {
            title: title.to_string(),
            body: "Rain chance 80%".to_string(),
            payload: Some(AdvisoryPayload {
                rain_probability: 80,
                precipitation_mm: 5.2,
                max_temp_c: 23,
                min_temp_c: 18,
            }),
        }
    }

    fn at(hour: u32, minute: u32) -> NotificationTime {
        NotificationTime::new(hour, minute).expect("time")
    }

    #[test]
    fn local_scheduler_cancel_all_is_noop_without_schedule() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scheduler = LocalScheduler::new(dir.path(), true);

        scheduler.cancel_all().expect("cancel");
        assert!(scheduler.scheduled().expect("scheduled").is_empty());
        assert!(!scheduler.schedule_path().exists());
    }

    #[test]
    fn local_scheduler_persists_and_cancels_triggers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scheduler = LocalScheduler::new(dir.path(), true);

        scheduler
            .schedule_recurring(at(7, 30).into(), &content("umbrella"))
            .expect("schedule");

        let reopened = LocalScheduler::new(dir.path(), true);
        let entries = reopened.scheduled().expect("scheduled");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].trigger, DailyTrigger { hour: 7, minute: 30 });
        assert_eq!(entries[0].content, content("umbrella"));

        reopened.cancel_all().expect("cancel");
        assert!(reopened.scheduled().expect("scheduled").is_empty());
    }

    #[test]
    fn local_scheduler_delivers_only_due_triggers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scheduler = LocalScheduler::new(dir.path(), true);
        scheduler
            .schedule_recurring(at(8, 0).into(), &content("morning"))
            .expect("schedule");

        assert!(scheduler.deliver_due(at(8, 1)).expect("deliver").is_empty());
        let delivered = scheduler.deliver_due(at(8, 0)).expect("deliver");
        assert_eq!(delivered.len(), 1);

        let outbox = fs::read_to_string(scheduler.outbox_path()).expect("outbox");
        let lines: Vec<&str> = outbox.lines().collect();
        assert_eq!(lines.len(), 1);
        let json: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(json["title"], "morning");
        assert_eq!(json["payload"]["rain_probability"], 80);
        assert!(json.get("delivered_at").is_some());
    }

    #[test]
    fn local_scheduler_delivers_nothing_when_disabled() {
        let dir = tempfile::tempdir().expect("tempdir");
        LocalScheduler::new(dir.path(), true)
            .schedule_recurring(at(8, 0).into(), &content("stale"))
            .expect("schedule");

        let disabled = LocalScheduler::new(dir.path(), false);
        assert!(disabled.deliver_due(at(8, 0)).expect("deliver").is_empty());
        assert!(!disabled.outbox_path().exists());
    }

    #[test]
    fn local_scheduler_permission_follows_switch() {
        let dir = tempfile::tempdir().expect("tempdir");

        assert_eq!(
            LocalScheduler::new(dir.path(), true)
                .request_permission()
                .expect("permission"),
            PermissionResult::Granted
        );
        assert_eq!(
            LocalScheduler::new(dir.path(), false)
                .request_permission()
                .expect("permission"),
            PermissionResult::Denied
        );
    }

    #[test]
    fn local_scheduler_reports_corrupt_schedule() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scheduler = LocalScheduler::new(dir.path(), true);
        fs::write(scheduler.schedule_path(), "{not-json").expect("seed");

        let error = scheduler.scheduled().expect_err("must fail");
        assert!(matches!(error, SchedulerError::Corrupt { .. }));
    }
}
