use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::advisory::{self, AdvisoryDecision, RainAdvisor};
use crate::config::HOURLY_VIEW_LIMIT;
use crate::error::AppError;
use crate::geocoding::ResolvedLocation;
use crate::model::{
    DailySummary, ForecastSnapshot, HourlyEntry, Language, LocationQuery, NotificationTime,
    SelectedLocation,
};
use crate::notification::{
    NotificationContent, NotificationScheduler, PermissionResult, ScheduledNotification,
};
use crate::providers::ForecastSource;
use crate::storage::{KeyValueStore, Preferences};
use crate::weather_code::{self, WeatherIcon};

const NOTIFICATIONS_DENIED_MESSAGE: &str = "notifications are disabled: enable them (unset UMBRELLA_NOTIFICATIONS) to receive rain reminders";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderOutcome {
    Scheduled,
    NotNeeded,
    PermissionDenied,
    /// Time saved, but there is no forecast to evaluate until a region is chosen.
    NoLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionsView {
    pub temperature_c: Option<f64>,
    pub weather_code: Option<i32>,
    pub description: String,
    pub icon: WeatherIcon,
}

impl ConditionsView {
    fn new(temperature_c: Option<f64>, weather_code: Option<i32>, language: Language) -> Self {
        Self {
            temperature_c,
            weather_code,
            description: weather_code::describe(weather_code, language).to_string(),
            icon: WeatherIcon::for_code(weather_code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodayView {
    pub date: String,
    pub max_temp_c: i64,
    pub min_temp_c: i64,
    pub rain_probability: u8,
    pub precipitation_mm: f64,
    pub description: String,
    pub icon: WeatherIcon,
}

impl TodayView {
    fn new(today: &DailySummary, language: Language) -> Self {
        Self {
            date: today.date.clone(),
            max_temp_c: today.max_temp_rounded(),
            min_temp_c: today.min_temp_rounded(),
            rain_probability: today.rain_probability(),
            precipitation_mm: today.precipitation_mm(),
            description: weather_code::describe(today.weather_code, language).to_string(),
            icon: WeatherIcon::for_code(today.weather_code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourView {
    pub time: String,
    pub temperature_c: Option<f64>,
    pub precip_probability: u8,
    pub icon: WeatherIcon,
}

impl From<&HourlyEntry> for HourView {
    fn from(entry: &HourlyEntry) -> Self {
        Self {
            time: entry.time.format("%Y-%m-%dT%H:%M").to_string(),
            temperature_c: entry.temperature_c,
            precip_probability: entry.precip_probability.unwrap_or(0),
            icon: WeatherIcon::for_code(entry.weather_code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReminderView {
    pub time: String,
    pub outcome: ReminderOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomeView {
    pub location: SelectedLocation,
    pub timezone: String,
    pub fetched_at: String,
    pub current: ConditionsView,
    pub today: TodayView,
    pub hourly: Vec<HourView>,
    pub advisory: AdvisoryDecision,
    pub reminder: ReminderView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReminderUpdate {
    pub time: String,
    pub outcome: ReminderOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<AdvisoryDecision>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReminderStatus {
    pub time: String,
    pub permission: PermissionResult,
    pub registered: Vec<ScheduledNotification>,
}

/// Constructed once per process with every collaborator injected.
pub struct UmbrellaClient<'a, F: ?Sized, S, N: ?Sized, C> {
    source: &'a F,
    preferences: &'a Preferences<S>,
    scheduler: &'a N,
    now_fn: C,
    language: Language,
}

impl<'a, F, S, N, C> UmbrellaClient<'a, F, S, N, C>
where
    F: ForecastSource + ?Sized,
    S: KeyValueStore,
    N: NotificationScheduler + ?Sized,
    C: Fn() -> DateTime<Utc>,
{
    pub fn new(
        source: &'a F,
        preferences: &'a Preferences<S>,
        scheduler: &'a N,
        now_fn: C,
        language: Language,
    ) -> Self {
        Self {
            source,
            preferences,
            scheduler,
            now_fn,
            language,
        }
    }

    /// Fetches today's forecast for the saved region and brings the daily
    /// reminder in line with it.
    pub fn load_home(&self) -> Result<HomeView, AppError> {
        let location = self
            .preferences
            .load_location()
            .ok_or_else(AppError::location_missing)?;
        let snapshot = self.fetch(&location)?;
        let time = self.preferences.load_notification_time();

        let outcome = match self.scheduler.request_permission()? {
            PermissionResult::Granted => self.reschedule(&snapshot, time)?,
            PermissionResult::Denied => {
                self.withdraw_reminders()?;
                ReminderOutcome::PermissionDenied
            }
        };

        let now = (self.now_fn)();
        let today = snapshot.today();
        Ok(HomeView {
            timezone: snapshot.timezone.clone(),
            fetched_at: snapshot
                .fetched_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            current: ConditionsView::new(
                snapshot.current.temperature_c,
                snapshot.current.weather_code,
                self.language,
            ),
            today: TodayView::new(&today, self.language),
            hourly: snapshot
                .upcoming_hours(now, HOURLY_VIEW_LIMIT)
                .into_iter()
                .map(HourView::from)
                .collect(),
            advisory: advisory::decide(&snapshot, self.language),
            reminder: ReminderView {
                time: time.to_string(),
                outcome,
            },
            location,
        })
    }

    pub fn current_location(&self) -> Option<SelectedLocation> {
        self.preferences.load_location()
    }

    /// Resolves and saves the active region. The last save wins.
    pub fn select_location(&self, query: &LocationQuery) -> Result<SelectedLocation, AppError> {
        let resolved = match query {
            LocationQuery::City(city) => self.source.geocode_city(city, self.language)?,
            LocationQuery::Coordinates { lat, lon, name } => {
                ResolvedLocation::from_coordinates(*lat, *lon, name.as_deref())
            }
        };

        let selected = resolved.into_selected((self.now_fn)().timestamp_millis());
        self.preferences.save_location(&selected)?;
        Ok(selected)
    }

    /// Saves the new time, then re-evaluates against a freshly fetched forecast.
    pub fn update_reminder_time(&self, time: NotificationTime) -> Result<ReminderUpdate, AppError> {
        self.preferences
            .save_notification_time(time, (self.now_fn)().timestamp_millis())?;

        let Some(location) = self.preferences.load_location() else {
            tracing::info!(time = %time, "no location selected, reminder scheduling skipped");
            return Ok(ReminderUpdate {
                time: time.to_string(),
                outcome: ReminderOutcome::NoLocation,
                advisory: None,
            });
        };

        if self.scheduler.request_permission()? == PermissionResult::Denied {
            self.withdraw_reminders()?;
            return Err(AppError::permission_denied(NOTIFICATIONS_DENIED_MESSAGE));
        }
        let snapshot = self.fetch(&location)?;
        let outcome = self.reschedule(&snapshot, time)?;

        Ok(ReminderUpdate {
            time: time.to_string(),
            outcome,
            advisory: Some(advisory::decide(&snapshot, self.language)),
        })
    }

    pub fn reset_reminder_time(&self) -> Result<ReminderUpdate, AppError> {
        self.update_reminder_time(NotificationTime::default())
    }

    pub fn reminder_status(&self) -> Result<ReminderStatus, AppError> {
        Ok(ReminderStatus {
            time: self.preferences.load_notification_time().to_string(),
            permission: self.scheduler.request_permission()?,
            registered: self.scheduler.scheduled()?,
        })
    }

    pub fn send_test_notification(&self) -> Result<NotificationContent, AppError> {
        self.require_permission()?;
        let content = advisory::test_notification(self.language);
        self.scheduler.send_immediate(&content)?;
        Ok(content)
    }

    /// Forgets the region and reminder time, and drops the registered reminder
    /// so it does not keep firing for a region that is no longer selected.
    pub fn clear_all_data(&self) -> Result<(), AppError> {
        self.preferences.clear_all()?;
        self.scheduler.cancel_all()?;
        Ok(())
    }

    fn fetch(&self, location: &SelectedLocation) -> Result<ForecastSnapshot, AppError> {
        tracing::debug!(
            latitude = location.latitude,
            longitude = location.longitude,
            "fetching forecast"
        );
        Ok(self
            .source
            .fetch_forecast(location.latitude, location.longitude)?)
    }

    fn reschedule(
        &self,
        snapshot: &ForecastSnapshot,
        time: NotificationTime,
    ) -> Result<ReminderOutcome, AppError> {
        let scheduled =
            RainAdvisor::new(self.scheduler, self.language).schedule_if_needed(snapshot, time)?;
        Ok(if scheduled {
            ReminderOutcome::Scheduled
        } else {
            ReminderOutcome::NotNeeded
        })
    }

    /// A reminder registered while notifications were allowed must not
    /// outlive the permission.
    fn withdraw_reminders(&self) -> Result<(), AppError> {
        self.scheduler.cancel_all()?;
        tracing::warn!("notification permission denied, registered reminders cancelled");
        Ok(())
    }

    fn require_permission(&self) -> Result<(), AppError> {
        match self.scheduler.request_permission()? {
            PermissionResult::Granted => Ok(()),
            PermissionResult::Denied => Err(AppError::permission_denied(
                NOTIFICATIONS_DENIED_MESSAGE,
            )),
        }
    }
}
