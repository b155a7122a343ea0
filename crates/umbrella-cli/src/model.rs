use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_REMINDER_HOUR: u8 = 8;
pub const DEFAULT_REMINDER_MINUTE: u8 = 0;

/// Display language for weather descriptions and reminder messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    En,
    Ko,
}

impl Language {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Self::En),
            "ko" => Some(Self::Ko),
            _ => None,
        }
    }

    /// ISO 639-1 code, as the geocoding API expects it.
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ko => "ko",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature_c: Option<f64>,
    pub weather_code: Option<i32>,
}

/// One day of the daily forecast. Missing provider values stay `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: String,
    pub max_temp_c: Option<f64>,
    pub min_temp_c: Option<f64>,
    pub precip_probability_max: Option<u8>,
    pub precip_sum_mm: Option<f64>,
    pub weather_code: Option<i32>,
}

impl DailySummary {
    pub fn rain_probability(&self) -> u8 {
        self.precip_probability_max.unwrap_or(0)
    }

    pub fn precipitation_mm(&self) -> f64 {
        self.precip_sum_mm.unwrap_or(0.0)
    }

    pub fn max_temp_rounded(&self) -> i64 {
        round_temp(self.max_temp_c)
    }

    pub fn min_temp_rounded(&self) -> i64 {
        round_temp(self.min_temp_c)
    }
}

pub fn round_temp(value: Option<f64>) -> i64 {
    let value = value.filter(|value| value.is_finite()).unwrap_or(0.0);
    value.round() as i64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyEntry {
    /// Wall-clock time in the forecast timezone.
    pub time: NaiveDateTime,
    pub temperature_c: Option<f64>,
    pub weather_code: Option<i32>,
    pub precip_probability: Option<u8>,
}

/// A single forecast fetch. Built fresh on every request and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    pub timezone: String,
    pub fetched_at: DateTime<Utc>,
    pub current: CurrentConditions,
    pub daily: Vec<DailySummary>,
    pub hourly: Vec<HourlyEntry>,
}

impl ForecastSnapshot {
    /// Index 0 of the daily arrays; an all-missing summary when the provider sent none.
    pub fn today(&self) -> DailySummary {
        self.daily.first().cloned().unwrap_or_default()
    }

    pub fn upcoming_hours(&self, now: DateTime<Utc>, limit: usize) -> Vec<&HourlyEntry> {
        let local_now = match self.timezone.parse::<Tz>() {
            Ok(tz) => now.with_timezone(&tz).naive_local(),
            Err(_) => now.naive_utc(),
        };

        self.hourly
            .iter()
            .filter(|entry| entry.time >= local_now)
            .take(limit)
            .collect()
    }
}

/// Daily wall-clock time at which the rain reminder fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationTime {
    hour: u8,
    minute: u8,
}

impl NotificationTime {
    pub fn new(hour: u32, minute: u32) -> Result<Self, ValidationError> {
        if hour > 23 {
            return Err(ValidationError::HourOutOfRange(hour));
        }
        if minute > 59 {
            return Err(ValidationError::MinuteOutOfRange(minute));
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let value = raw.trim();
        let invalid = || ValidationError::InvalidTime(value.to_string());

        let (hour, minute) = value.split_once(':').ok_or_else(invalid)?;
        let hour = hour.trim().parse::<u32>().map_err(|_| invalid())?;
        let minute = minute.trim().parse::<u32>().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }
}

impl Default for NotificationTime {
    fn default() -> Self {
        Self {
            hour: DEFAULT_REMINDER_HOUR,
            minute: DEFAULT_REMINDER_MINUTE,
        }
    }
}

impl fmt::Display for NotificationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// The active region. At most one is stored; the last save wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    #[serde(rename = "timestamp")]
    pub saved_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    City(String),
    Coordinates {
        lat: f64,
        lon: f64,
        name: Option<String>,
    },
}

impl LocationQuery {
    pub fn new(
        city: Option<&str>,
        lat: Option<f64>,
        lon: Option<f64>,
        name: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let has_city = city.is_some();
        let has_coords = lat.is_some() || lon.is_some();

        if has_city && has_coords {
            return Err(ValidationError::ConflictingLocationInput);
        }

        match (city, lat, lon) {
            (Some(raw_city), None, None) => Ok(Self::City(normalize_city(raw_city)?)),
            (None, Some(lat), Some(lon)) => {
                validate_coordinates(lat, lon)?;
                let name = name
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string);
                Ok(Self::Coordinates { lat, lon, name })
            }
            (None, None, None) => Err(ValidationError::MissingLocationInput),
            _ => Err(ValidationError::PartialCoordinates),
        }
    }
}

pub fn normalize_city(raw: &str) -> Result<String, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::EmptyCity);
    }
    Ok(value.to_string())
}

pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), ValidationError> {
    if !((-90.0)..=90.0).contains(&lat) {
        return Err(ValidationError::InvalidLatitude(lat));
    }
    if !((-180.0)..=180.0).contains(&lon) {
        return Err(ValidationError::InvalidLongitude(lon));
    }
    Ok(())
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("missing location input: use --city or --lat/--lon")]
    MissingLocationInput,
    #[error("partial coordinates: provide both --lat and --lon")]
    PartialCoordinates,
    #[error("conflicting location input: use either --city or --lat/--lon")]
    ConflictingLocationInput,
    #[error("city must not be empty")]
    EmptyCity,
    #[error("invalid latitude: {0}")]
    InvalidLatitude(f64),
    #[error("invalid longitude: {0}")]
    InvalidLongitude(f64),
    #[error("invalid time '{0}': expected HH:MM")]
    InvalidTime(String),
    #[error("hour out of range (0-23): {0}")]
    HourOutOfRange(u32),
    #[error("minute out of range (0-59): {0}")]
    MinuteOutOfRange(u32),
}
