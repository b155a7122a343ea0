use chrono::{NaiveDateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RetryPolicy;
use crate::geocoding::ResolvedLocation;
use crate::model::{CurrentConditions, DailySummary, ForecastSnapshot, HourlyEntry, Language};

use super::{ProviderError, execute_with_retry};

const PROVIDER_NAME: &str = "open_meteo";
const GEOCODE_ENDPOINT: &str = "https://geocoding-api.open-meteo.com/v1/search";
const FORECAST_ENDPOINT: &str = "https://api.open-meteo.com/v1/forecast";
const FORECAST_CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,precipitation,weather_code";
const FORECAST_HOURLY_FIELDS: &str =
    "temperature_2m,precipitation_probability,precipitation,weather_code";
const FORECAST_DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,precipitation_probability_max,precipitation_sum,weather_code";
const HOURLY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Clone, Copy)]
pub struct ForecastParams<'a> {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: &'a str,
    pub forecast_days: usize,
}

#[derive(Debug, Serialize)]
struct GeocodeQuery<'a> {
    name: &'a str,
    count: u8,
    language: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    name: String,
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Serialize)]
struct ForecastQuery<'a> {
    latitude: f64,
    longitude: f64,
    current: &'a str,
    hourly: &'a str,
    daily: &'a str,
    timezone: &'a str,
    forecast_days: usize,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    timezone: Option<String>,
    current: Option<ForecastCurrent>,
    hourly: Option<ForecastHourly>,
    daily: Option<ForecastDaily>,
}

#[derive(Debug, Deserialize)]
struct ForecastCurrent {
    temperature_2m: Option<f64>,
    weather_code: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ForecastHourly {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
    #[serde(default)]
    weather_code: Vec<Option<i32>>,
}

#[derive(Debug, Deserialize)]
struct ForecastDaily {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    weather_code: Vec<Option<i32>>,
}

pub fn fetch_geocode(
    client: &Client,
    city: &str,
    language: Language,
    retry_policy: RetryPolicy,
) -> Result<ResolvedLocation, ProviderError> {
    execute_with_retry(
        PROVIDER_NAME,
        retry_policy,
        || fetch_geocode_once(client, city, language),
        std::thread::sleep,
    )
}

pub fn fetch_forecast(
    client: &Client,
    params: ForecastParams<'_>,
    retry_policy: RetryPolicy,
) -> Result<ForecastSnapshot, ProviderError> {
    execute_with_retry(
        PROVIDER_NAME,
        retry_policy,
        || fetch_forecast_once(client, params),
        std::thread::sleep,
    )
}

fn geocode_query(city: &str, language: Language) -> GeocodeQuery<'_> {
    GeocodeQuery {
        name: city,
        count: 1,
        language: language.code(),
        format: "json",
    }
}

fn fetch_geocode_once(
    client: &Client,
    city: &str,
    language: Language,
) -> Result<ResolvedLocation, ProviderError> {
    let query = geocode_query(city, language);

    tracing::debug!(city, language = language.code(), "geocoding city");
    let body = execute_request(client.get(GEOCODE_ENDPOINT).query(&query))?;
    parse_geocode_response(&body, city)
}

fn fetch_forecast_once(
    client: &Client,
    params: ForecastParams<'_>,
) -> Result<ForecastSnapshot, ProviderError> {
    let query = ForecastQuery {
        latitude: params.latitude,
        longitude: params.longitude,
        current: FORECAST_CURRENT_FIELDS,
        hourly: FORECAST_HOURLY_FIELDS,
        daily: FORECAST_DAILY_FIELDS,
        timezone: params.timezone,
        forecast_days: params.forecast_days,
    };

    tracing::debug!(
        latitude = params.latitude,
        longitude = params.longitude,
        timezone = params.timezone,
        "fetching forecast"
    );
    let body = execute_request(client.get(FORECAST_ENDPOINT).query(&query))?;
    parse_forecast_response(&body)
}

fn execute_request(request: RequestBuilder) -> Result<String, ProviderError> {
    let response = request
        .send()
        .map_err(|error| ProviderError::Transport(error.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .map_err(|error| ProviderError::Transport(error.to_string()))?;

    if status.is_success() {
        return Ok(body);
    }

    let message = extract_error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });

    Err(ProviderError::Http {
        status: status.as_u16(),
        message,
    })
}

fn parse_geocode_response(body: &str, city: &str) -> Result<ResolvedLocation, ProviderError> {
    let payload: GeocodeResponse = serde_json::from_str(body)
        .map_err(|error| ProviderError::InvalidResponse(format!("geocode payload: {error}")))?;

    let Some(result) = payload.results.into_iter().next() else {
        return Err(ProviderError::NotFound(city.to_string()));
    };

    let name = result.name.trim().to_string();
    if name.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "geocode payload: empty location name".to_string(),
        ));
    }

    Ok(ResolvedLocation {
        name,
        latitude: result.latitude,
        longitude: result.longitude,
    })
}

fn parse_forecast_response(body: &str) -> Result<ForecastSnapshot, ProviderError> {
    let payload: ForecastResponse = serde_json::from_str(body)
        .map_err(|error| ProviderError::InvalidResponse(format!("forecast payload: {error}")))?;

    let timezone = payload
        .timezone
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "UTC".to_string());

    let daily = payload
        .daily
        .ok_or_else(|| ProviderError::InvalidResponse("forecast payload: missing daily".into()))?;

    let current = payload
        .current
        .map(|current| CurrentConditions {
            temperature_c: current.temperature_2m.filter(|value| value.is_finite()),
            weather_code: current.weather_code,
        })
        .unwrap_or_default();

    let hourly = match payload.hourly {
        Some(hourly) => build_hourly_entries(hourly)?,
        None => Vec::new(),
    };

    Ok(ForecastSnapshot {
        timezone,
        fetched_at: Utc::now(),
        current,
        daily: build_daily_summaries(daily)?,
        hourly,
    })
}

/// An absent series deserializes empty and reads as all-missing; a present
/// one must line up with `time`.
fn check_series_len<T>(series: &[T], length: usize, section: &str) -> Result<(), ProviderError> {
    if series.is_empty() || series.len() == length {
        return Ok(());
    }
    Err(ProviderError::InvalidResponse(format!(
        "forecast payload: {section} arrays length mismatch"
    )))
}

fn value_at<T: Copy>(series: &[Option<T>], index: usize) -> Option<T> {
    series.get(index).copied().flatten()
}

fn build_daily_summaries(daily: ForecastDaily) -> Result<Vec<DailySummary>, ProviderError> {
    let length = daily.time.len();
    check_series_len(&daily.temperature_2m_max, length, "daily")?;
    check_series_len(&daily.temperature_2m_min, length, "daily")?;
    check_series_len(&daily.precipitation_probability_max, length, "daily")?;
    check_series_len(&daily.precipitation_sum, length, "daily")?;
    check_series_len(&daily.weather_code, length, "daily")?;

    let mut days = Vec::with_capacity(length);
    for index in 0..length {
        let date = daily.time[index].trim().to_string();
        if date.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "forecast payload: empty date in daily.time".to_string(),
            ));
        }

        days.push(DailySummary {
            date,
            max_temp_c: finite(value_at(&daily.temperature_2m_max, index)),
            min_temp_c: finite(value_at(&daily.temperature_2m_min, index)),
            precip_probability_max: value_at(&daily.precipitation_probability_max, index)
                .map(clamp_percentage),
            precip_sum_mm: value_at(&daily.precipitation_sum, index).map(clamp_precipitation),
            weather_code: value_at(&daily.weather_code, index),
        });
    }

    Ok(days)
}

fn build_hourly_entries(hourly: ForecastHourly) -> Result<Vec<HourlyEntry>, ProviderError> {
    let length = hourly.time.len();
    check_series_len(&hourly.temperature_2m, length, "hourly")?;
    check_series_len(&hourly.precipitation_probability, length, "hourly")?;
    check_series_len(&hourly.weather_code, length, "hourly")?;

    let mut entries = Vec::with_capacity(length);
    for index in 0..length {
        let raw_time = hourly.time[index].trim();
        let time = NaiveDateTime::parse_from_str(raw_time, HOURLY_TIME_FORMAT).map_err(|_| {
            ProviderError::InvalidResponse(format!(
                "forecast payload: invalid hourly time '{raw_time}'"
            ))
        })?;

        entries.push(HourlyEntry {
            time,
            temperature_c: finite(value_at(&hourly.temperature_2m, index)),
            weather_code: value_at(&hourly.weather_code, index),
            precip_probability: value_at(&hourly.precipitation_probability, index)
                .map(clamp_percentage),
        });
    }

    Ok(entries)
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|value| value.is_finite())
}

fn clamp_percentage(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.clamp(0.0, 100.0).round() as u8
}

fn clamp_precipitation(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.max(0.0)
}

fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let from_json = serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|json| {
            for key in ["reason", "message", "error", "detail"] {
                if let Some(value) = json.get(key).and_then(Value::as_str) {
                    let message = value.trim();
                    if !message.is_empty() {
                        return Some(message.to_string());
                    }
                }
            }
            None
        });

    from_json.or_else(|| Some(trimmed.to_string()))
}
