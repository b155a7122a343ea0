use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;

use crate::config::{FORECAST_DAYS, PROVIDER_TIMEOUT_SECS, RetryPolicy};
use crate::geocoding::ResolvedLocation;
use crate::model::{ForecastSnapshot, Language};

pub mod open_meteo;

/// The external forecast API. Every call returns a fresh snapshot.
pub trait ForecastSource {
    fn fetch_forecast(&self, lat: f64, lon: f64) -> Result<ForecastSnapshot, ProviderError>;
    /// Place names come back in `language` where the geocoder has them.
    fn geocode_city(
        &self,
        city: &str,
        language: Language,
    ) -> Result<ResolvedLocation, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct HttpForecastSource {
    client: Client,
    retry_policy: RetryPolicy,
    timezone: String,
}

impl HttpForecastSource {
    pub fn new(timezone: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            retry_policy: RetryPolicy::default(),
            timezone: timezone.into(),
        })
    }
}

impl ForecastSource for HttpForecastSource {
    fn fetch_forecast(&self, lat: f64, lon: f64) -> Result<ForecastSnapshot, ProviderError> {
        open_meteo::fetch_forecast(
            &self.client,
            open_meteo::ForecastParams {
                latitude: lat,
                longitude: lon,
                timezone: &self.timezone,
                forecast_days: FORECAST_DAYS,
            },
            self.retry_policy,
        )
    }

    fn geocode_city(
        &self,
        city: &str,
        language: Language,
    ) -> Result<ResolvedLocation, ProviderError> {
        open_meteo::fetch_geocode(&self.client, city, language, self.retry_policy)
    }
}

pub fn execute_with_retry<T, F, S>(
    provider_name: &'static str,
    policy: RetryPolicy,
    mut operation: F,
    mut sleep_fn: S,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Result<T, ProviderError>,
    S: FnMut(Duration),
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match operation() {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.retryable() || attempt == max_attempts {
                    return Err(error.with_provider(provider_name));
                }

                let delay = policy.backoff_for_attempt(attempt + 1);
                tracing::debug!(
                    provider = provider_name,
                    attempt,
                    delay_ms = delay,
                    %error,
                    "provider request failed, retrying"
                );
                sleep_fn(Duration::from_millis(delay));
            }
        }
    }

    Err(ProviderError::InvalidResponse(format!(
        "{provider_name}: exhausted retry attempts"
    )))
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http error ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("location not found: {0}")]
    NotFound(String),
}

impl ProviderError {
    pub fn retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            ProviderError::InvalidResponse(_) => false,
            ProviderError::NotFound(_) => false,
        }
    }

    pub fn with_provider(self, provider: &'static str) -> Self {
        match self {
            ProviderError::Transport(message) => {
                ProviderError::Transport(format!("{provider}: {message}"))
            }
            ProviderError::Http { status, message } => ProviderError::Http {
                status,
                message: format!("{provider}: {message}"),
            },
            ProviderError::InvalidResponse(message) => {
                ProviderError::InvalidResponse(format!("{provider}: {message}"))
            }
            // The query text is shown to the user as-is.
            ProviderError::NotFound(query) => ProviderError::NotFound(query),
        }
    }
}
