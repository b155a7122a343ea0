use std::collections::HashMap;
use std::path::PathBuf;

use crate::model::Language;

pub const UMBRELLA_DATA_DIR_ENV: &str = "UMBRELLA_DATA_DIR";
pub const UMBRELLA_TIMEZONE_ENV: &str = "UMBRELLA_TIMEZONE";
pub const UMBRELLA_LANG_ENV: &str = "UMBRELLA_LANG";
pub const UMBRELLA_NOTIFICATIONS_ENV: &str = "UMBRELLA_NOTIFICATIONS";
pub const UMBRELLA_LOG_ENV: &str = "UMBRELLA_LOG";
const XDG_DATA_HOME_ENV: &str = "XDG_DATA_HOME";
const HOME_ENV: &str = "HOME";

const APP_DIR_NAME: &str = "umbrella-cli";

pub const DEFAULT_TIMEZONE: &str = "auto";
pub const DEFAULT_LOG_FILTER: &str = "warn";
pub const FORECAST_DAYS: usize = 7;
pub const HOURLY_VIEW_LIMIT: usize = 12;

pub const PROVIDER_TIMEOUT_SECS: u64 = 5;
pub const PROVIDER_RETRY_MAX_ATTEMPTS: usize = 2;
pub const PROVIDER_RETRY_BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub timezone: String,
    pub language: Language,
    pub notifications_enabled: bool,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            data_dir: resolve_data_dir(&map),
            timezone: resolve_timezone(&map),
            language: resolve_language(&map),
            notifications_enabled: resolve_notifications_enabled(&map),
        }
    }
}

fn non_empty<'a>(env_map: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    env_map
        .get(key)
        .map(String::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn resolve_data_dir(env_map: &HashMap<String, String>) -> PathBuf {
    let home = non_empty(env_map, HOME_ENV);

    if let Some(explicit) = non_empty(env_map, UMBRELLA_DATA_DIR_ENV) {
        return PathBuf::from(expand_home_path(explicit, home));
    }

    if let Some(xdg) = non_empty(env_map, XDG_DATA_HOME_ENV) {
        return PathBuf::from(expand_home_path(xdg, home)).join(APP_DIR_NAME);
    }

    match home {
        Some(home) => PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR_NAME),
        None => std::env::temp_dir().join(APP_DIR_NAME),
    }
}

fn expand_home_path(raw: &str, home: Option<&str>) -> String {
    let trimmed = raw.trim();
    let Some(home) = home else {
        return trimmed.to_string();
    };

    let home = home.trim_end_matches('/');
    let mut expanded = trimmed.replace("$HOME", home);

    if expanded == "~" {
        expanded = home.to_string();
    } else if let Some(rest) = expanded.strip_prefix("~/") {
        expanded = format!("{home}/{rest}");
    }

    expanded
}

fn resolve_timezone(env_map: &HashMap<String, String>) -> String {
    non_empty(env_map, UMBRELLA_TIMEZONE_ENV)
        .unwrap_or(DEFAULT_TIMEZONE)
        .to_string()
}

fn resolve_language(env_map: &HashMap<String, String>) -> Language {
    non_empty(env_map, UMBRELLA_LANG_ENV)
        .and_then(Language::parse)
        .unwrap_or_default()
}

fn resolve_notifications_enabled(env_map: &HashMap<String, String>) -> bool {
    match non_empty(env_map, UMBRELLA_NOTIFICATIONS_ENV) {
        Some(value) => !matches!(
            value.to_ascii_lowercase().as_str(),
            "0" | "false" | "off" | "no" | "denied"
        ),
        None => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: PROVIDER_RETRY_MAX_ATTEMPTS,
            base_backoff_ms: PROVIDER_RETRY_BASE_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    pub fn backoff_for_attempt(self, attempt: usize) -> u64 {
        if attempt <= 1 {
            return 0;
        }

        let shift = (attempt - 2).min(8);
        self.base_backoff_ms.saturating_mul(1_u64 << shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_use_home_data_dir() {
        let config = RuntimeConfig::from_pairs(vec![(HOME_ENV, "/tmp/home")]);

        assert_eq!(
            config.data_dir,
            PathBuf::from("/tmp/home/.local/share/umbrella-cli")
        );
        assert_eq!(config.timezone, DEFAULT_TIMEZONE);
        assert_eq!(config.language, Language::En);
        assert!(config.notifications_enabled);
    }

    #[test]
    fn config_falls_back_to_temp_dir_without_home() {
        let config = RuntimeConfig::from_pairs(Vec::<(String, String)>::new());
        assert!(config.data_dir.ends_with(APP_DIR_NAME));
    }

    #[test]
    fn config_prefers_explicit_data_dir_over_xdg() {
        let config = RuntimeConfig::from_pairs(vec![
            (XDG_DATA_HOME_ENV, "/tmp/xdg"),
            (UMBRELLA_DATA_DIR_ENV, "/tmp/umbrella"),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/umbrella"));

        let config = RuntimeConfig::from_pairs(vec![(XDG_DATA_HOME_ENV, "/tmp/xdg")]);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/xdg/umbrella-cli"));
    }

    #[test]
    fn config_expands_home_prefix_for_data_dir() {
        let config = RuntimeConfig::from_pairs(vec![
            (HOME_ENV, "/tmp/home"),
            (UMBRELLA_DATA_DIR_ENV, "~/.umbrella"),
        ]);

        assert_eq!(config.data_dir, PathBuf::from("/tmp/home/.umbrella"));
    }

    #[test]
    fn config_reads_timezone_language_and_notification_switch() {
        let config = RuntimeConfig::from_pairs(vec![
            (UMBRELLA_TIMEZONE_ENV, "Asia/Seoul"),
            (UMBRELLA_LANG_ENV, "KO"),
            (UMBRELLA_NOTIFICATIONS_ENV, "off"),
        ]);

        assert_eq!(config.timezone, "Asia/Seoul");
        assert_eq!(config.language, Language::Ko);
        assert!(!config.notifications_enabled);
    }

    #[test]
    fn config_ignores_unknown_language() {
        let config = RuntimeConfig::from_pairs(vec![(UMBRELLA_LANG_ENV, "fr")]);
        assert_eq!(config.language, Language::En);
    }

    #[test]
    fn config_retry_policy_backoff_is_deterministic() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff_for_attempt(1), 0);
        assert_eq!(policy.backoff_for_attempt(2), 200);
        assert_eq!(policy.backoff_for_attempt(3), 400);
    }
}
