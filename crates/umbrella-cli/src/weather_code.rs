use serde::Serialize;

use crate::model::Language;

pub fn description(code: i32, language: Language) -> &'static str {
    match language {
        Language::En => description_en(code),
        Language::Ko => description_ko(code),
    }
}

/// `None` (no code in the payload) describes as unknown.
pub fn describe(code: Option<i32>, language: Language) -> &'static str {
    match (code, language) {
        (Some(code), _) => description(code, language),
        (None, Language::En) => "unknown",
        (None, Language::Ko) => "알 수 없음",
    }
}

fn description_en(code: i32) -> &'static str {
    match code {
        0 => "clear sky",
        1 => "mainly clear",
        2 => "partly cloudy",
        3 => "overcast",
        45 => "fog",
        48 => "depositing rime fog",
        51 => "light drizzle",
        53 => "moderate drizzle",
        55 => "dense drizzle",
        61 => "slight rain",
        63 => "moderate rain",
        65 => "heavy rain",
        71 => "slight snow",
        73 => "moderate snow",
        75 => "heavy snow",
        95 => "thunderstorm",
        _ => "unknown",
    }
}

fn description_ko(code: i32) -> &'static str {
    match code {
        0 => "맑음",
        1 => "대체로 맑음",
        2 => "부분적으로 흐림",
        3 => "흐림",
        45 => "안개",
        48 => "서리 안개",
        51 => "가벼운 이슬비",
        53 => "보통 이슬비",
        55 => "강한 이슬비",
        61 => "약한 비",
        63 => "보통 비",
        65 => "강한 비",
        71 => "약한 눈",
        73 => "보통 눈",
        75 => "강한 눈",
        95 => "뇌우",
        _ => "알 수 없음",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherIcon {
    Sun,
    Cloud,
    Fog,
    Rain,
    Snow,
    Storm,
    PartlyCloudy,
}

impl WeatherIcon {
    /// Ordered range checks; the first match wins.
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            Self::Sun
        } else if code <= 3 {
            Self::Cloud
        } else if code <= 48 {
            Self::Fog
        } else if code <= 65 {
            Self::Rain
        } else if code <= 75 {
            Self::Snow
        } else if code >= 95 {
            Self::Storm
        } else {
            Self::PartlyCloudy
        }
    }

    pub fn for_code(code: Option<i32>) -> Self {
        code.map(Self::from_code).unwrap_or(Self::PartlyCloudy)
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Self::Sun => "☀️",
            Self::Cloud => "⛅",
            Self::Fog => "🌫️",
            Self::Rain => "🌧️",
            Self::Snow => "❄️",
            Self::Storm => "⛈️",
            Self::PartlyCloudy => "🌤️",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sun => "sun",
            Self::Cloud => "cloud",
            Self::Fog => "fog",
            Self::Rain => "rain",
            Self::Snow => "snow",
            Self::Storm => "storm",
            Self::PartlyCloudy => "partly_cloudy",
        }
    }
}
