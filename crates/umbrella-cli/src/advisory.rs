//! Rain advisory: decide how strongly to recommend an umbrella and keep at
//! most one daily reminder registered with the scheduler.

use serde::Serialize;

use crate::model::{DailySummary, ForecastSnapshot, Language, NotificationTime};
use crate::notification::{
    AdvisoryPayload, DailyTrigger, NotificationContent, NotificationScheduler, SchedulerError,
};

const HIGH_PROBABILITY: u8 = 70;
const HIGH_PRECIP_MM: f64 = 5.0;
const MEDIUM_PROBABILITY: u8 = 50;
const MEDIUM_PRECIP_MM: f64 = 1.0;
const LOW_PROBABILITY: u8 = 30;
const LOW_PRECIP_MM: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryLevel {
    None,
    Low,
    Medium,
    High,
}

impl AdvisoryLevel {
    /// First match wins; lower bounds are inclusive.
    pub fn classify(rain_probability: u8, precipitation_mm: f64) -> Self {
        if rain_probability >= HIGH_PROBABILITY || precipitation_mm >= HIGH_PRECIP_MM {
            Self::High
        } else if rain_probability >= MEDIUM_PROBABILITY || precipitation_mm >= MEDIUM_PRECIP_MM {
            Self::Medium
        } else if rain_probability >= LOW_PROBABILITY || precipitation_mm >= LOW_PRECIP_MM {
            Self::Low
        } else {
            Self::None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvisoryDecision {
    pub should_notify: bool,
    pub level: AdvisoryLevel,
    pub message: String,
}

/// Pure. Reads only today's daily values; missing numbers count as zero.
pub fn decide(snapshot: &ForecastSnapshot, language: Language) -> AdvisoryDecision {
    let today = snapshot.today();
    let level = AdvisoryLevel::classify(today.rain_probability(), today.precipitation_mm());

    AdvisoryDecision {
        should_notify: level != AdvisoryLevel::None,
        level,
        message: compose_message(level, &today, language),
    }
}

/// Gate for registering a reminder. Strict, unlike the level thresholds:
/// exactly 30% or exactly 0.1 mm does not pass.
pub fn exceeds_notify_threshold(today: &DailySummary) -> bool {
    today.rain_probability() > LOW_PROBABILITY || today.precipitation_mm() > LOW_PRECIP_MM
}

pub fn precipitation_descriptor(precipitation_mm: f64, language: Language) -> &'static str {
    let bucket = if precipitation_mm >= 10.0 {
        0
    } else if precipitation_mm >= 5.0 {
        1
    } else if precipitation_mm >= 1.0 {
        2
    } else if precipitation_mm > 0.0 {
        3
    } else {
        4
    };

    match (language, bucket) {
        (Language::En, 0) => "heavy rain",
        (Language::En, 1) => "moderate rain",
        (Language::En, 2) => "light rain",
        (Language::En, 3) => "slight rain",
        (Language::En, _) => "no data",
        (Language::Ko, 0) => "많은 비",
        (Language::Ko, 1) => "보통 비",
        (Language::Ko, 2) => "약한 비",
        (Language::Ko, 3) => "가벼운 비",
        (Language::Ko, _) => "정보 없음",
    }
}

fn precipitation_text(precipitation_mm: f64, language: Language) -> String {
    let descriptor = precipitation_descriptor(precipitation_mm, language);
    match language {
        Language::En if precipitation_mm > 0.0 => {
            format!("precipitation {precipitation_mm}mm ({descriptor})")
        }
        Language::En => format!("precipitation {descriptor}"),
        Language::Ko if precipitation_mm > 0.0 => {
            format!("강수량 {precipitation_mm}mm ({descriptor})")
        }
        Language::Ko => format!("강수량 {descriptor}"),
    }
}

fn temperature_text(today: &DailySummary, language: Language) -> String {
    let (max, min) = (today.max_temp_rounded(), today.min_temp_rounded());
    match language {
        Language::En => format!("high {max}°C, low {min}°C"),
        Language::Ko => format!("최고 {max}°C, 최저 {min}°C"),
    }
}

fn compose_message(level: AdvisoryLevel, today: &DailySummary, language: Language) -> String {
    let rain = today.rain_probability();
    let precipitation = precipitation_text(today.precipitation_mm(), language);
    let temperatures = temperature_text(today, language);

    let headline = match (language, level) {
        (Language::En, AdvisoryLevel::High) => "Umbrella essential!",
        (Language::En, AdvisoryLevel::Medium) => "Take an umbrella.",
        (Language::En, AdvisoryLevel::Low) => "Keep an umbrella handy.",
        (Language::En, AdvisoryLevel::None) => "No umbrella needed today.",
        (Language::Ko, AdvisoryLevel::High) => "우산 필수!",
        (Language::Ko, AdvisoryLevel::Medium) => "우산 챙기세요.",
        (Language::Ko, AdvisoryLevel::Low) => "우산을 준비하세요.",
        (Language::Ko, AdvisoryLevel::None) => "우산이 필요하지 않습니다.",
    };

    match language {
        Language::En => format!("{headline} Rain chance {rain}%, {precipitation}. {temperatures}"),
        Language::Ko => format!("{headline} 강수확률 {rain}%, {precipitation}. {temperatures}"),
    }
}

/// Title, body and raw numbers for the daily reminder.
pub fn reminder_content(today: &DailySummary, language: Language) -> NotificationContent {
    let rain = today.rain_probability();
    let precipitation = precipitation_text(today.precipitation_mm(), language);
    let temperatures = temperature_text(today, language);

    let (title, body) = match language {
        Language::En => (
            "🌧️ Take an umbrella!",
            format!("Rain chance {rain}%, {precipitation}\n{temperatures}"),
        ),
        Language::Ko => (
            "🌧️ 우산 챙기세요!",
            format!("강수확률 {rain}%, {precipitation}\n{temperatures}"),
        ),
    };

    NotificationContent {
        title: title.to_string(),
        body,
        payload: Some(AdvisoryPayload {
            rain_probability: rain,
            precipitation_mm: today.precipitation_mm(),
            max_temp_c: today.max_temp_rounded(),
            min_temp_c: today.min_temp_rounded(),
        }),
    }
}

/// Fixed sample used by the manual test action.
pub fn test_notification(language: Language) -> NotificationContent {
    let sample = DailySummary {
        max_temp_c: Some(23.0),
        min_temp_c: Some(18.0),
        precip_probability_max: Some(80),
        precip_sum_mm: Some(5.2),
        ..DailySummary::default()
    };
    let mut content = reminder_content(&sample, language);
    content.title = match language {
        Language::En => "🌧️ Test notification",
        Language::Ko => "🌧️ 테스트 알림",
    }
    .to_string();
    content.payload = None;
    content
}

pub struct RainAdvisor<'a, N: ?Sized> {
    scheduler: &'a N,
    language: Language,
}

impl<'a, N: NotificationScheduler + ?Sized> RainAdvisor<'a, N> {
    pub fn new(scheduler: &'a N, language: Language) -> Self {
        Self {
            scheduler,
            language,
        }
    }

    /// Cancels every registered reminder, then registers one daily trigger at
    /// `time` if today's forecast calls for it. Returns whether it did.
    ///
    /// Callers must not run this concurrently; overlapping calls can race on
    /// the cancel-then-register sequence.
    pub fn schedule_if_needed(
        &self,
        snapshot: &ForecastSnapshot,
        time: NotificationTime,
    ) -> Result<bool, SchedulerError> {
        self.scheduler.cancel_all()?;

        let decision = decide(snapshot, self.language);
        let today = snapshot.today();
        if !decision.should_notify || !exceeds_notify_threshold(&today) {
            tracing::info!(
                level = decision.level.as_str(),
                "rain unlikely, no reminder registered"
            );
            return Ok(false);
        }

        let content = reminder_content(&today, self.language);
        self.scheduler
            .schedule_recurring(DailyTrigger::from(time), &content)?;
        tracing::info!(
            level = decision.level.as_str(),
            time = %time,
            "rain reminder registered"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::io;
    use std::path::PathBuf;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::model::CurrentConditions;
    use crate::notification::{PermissionResult, ScheduledNotification};

    #[derive(Default)]
    struct FakeScheduler {
        registered: RefCell<Vec<ScheduledNotification>>,
        cancel_calls: Cell<usize>,
        fail_schedule: bool,
    }

    impl NotificationScheduler for FakeScheduler {
        fn request_permission(&self) -> Result<PermissionResult, SchedulerError> {
            Ok(PermissionResult::Granted)
        }

        fn cancel_all(&self) -> Result<(), SchedulerError> {
            self.cancel_calls.set(self.cancel_calls.get() + 1);
            self.registered.borrow_mut().clear();
            Ok(())
        }

        fn schedule_recurring(
            &self,
            trigger: DailyTrigger,
            content: &NotificationContent,
        ) -> Result<(), SchedulerError> {
            if self.fail_schedule {
                return Err(SchedulerError::Io {
                    path: PathBuf::from("notifications.json"),
                    source: io::Error::other("service unavailable"),
                });
            }
            self.registered.borrow_mut().push(ScheduledNotification {
                trigger,
                content: content.clone(),
            });
            Ok(())
        }

        fn send_immediate(&self, _content: &NotificationContent) -> Result<(), SchedulerError> {
            Ok(())
        }

        fn scheduled(&self) -> Result<Vec<ScheduledNotification>, SchedulerError> {
            Ok(self.registered.borrow().clone())
        }
    }

    fn snapshot(rain: Option<u8>, precipitation: Option<f64>, max: f64, min: f64) -> ForecastSnapshot {
        ForecastSnapshot {
            timezone: "Asia/Seoul".to_string(),
            fetched_at: Utc
                .with_ymd_and_hms(2026, 6, 1, 0, 0, 0)
                .single()
                .expect("time"),
            current: CurrentConditions::default(),
            daily: vec![DailySummary {
                date: "2026-06-01".to_string(),
                max_temp_c: Some(max),
                min_temp_c: Some(min),
                precip_probability_max: rain,
                precip_sum_mm: precipitation,
                weather_code: Some(63),
            }],
            hourly: Vec::new(),
        }
    }

    fn seven_thirty() -> NotificationTime {
        NotificationTime::new(7, 30).expect("time")
    }

    #[test]
    fn advisory_level_follows_priority_table() {
        let cases = [
            (0, 0.0, AdvisoryLevel::None),
            (29, 0.09, AdvisoryLevel::None),
            (30, 0.0, AdvisoryLevel::Low),
            (0, 0.1, AdvisoryLevel::Low),
            (49, 0.99, AdvisoryLevel::Low),
            (50, 0.0, AdvisoryLevel::Medium),
            (10, 1.0, AdvisoryLevel::Medium),
            (69, 4.99, AdvisoryLevel::Medium),
            (70, 0.0, AdvisoryLevel::High),
            (0, 5.0, AdvisoryLevel::High),
            (100, 30.0, AdvisoryLevel::High),
        ];

        for (rain, precipitation, expected) in cases {
            assert_eq!(
                AdvisoryLevel::classify(rain, precipitation),
                expected,
                "rain={rain} precipitation={precipitation}"
            );
        }
    }

    #[test]
    fn advisory_should_notify_iff_level_is_not_none() {
        for rain in (0..=100).step_by(5) {
            for precipitation in [0.0, 0.05, 0.1, 0.5, 1.0, 4.0, 5.0, 12.0] {
                let decision = decide(
                    &snapshot(Some(rain), Some(precipitation), 20.0, 10.0),
                    Language::En,
                );
                assert_eq!(decision.should_notify, decision.level != AdvisoryLevel::None);
            }
        }
    }

    #[test]
    fn advisory_missing_values_count_as_zero() {
        let decision = decide(&snapshot(None, None, 20.0, 10.0), Language::En);
        assert_eq!(decision.level, AdvisoryLevel::None);
        assert!(!decision.should_notify);

        let mut empty = snapshot(None, None, 0.0, 0.0);
        empty.daily.clear();
        assert_eq!(decide(&empty, Language::En).level, AdvisoryLevel::None);
    }

    #[test]
    fn advisory_rainy_day_message_embeds_numbers() {
        let decision = decide(&snapshot(Some(80), Some(5.2), 23.0, 18.0), Language::En);

        assert_eq!(decision.level, AdvisoryLevel::High);
        assert!(decision.should_notify);
        for needle in ["80", "5.2", "moderate rain", "23", "18"] {
            assert!(
                decision.message.contains(needle),
                "missing {needle} in {}",
                decision.message
            );
        }
    }

    #[test]
    fn advisory_dry_day_message_still_describes_precipitation() {
        let decision = decide(&snapshot(Some(10), Some(0.05), 21.0, 14.0), Language::En);

        assert_eq!(decision.level, AdvisoryLevel::None);
        assert!(decision.message.starts_with("No umbrella needed today."));
        for needle in ["10%", "slight rain", "21", "14"] {
            assert!(
                decision.message.contains(needle),
                "missing {needle} in {}",
                decision.message
            );
        }
    }

    #[test]
    fn advisory_temperatures_are_rounded() {
        let decision = decide(&snapshot(Some(60), Some(2.0), 23.4, 17.6), Language::En);
        assert!(decision.message.contains("high 23°C"));
        assert!(decision.message.contains("low 18°C"));
    }

    #[test]
    fn advisory_korean_message_uses_korean_wording() {
        let decision = decide(&snapshot(Some(80), Some(5.2), 23.0, 18.0), Language::Ko);
        assert!(decision.message.starts_with("우산 필수!"));
        assert!(decision.message.contains("보통 비"));
        assert!(decision.message.contains("최고 23°C"));
    }

    #[test]
    fn advisory_precipitation_descriptor_buckets() {
        assert_eq!(precipitation_descriptor(12.0, Language::En), "heavy rain");
        assert_eq!(precipitation_descriptor(10.0, Language::En), "heavy rain");
        assert_eq!(precipitation_descriptor(5.2, Language::En), "moderate rain");
        assert_eq!(precipitation_descriptor(1.0, Language::En), "light rain");
        assert_eq!(precipitation_descriptor(0.05, Language::En), "slight rain");
        assert_eq!(precipitation_descriptor(0.0, Language::En), "no data");
        assert_eq!(precipitation_descriptor(0.0, Language::Ko), "정보 없음");
    }

    #[test]
    fn advisory_boundary_values_decide_low_but_do_not_register() {
        let scheduler = FakeScheduler::default();
        let advisor = RainAdvisor::new(&scheduler, Language::En);

        for (rain, precipitation) in [(30, 0.0), (0, 0.1), (30, 0.1)] {
            let snapshot = snapshot(Some(rain), Some(precipitation), 20.0, 12.0);
            let decision = decide(&snapshot, Language::En);
            assert_eq!(decision.level, AdvisoryLevel::Low);
            assert!(decision.should_notify);
            assert!(!exceeds_notify_threshold(&snapshot.today()));

            let scheduled = advisor
                .schedule_if_needed(&snapshot, seven_thirty())
                .expect("schedule");
            assert!(!scheduled);
            assert!(scheduler.registered.borrow().is_empty());
        }

        let just_over = snapshot(Some(31), Some(0.0), 20.0, 12.0);
        assert!(
            advisor
                .schedule_if_needed(&just_over, seven_thirty())
                .expect("schedule")
        );
    }

    #[test]
    fn advisory_rainy_day_registers_one_trigger_with_payload() {
        let scheduler = FakeScheduler::default();
        let advisor = RainAdvisor::new(&scheduler, Language::En);

        let scheduled = advisor
            .schedule_if_needed(&snapshot(Some(80), Some(5.2), 23.0, 18.0), seven_thirty())
            .expect("schedule");

        assert!(scheduled);
        let registered = scheduler.registered.borrow();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].trigger, DailyTrigger { hour: 7, minute: 30 });
        assert_eq!(registered[0].content.title, "🌧️ Take an umbrella!");
        assert_eq!(
            registered[0].content.payload,
            Some(AdvisoryPayload {
                rain_probability: 80,
                precipitation_mm: 5.2,
                max_temp_c: 23,
                min_temp_c: 18,
            })
        );
    }

    #[test]
    fn advisory_repeated_scheduling_keeps_single_trigger() {
        let scheduler = FakeScheduler::default();
        let advisor = RainAdvisor::new(&scheduler, Language::En);
        let rainy = snapshot(Some(80), Some(5.2), 23.0, 18.0);

        assert!(advisor.schedule_if_needed(&rainy, seven_thirty()).expect("first"));
        assert!(advisor.schedule_if_needed(&rainy, seven_thirty()).expect("second"));

        assert_eq!(scheduler.cancel_calls.get(), 2);
        assert_eq!(scheduler.registered.borrow().len(), 1);
    }

    #[test]
    fn advisory_dry_day_cancels_prior_trigger() {
        let scheduler = FakeScheduler::default();
        let advisor = RainAdvisor::new(&scheduler, Language::En);
        advisor
            .schedule_if_needed(&snapshot(Some(80), Some(5.2), 23.0, 18.0), seven_thirty())
            .expect("rainy");

        let scheduled = advisor
            .schedule_if_needed(&snapshot(Some(0), Some(0.0), 23.0, 18.0), seven_thirty())
            .expect("dry");

        assert!(!scheduled);
        assert_eq!(scheduler.cancel_calls.get(), 2);
        assert!(scheduler.registered.borrow().is_empty());
    }

    #[test]
    fn advisory_scheduler_failure_propagates() {
        let scheduler = FakeScheduler {
            fail_schedule: true,
            ..FakeScheduler::default()
        };
        let advisor = RainAdvisor::new(&scheduler, Language::En);

        let error = advisor
            .schedule_if_needed(&snapshot(Some(90), Some(8.0), 23.0, 18.0), seven_thirty())
            .expect_err("must fail");
        assert!(matches!(error, SchedulerError::Io { .. }));
        assert_eq!(scheduler.cancel_calls.get(), 1);
    }

    #[test]
    fn advisory_test_notification_uses_fixed_sample() {
        let content = test_notification(Language::Ko);
        assert_eq!(content.title, "🌧️ 테스트 알림");
        assert_eq!(content.body, "강수확률 80%, 강수량 5.2mm (보통 비)\n최고 23°C, 최저 18°C");
        assert_eq!(content.payload, None);
    }
}
