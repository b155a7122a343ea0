use chrono::{DateTime, Local, Timelike, Utc};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use umbrella_cli::{
    config::{DEFAULT_LOG_FILTER, RuntimeConfig, UMBRELLA_LOG_ENV},
    error::{AppError, ErrorKind},
    model::{Language, LocationQuery, NotificationTime, SelectedLocation, ValidationError},
    notification::{LocalScheduler, NotificationContent, ScheduledNotification},
    providers::{ForecastSource, HttpForecastSource},
    service::{HomeView, ReminderOutcome, ReminderStatus, ReminderUpdate, UmbrellaClient},
    storage::{FileStore, Preferences},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Daily rain forecast with umbrella reminders")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Current conditions, today, the next hours, and the umbrella advisory.
    Forecast {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Choose or inspect the forecast region.
    Location {
        #[command(subcommand)]
        action: LocationCommand,
    },
    /// Manage the daily rain reminder.
    Reminder {
        #[command(subcommand)]
        action: ReminderCommand,
    },
    /// Forget the saved region and reminder time.
    Reset {
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, Subcommand)]
enum LocationCommand {
    /// Save a region by city name or by coordinates.
    Set {
        #[arg(long)]
        city: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
        /// Display name for coordinates.
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    Show {
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, Subcommand)]
enum ReminderCommand {
    Show {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Change the reminder time (HH:MM, 24-hour).
    Set {
        #[arg(long)]
        time: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Restore the 08:00 default.
    Reset {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Send a sample notification right away.
    Test {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Deliver reminders due now (run once a minute from cron or a systemd timer).
    Fire {
        /// Override the wall-clock time (HH:MM).
        #[arg(long)]
        at: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, Clone, Copy, Default, Args)]
struct OutputArgs {
    #[arg(long, value_enum)]
    output: Option<OutputModeArg>,
    #[arg(long)]
    json: bool,
    #[arg(long, value_enum)]
    lang: Option<LanguageArg>,
}

const ENVELOPE_SCHEMA_VERSION: &str = "v1";
const ERROR_CODE_USER_INVALID_INPUT: &str = "user.invalid_input";
const ERROR_CODE_USER_OUTPUT_MODE_CONFLICT: &str = "user.output_mode_conflict";
const ERROR_CODE_RUNTIME_PROVIDER_INIT: &str = "runtime.provider_init_failed";
const ERROR_CODE_RUNTIME_SERIALIZE: &str = "runtime.serialize_failed";
const RETRY_HINT: &str = "hint: this looks temporary, run the same command again to retry";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputModeArg {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliOutputMode {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LanguageArg {
    En,
    Ko,
}

impl From<OutputModeArg> for CliOutputMode {
    fn from(value: OutputModeArg) -> Self {
        match value {
            OutputModeArg::Human => CliOutputMode::Human,
            OutputModeArg::Json => CliOutputMode::Json,
        }
    }
}

impl From<LanguageArg> for Language {
    fn from(value: LanguageArg) -> Self {
        match value {
            LanguageArg::En => Language::En,
            LanguageArg::Ko => Language::Ko,
        }
    }
}

impl Cli {
    fn command_name(&self) -> &'static str {
        match &self.command {
            Commands::Forecast { .. } => "umbrella.forecast",
            Commands::Location { action } => match action {
                LocationCommand::Set { .. } => "umbrella.location.set",
                LocationCommand::Show { .. } => "umbrella.location.show",
            },
            Commands::Reminder { action } => match action {
                ReminderCommand::Show { .. } => "umbrella.reminder.show",
                ReminderCommand::Set { .. } => "umbrella.reminder.set",
                ReminderCommand::Reset { .. } => "umbrella.reminder.reset",
                ReminderCommand::Test { .. } => "umbrella.reminder.test",
                ReminderCommand::Fire { .. } => "umbrella.reminder.fire",
            },
            Commands::Reset { .. } => "umbrella.reset",
        }
    }

    fn output_args(&self) -> OutputArgs {
        match &self.command {
            Commands::Forecast { output } | Commands::Reset { output } => *output,
            Commands::Location { action } => match action {
                LocationCommand::Set { output, .. } | LocationCommand::Show { output } => *output,
            },
            Commands::Reminder { action } => match action {
                ReminderCommand::Show { output }
                | ReminderCommand::Set { output, .. }
                | ReminderCommand::Reset { output }
                | ReminderCommand::Test { output }
                | ReminderCommand::Fire { output, .. } => *output,
            },
        }
    }

    fn output_mode_hint(&self) -> CliOutputMode {
        let args = self.output_args();
        if args.json {
            CliOutputMode::Json
        } else if let Some(explicit) = args.output {
            explicit.into()
        } else {
            CliOutputMode::Human
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing();
    let command = cli.command_name();
    let output_mode = cli.output_mode_hint();
    match run(cli) {
        Ok(output) => println!("{output}"),
        Err(error) => {
            emit_error(command, output_mode, &error);
            std::process::exit(error.exit_code());
        }
    }
}

/// Diagnostics go to stderr so stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(UMBRELLA_LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<String, AppError> {
    let config = RuntimeConfig::from_env();
    let source = HttpForecastSource::new(config.timezone.as_str()).map_err(|error| {
        AppError::new(ErrorKind::Network, error.to_string())
            .with_code(ERROR_CODE_RUNTIME_PROVIDER_INIT)
    })?;
    run_with(cli, &config, &source, Utc::now)
}

fn run_with<F, N>(
    cli: Cli,
    config: &RuntimeConfig,
    source: &F,
    now_fn: N,
) -> Result<String, AppError>
where
    F: ForecastSource,
    N: Fn() -> DateTime<Utc> + Copy,
{
    let command = cli.command_name();
    let args = cli.output_args();
    let output_mode = resolve_output_mode(args.output, args.json, CliOutputMode::Human)?;
    let language = args.lang.map(Into::into).unwrap_or(config.language);

    let preferences = Preferences::new(FileStore::new(&config.data_dir));
    let scheduler = LocalScheduler::new(&config.data_dir, config.notifications_enabled);
    let client = UmbrellaClient::new(source, &preferences, &scheduler, now_fn, language);

    match cli.command {
        Commands::Forecast { .. } => {
            let view = client.load_home()?;
            render(command, output_mode, &view, |view| {
                format_home(view, language)
            })
        }
        Commands::Location { action } => match action {
            LocationCommand::Set {
                city,
                lat,
                lon,
                name,
                ..
            } => {
                let query = LocationQuery::new(city.as_deref(), lat, lon, name.as_deref())
                    .map_err(user_invalid_input)?;
                let location = client.select_location(&query)?;
                render(command, output_mode, &location, |location| {
                    format_location_saved(location, language)
                })
            }
            LocationCommand::Show { .. } => {
                let location = client.current_location();
                render(command, output_mode, &location, |location| {
                    format_location(location.as_ref(), language)
                })
            }
        },
        Commands::Reminder { action } => match action {
            ReminderCommand::Show { .. } => {
                let status = client.reminder_status()?;
                render(command, output_mode, &status, |status| {
                    format_reminder_status(status, language)
                })
            }
            ReminderCommand::Set { time, .. } => {
                let time = NotificationTime::parse(&time).map_err(user_invalid_input)?;
                let update = client.update_reminder_time(time)?;
                render(command, output_mode, &update, |update| {
                    format_reminder_update(update, language)
                })
            }
            ReminderCommand::Reset { .. } => {
                let update = client.reset_reminder_time()?;
                render(command, output_mode, &update, |update| {
                    format_reminder_update(update, language)
                })
            }
            ReminderCommand::Test { .. } => {
                let content = client.send_test_notification()?;
                render(command, output_mode, &content, format_delivered)
            }
            ReminderCommand::Fire { at, .. } => {
                let time = match at {
                    Some(raw) => NotificationTime::parse(&raw).map_err(user_invalid_input)?,
                    None => wall_clock_time(now_fn(), &config.timezone)?,
                };
                let delivered = scheduler.deliver_due(time)?;
                let result = FireResult {
                    time: time.to_string(),
                    delivered,
                };
                render(command, output_mode, &result, |result| {
                    format_fire(result, language)
                })
            }
        },
        Commands::Reset { .. } => {
            client.clear_all_data()?;
            render(command, output_mode, &json!({ "cleared": true }), |_| {
                match language {
                    Language::En => "All saved data cleared.".to_string(),
                    Language::Ko => "저장된 데이터를 모두 삭제했습니다.".to_string(),
                }
            })
        }
    }
}

#[derive(Debug, Serialize)]
struct FireResult {
    time: String,
    delivered: Vec<ScheduledNotification>,
}

/// Current wall-clock time in the configured zone; `auto` means the host zone.
fn wall_clock_time(now: DateTime<Utc>, timezone: &str) -> Result<NotificationTime, AppError> {
    let (hour, minute) = match timezone.parse::<Tz>() {
        Ok(tz) => {
            let local = now.with_timezone(&tz);
            (local.hour(), local.minute())
        }
        Err(_) => {
            let local = now.with_timezone(&Local);
            (local.hour(), local.minute())
        }
    };
    Ok(NotificationTime::new(hour, minute)?)
}

fn resolve_output_mode(
    output: Option<OutputModeArg>,
    json_flag: bool,
    default_mode: CliOutputMode,
) -> Result<CliOutputMode, AppError> {
    match (output.map(Into::into), json_flag) {
        (Some(mode), true) if mode != CliOutputMode::Json => Err(AppError::user(format!(
            "conflicting output flags: --json requires --output json (got {})",
            output_mode_label(mode)
        ))
        .with_code(ERROR_CODE_USER_OUTPUT_MODE_CONFLICT)),
        (Some(mode), _) => Ok(mode),
        (None, true) => Ok(CliOutputMode::Json),
        (None, false) => Ok(default_mode),
    }
}

fn render<T, H>(
    command: &str,
    output_mode: CliOutputMode,
    value: &T,
    human: H,
) -> Result<String, AppError>
where
    T: Serialize,
    H: FnOnce(&T) -> String,
{
    match output_mode {
        CliOutputMode::Json => render_json_envelope(command, value),
        CliOutputMode::Human => Ok(human(value)),
    }
}

fn render_json_envelope<T: Serialize>(command: &str, value: &T) -> Result<String, AppError> {
    let result = serde_json::to_value(value)
        .map_err(|error| serialize_error(format!("failed to serialize output: {error}")))?;
    serde_json::to_string(&json!({
        "schema_version": ENVELOPE_SCHEMA_VERSION,
        "command": command,
        "ok": true,
        "result": result,
    }))
    .map_err(|error| serialize_error(format!("failed to serialize output envelope: {error}")))
}

fn emit_error(command: &str, output_mode: CliOutputMode, error: &AppError) {
    match output_mode {
        CliOutputMode::Json => {
            let payload = json!({
                "schema_version": ENVELOPE_SCHEMA_VERSION,
                "command": command,
                "ok": false,
                "error": {
                    "code": error.code,
                    "message": error.message,
                    "details": {
                        "kind": error.kind.as_str(),
                        "exit_code": error.exit_code(),
                        "retryable": error.retryable(),
                    }
                }
            });
            let rendered = serde_json::to_string(&payload).unwrap_or_else(|serialize_error| {
                format!(
                    "{{\"schema_version\":\"{}\",\"command\":\"{}\",\"ok\":false,\"error\":{{\"code\":\"{}\",\"message\":\"{}\"}}}}",
                    ENVELOPE_SCHEMA_VERSION,
                    command,
                    ERROR_CODE_RUNTIME_SERIALIZE,
                    escape_json_string(&format!(
                        "failed to serialize error envelope: {serialize_error}"
                    )),
                )
            });
            println!("{rendered}");
        }
        CliOutputMode::Human => {
            eprintln!("error[{}]: {}", error.code, error.message);
            if error.retryable() {
                eprintln!("{RETRY_HINT}");
            }
        }
    }
}

fn user_invalid_input(error: ValidationError) -> AppError {
    AppError::user(error.to_string()).with_code(ERROR_CODE_USER_INVALID_INPUT)
}

fn serialize_error(message: String) -> AppError {
    AppError::new(ErrorKind::Storage, message).with_code(ERROR_CODE_RUNTIME_SERIALIZE)
}

fn output_mode_label(mode: CliOutputMode) -> &'static str {
    match mode {
        CliOutputMode::Human => "human",
        CliOutputMode::Json => "json",
    }
}

fn escape_json_string(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if c < '\u{20}' => escaped.push_str(&format!("\\u{:04x}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

fn format_temp(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.1}°C"),
        None => "-".to_string(),
    }
}

fn format_home(view: &HomeView, language: Language) -> String {
    let (now_label, today_label, rain_label, reminder_label) = match language {
        Language::En => ("Now", "Today", "rain", "Reminder"),
        Language::Ko => ("현재", "오늘", "강수확률", "알림"),
    };

    let mut lines = vec![format!("{} ({})", view.location.name, view.timezone)];
    lines.push(format!(
        "{now_label}: {} {} {}",
        view.current.icon.glyph(),
        format_temp(view.current.temperature_c),
        view.current.description
    ));
    lines.push(format!(
        "{today_label} {}: {} {} {}~{}°C {rain_label}:{}% {}mm",
        view.today.date,
        view.today.icon.glyph(),
        view.today.description,
        view.today.min_temp_c,
        view.today.max_temp_c,
        view.today.rain_probability,
        view.today.precipitation_mm
    ));

    if !view.hourly.is_empty() {
        let hours: Vec<String> = view
            .hourly
            .iter()
            .map(|hour| {
                let clock = hour.time.split_once('T').map_or(hour.time.as_str(), |(_, t)| t);
                format!(
                    "{clock} {} {} {}%",
                    hour.icon.glyph(),
                    format_temp(hour.temperature_c),
                    hour.precip_probability
                )
            })
            .collect();
        lines.push(hours.join(" | "));
    }

    lines.push(format!("☂️ {}", view.advisory.message));
    lines.push(format!(
        "{reminder_label} {}: {}",
        view.reminder.time,
        outcome_label(view.reminder.outcome, language)
    ));
    lines.join("\n")
}

fn outcome_label(outcome: ReminderOutcome, language: Language) -> &'static str {
    match (language, outcome) {
        (Language::En, ReminderOutcome::Scheduled) => "scheduled",
        (Language::En, ReminderOutcome::NotNeeded) => "not needed today",
        (Language::En, ReminderOutcome::PermissionDenied) => "notifications disabled",
        (Language::En, ReminderOutcome::NoLocation) => "waiting for a location",
        (Language::Ko, ReminderOutcome::Scheduled) => "예약됨",
        (Language::Ko, ReminderOutcome::NotNeeded) => "오늘은 필요 없음",
        (Language::Ko, ReminderOutcome::PermissionDenied) => "알림 꺼짐",
        (Language::Ko, ReminderOutcome::NoLocation) => "지역 선택 필요",
    }
}

fn format_location(location: Option<&SelectedLocation>, language: Language) -> String {
    match (location, language) {
        (Some(location), _) => format!(
            "{} ({:.4}, {:.4})",
            location.name, location.latitude, location.longitude
        ),
        (None, Language::En) => {
            "No location selected. Run `umbrella-cli location set --city <name>`.".to_string()
        }
        (None, Language::Ko) => {
            "선택된 지역이 없습니다. `umbrella-cli location set --city <name>`로 지역을 선택하세요."
                .to_string()
        }
    }
}

fn format_location_saved(location: &SelectedLocation, language: Language) -> String {
    let prefix = match language {
        Language::En => "Location saved",
        Language::Ko => "지역 저장됨",
    };
    format!("{prefix}: {}", format_location(Some(location), language))
}

fn format_reminder_update(update: &ReminderUpdate, language: Language) -> String {
    let mut lines = vec![format!(
        "{} {}: {}",
        match language {
            Language::En => "Reminder time",
            Language::Ko => "알림 시간",
        },
        update.time,
        outcome_label(update.outcome, language)
    )];
    if let Some(advisory) = &update.advisory {
        lines.push(format!("☂️ {}", advisory.message));
    }
    lines.join("\n")
}

fn format_reminder_status(status: &ReminderStatus, language: Language) -> String {
    let mut lines = vec![format!(
        "{} {}",
        match language {
            Language::En => "Reminder time",
            Language::Ko => "알림 시간",
        },
        status.time
    )];
    if status.registered.is_empty() {
        lines.push(
            match language {
                Language::En => "No reminder registered.",
                Language::Ko => "예약된 알림이 없습니다.",
            }
            .to_string(),
        );
    }
    for entry in &status.registered {
        lines.push(format!(
            "{:02}:{:02} {}",
            entry.trigger.hour, entry.trigger.minute, entry.content.title
        ));
    }
    lines.join("\n")
}

fn format_delivered(content: &NotificationContent) -> String {
    format!("{}\n{}", content.title, content.body)
}

fn format_fire(result: &FireResult, language: Language) -> String {
    match language {
        Language::En => format!(
            "{}: delivered {} reminder(s)",
            result.time,
            result.delivered.len()
        ),
        Language::Ko => format!("{}: 알림 {}건 발송", result.time, result.delivered.len()),
    }
}
