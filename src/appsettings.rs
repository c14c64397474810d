use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{
    Deserialize, Deserializer,
    de::{self, SeqAccess, Unexpected, Visitor},
};

use crate::reminder::ReminderConfig;

const ENV_PREFIX: &str = "RTR";
const SETTINGS_NAME: &str = "appsettings";
const LOCAL_SETTINGS_NAME: &str = "appsettings.local";
const APP_DIR: &str = "rest-reminder";

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ReminderSettings {
    pub interval: String,
    #[serde(deserialize_with = "minute_list")]
    pub trigger_minutes: Vec<u32>,
    /// IANA timezone name. Host local time when unset.
    pub timezone: Option<String>,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        let defaults = ReminderConfig::default();
        Self {
            interval: defaults.interval,
            trigger_minutes: defaults.trigger_minutes,
            timezone: None,
        }
    }
}

impl ReminderSettings {
    pub fn reminder_config(&self) -> ReminderConfig {
        ReminderConfig {
            interval: self.interval.clone(),
            trigger_minutes: self.trigger_minutes.clone(),
        }
    }

    pub fn timezone(&self) -> anyhow::Result<Option<Tz>> {
        self.timezone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|error| anyhow::anyhow!("{error}"))
                    .with_context(|| format!("Unknown timezone {name:?}"))
            })
            .transpose()
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SoundSettings {
    pub enabled: bool,
    /// Passed to `command` as its last argument.
    pub file: Option<PathBuf>,
    /// Audio player program, e.g. `paplay` or `afplay`. Without one the
    /// terminal bell is rung instead.
    pub command: Option<String>,
    /// Passed to `command` before `file`. `{volume}` is replaced with the
    /// volume as a percentage.
    pub args: Vec<String>,
    /// 0.0 to 1.0. Zero or less mutes playback.
    pub volume: f64,
}

impl Default for SoundSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
            command: None,
            args: Vec::new(),
            volume: 1.0,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct NotificationSettings {
    pub desktop: bool,
    pub title: String,
    pub message: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            desktop: false,
            title: "Break Time!".to_owned(),
            message: "Time to take a short break and rest your eyes.".to_owned(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// Appends log output to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ShutdownSettings {
    pub grace_period_secs: u64,
}

impl ShutdownSettings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AppSettings {
    pub reminder: ReminderSettings,
    pub sound: SoundSettings,
    pub notification: NotificationSettings,
    pub logging: LoggingSettings,
    pub shutdown: ShutdownSettings,
}

impl AppSettings {
    /// Layers settings over the defaults, lowest precedence first:
    /// `/etc/rest-reminder/appsettings`, `~/.rest-reminder/appsettings` and
    /// `appsettings` in the working directory (or only `config_file` when
    /// given), then `appsettings.local` and `RTR_`-prefixed environment
    /// variables.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(
            config_file,
            &search_dirs(dirs::home_dir()),
            Self::environment(),
        )
    }

    fn load_from(
        config_file: Option<&Path>,
        search_dirs: &[PathBuf],
        environment: Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        match config_file {
            Some(path) => builder = builder.add_source(File::from(path).required(true)),
            None => {
                for dir in search_dirs {
                    let name = dir.join(SETTINGS_NAME);
                    builder = builder
                        .add_source(File::with_name(&name.to_string_lossy()).required(false));
                }
                builder = builder.add_source(File::with_name(SETTINGS_NAME).required(false));
            }
        }

        let settings = builder
            .add_source(File::with_name(LOCAL_SETTINGS_NAME).required(false))
            .add_source(environment)
            .build()?;

        settings.try_deserialize()
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("reminder.trigger_minutes")
    }
}

/// Directories searched for `appsettings` besides the working directory,
/// lowest precedence first.
fn search_dirs(home: Option<PathBuf>) -> Vec<PathBuf> {
    let mut candidates = vec![Path::new("/etc").join(APP_DIR)];
    if let Some(home) = home {
        candidates.push(home.join(format!(".{APP_DIR}")));
    }
    candidates
}

/// Accepts `[0, 30]`, `"0,30"` or a lone `15`. A single-valued
/// `RTR_REMINDER__TRIGGER_MINUTES` arrives as a plain integer.
fn minute_list<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    struct MinuteList;

    impl<'de> Visitor<'de> for MinuteList {
        type Value = Vec<u32>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a minute of the hour or a list of them")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            MinuteVisitor.visit_u64(value).map(|minute| vec![minute])
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            MinuteVisitor.visit_i64(value).map(|minute| vec![minute])
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            value
                .split(',')
                .map(str::trim)
                .filter(|minute| !minute.is_empty())
                .map(|minute| MinuteVisitor.visit_str(minute))
                .collect()
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut minutes = Vec::new();
            while let Some(Minute(minute)) = seq.next_element()? {
                minutes.push(minute);
            }
            Ok(minutes)
        }
    }

    deserializer.deserialize_any(MinuteList)
}

struct Minute(u32);

impl<'de> Deserialize<'de> for Minute {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MinuteVisitor).map(Minute)
    }
}

/// Range is checked later, together with the rest of the schedule.
struct MinuteVisitor;

impl<'de> Visitor<'de> for MinuteVisitor {
    type Value = u32;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a minute of the hour")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<u32, E> {
        u32::try_from(value).map_err(|_| E::invalid_value(Unexpected::Unsigned(value), &self))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<u32, E> {
        u32::try_from(value).map_err(|_| E::invalid_value(Unexpected::Signed(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<u32, E> {
        value
            .trim()
            .parse()
            .map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
    }
}
