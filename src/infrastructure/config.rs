//! Configuration infrastructure
//!
//! Settings come from the process environment, optionally seeded from a `.env`
//! file next to the binary. They are read once at startup into [`AppConfig`];
//! nothing re-reads the environment afterwards.
//!
//! Configuration is organized into three groups:
//! 1. Portal credentials (required)
//! 2. Notification channels and polling behaviour
//! 3. Logging and filesystem locations

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::domain::errors::ConfigError;
use crate::domain::scheduler::SleepMode;
use crate::domain::services::Severity;

/// Configuration defaults
pub mod defaults {
    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_FILE_PREFIX: &str = "volume-guard.log";
    pub const LOG_MAX_FILES: usize = 14;

    pub const MIN_SEVERITY: &str = "info";
    pub const APP_DIR_NAME: &str = "volume-guard";

    pub const UPDATE_MANIFEST_URL: &str =
        "https://raw.githubusercontent.com/user871258938/lidl/main/package.json";
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: PortalCredentials,
    pub notifications: NotificationConfig,
    pub sleep_mode: SleepMode,
    /// Periodic version check before each cycle
    pub auto_update: bool,
    pub update_manifest_url: String,
    /// Holds the session record, the cookie snapshot and the browser profile
    pub state_dir: PathBuf,
    pub chrome_path: Option<PathBuf>,
    pub logging: LoggingConfig,
}

/// Portal login
#[derive(Clone)]
pub struct PortalCredentials {
    pub phone_number: String,
    pub password: String,
}

impl std::fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("phone_number", &self.phone_number)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordConfig {
    pub webhook_url: String,
}

/// Enabled channels and the severity filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub telegram: Option<TelegramConfig>,
    pub discord: Option<DiscordConfig>,
    pub min_severity: Severity,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            telegram: None,
            discord: None,
            min_severity: Severity::Info,
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable daily rolling file output
    pub file_output: bool,

    /// Directory for log files, defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    /// Number of daily log files to keep
    pub max_files: usize,

    /// Module-specific log level caps (e.g., "headless_chrome": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            max_files: defaults::LOG_MAX_FILES,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "warn".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("headless_chrome".to_string(), "warn".to_string());
                filters.insert("tungstenite".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

/// Environment as read, before validation. Keys are the lowercased variable names.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    rufnummer: Option<String>,
    password: Option<String>,
    telegram_allow: Option<bool>,
    telegram_token: Option<String>,
    telegram_chat_id: Option<String>,
    discord_allow: Option<bool>,
    discord_webhook_url: Option<String>,
    info_level: Option<String>,
    sleep_mode: Option<String>,
    sleep_time: Option<u64>,
    auto_update: Option<bool>,
    update_url: Option<String>,
    state_dir: Option<PathBuf>,
    chrome_path: Option<PathBuf>,
    log_level: Option<String>,
    log_dir: Option<PathBuf>,
    log_json: Option<bool>,
    log_console: Option<bool>,
    log_file: Option<bool>,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenv::dotenv() {
            info!(path = %path.display(), "Loaded .env file");
        }
        Self::from_source(config::Environment::default())
    }

    /// Build from an explicit environment source.
    ///
    /// Values stay strings until deserialized so that phone numbers and chat
    /// ids keep their leading zeros and signs.
    pub fn from_source(source: config::Environment) -> Result<Self, ConfigError> {
        let raw: RawSettings = config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;
        Self::validate(raw)
    }

    fn validate(raw: RawSettings) -> Result<Self, ConfigError> {
        let phone_number = required(raw.rufnummer, "RUFNUMMER")?;
        let password = required(raw.password, "PASSWORD")?;

        let min_severity = raw
            .info_level
            .as_deref()
            .unwrap_or(defaults::MIN_SEVERITY)
            .parse::<Severity>()
            .map_err(|reason| ConfigError::Invalid {
                key: "INFO_LEVEL",
                reason,
            })?;

        let telegram = if raw.telegram_allow.unwrap_or(false) {
            match (non_empty(raw.telegram_token), non_empty(raw.telegram_chat_id)) {
                (Some(token), Some(chat_id)) => Some(TelegramConfig { token, chat_id }),
                _ => {
                    warn!("TELEGRAM_ALLOW is set but token or chat id is missing, Telegram disabled");
                    None
                }
            }
        } else {
            None
        };

        let discord = if raw.discord_allow.unwrap_or(false) {
            if let Some(webhook_url) = non_empty(raw.discord_webhook_url) {
                Some(DiscordConfig { webhook_url })
            } else {
                warn!("DISCORD_ALLOW is set but DISCORD_WEBHOOK_URL is missing, Discord disabled");
                None
            }
        } else {
            None
        };

        let state_dir = raw.state_dir.unwrap_or_else(default_state_dir);

        let logging = {
            let defaults = LoggingConfig::default();
            LoggingConfig {
                level: raw.log_level.unwrap_or(defaults.level),
                json_format: raw.log_json.unwrap_or(defaults.json_format),
                console_output: raw.log_console.unwrap_or(defaults.console_output),
                file_output: raw.log_file.unwrap_or(defaults.file_output),
                log_dir: raw.log_dir,
                max_files: defaults.max_files,
                module_filters: defaults.module_filters,
            }
        };

        Ok(Self {
            credentials: PortalCredentials {
                phone_number,
                password,
            },
            notifications: NotificationConfig {
                telegram,
                discord,
                min_severity,
            },
            sleep_mode: SleepMode::parse(raw.sleep_mode.as_deref(), raw.sleep_time),
            auto_update: raw.auto_update.unwrap_or(false),
            update_manifest_url: raw
                .update_url
                .unwrap_or_else(|| defaults::UPDATE_MANIFEST_URL.to_string()),
            state_dir,
            chrome_path: raw.chrome_path,
            logging,
        })
    }
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    non_empty(value).ok_or(ConfigError::Missing(key))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(defaults::APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(pairs: &[(&str, &str)]) -> config::Environment {
        let map: config::Map<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        config::Environment::default().source(Some(map))
    }

    #[test]
    fn minimal_environment_uses_defaults() {
        let config =
            AppConfig::from_source(source(&[("RUFNUMMER", "015712345678"), ("PASSWORD", "pw")]))
                .unwrap();

        assert_eq!(config.credentials.phone_number, "015712345678");
        assert_eq!(config.sleep_mode, SleepMode::Random);
        assert_eq!(config.notifications, NotificationConfig::default());
        assert!(!config.auto_update);
        assert!(config.logging.file_output);
        assert_eq!(config.update_manifest_url, defaults::UPDATE_MANIFEST_URL);
    }

    #[test]
    fn missing_password_is_reported_by_name() {
        let err = AppConfig::from_source(source(&[("RUFNUMMER", "0157")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PASSWORD")));
    }

    #[test]
    fn channels_need_their_secrets() {
        let config = AppConfig::from_source(source(&[
            ("RUFNUMMER", "0157"),
            ("PASSWORD", "pw"),
            ("TELEGRAM_ALLOW", "true"),
            ("TELEGRAM_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-100200"),
            ("DISCORD_ALLOW", "true"),
            ("INFO_LEVEL", "warn"),
        ]))
        .unwrap();

        assert_eq!(
            config.notifications.telegram,
            Some(TelegramConfig {
                token: "123:abc".into(),
                chat_id: "-100200".into()
            })
        );
        assert_eq!(config.notifications.discord, None);
        assert_eq!(config.notifications.min_severity, Severity::Warn);
    }

    #[test]
    fn fixed_sleep_mode_reads_sleep_time() {
        let config = AppConfig::from_source(source(&[
            ("RUFNUMMER", "0157"),
            ("PASSWORD", "pw"),
            ("SLEEP_MODE", "fixed"),
            ("SLEEP_TIME", "900"),
            ("STATE_DIR", "/var/lib/vg"),
        ]))
        .unwrap();

        assert_eq!(config.sleep_mode, SleepMode::Fixed(Some(900)));
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/vg"));
    }

    #[test]
    fn unknown_info_level_is_invalid() {
        let err = AppConfig::from_source(source(&[
            ("RUFNUMMER", "0157"),
            ("PASSWORD", "pw"),
            ("INFO_LEVEL", "chatty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "INFO_LEVEL", .. }));
    }

    #[test]
    fn password_is_not_debug_printed() {
        let creds = PortalCredentials {
            phone_number: "0157".into(),
            password: "secret".into(),
        };
        assert!(!format!("{creds:?}").contains("secret"));
    }
}
