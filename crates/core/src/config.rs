use std::env;
use std::fs;
use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub notification: NotificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Settings for the email-API dispatcher that delivers rendered quotes.
#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub api_url: String,
    pub api_key: Option<SecretString>,
    pub from_address: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub notification_api_url: Option<String>,
    pub notification_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://pestline.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            notification: NotificationConfig {
                api_url: "http://localhost:8825/v1/send".to_string(),
                api_key: None,
                from_address: "quotes@pestline.example".to_string(),
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    database: RawDatabase,
    #[serde(default)]
    notification: RawNotification,
    #[serde(default)]
    logging: RawLogging,
}

#[derive(Debug, Default, Deserialize)]
struct RawDatabase {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNotification {
    api_url: Option<String>,
    api_key: Option<String>,
    from_address: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLogging {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    /// Layered load: defaults, then the TOML file (if any), then
    /// `PESTLINE_*` environment variables, then explicit overrides.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = AppConfig::default();

        let path = options
            .config_path
            .clone()
            .or_else(|| env::var("PESTLINE_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("pestline.toml"));

        match fs::read_to_string(&path) {
            Ok(contents) => {
                let raw: RawConfig = toml::from_str(&contents)
                    .map_err(|source| ConfigError::ParseFile { path: path.clone(), source })?;
                config.apply_raw(raw);
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                if options.require_file {
                    return Err(ConfigError::MissingConfigFile(path));
                }
            }
            Err(source) => return Err(ConfigError::ReadFile { path, source }),
        }

        config.apply_env();
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_raw(&mut self, raw: RawConfig) {
        if let Some(url) = raw.database.url {
            self.database.url = url;
        }
        if let Some(max) = raw.database.max_connections {
            self.database.max_connections = max;
        }
        if let Some(secs) = raw.database.timeout_secs {
            self.database.timeout_secs = secs;
        }
        if let Some(url) = raw.notification.api_url {
            self.notification.api_url = url;
        }
        if let Some(key) = raw.notification.api_key {
            self.notification.api_key = Some(key.into());
        }
        if let Some(from) = raw.notification.from_address {
            self.notification.from_address = from;
        }
        if let Some(secs) = raw.notification.timeout_secs {
            self.notification.timeout_secs = secs;
        }
        if let Some(level) = raw.logging.level {
            self.logging.level = level;
        }
        if let Some(format) = raw.logging.format {
            self.logging.format = format;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(url) = env::var("PESTLINE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(level) = env::var("PESTLINE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(url) = env::var("PESTLINE_NOTIFICATION_API_URL") {
            self.notification.api_url = url;
        }
        if let Ok(key) = env::var("PESTLINE_NOTIFICATION_API_KEY") {
            self.notification.api_key = Some(key.into());
        }
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.database_url {
            self.database.url = url;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(url) = overrides.notification_api_url {
            self.notification.api_url = url;
        }
        if let Some(key) = overrides.notification_api_key {
            self.notification.api_key = Some(key.into());
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.notification.from_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "notification.from_address must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    #[test]
    fn defaults_apply_without_a_config_file() {
        let options = LoadOptions {
            config_path: Some(std::path::PathBuf::from("/nonexistent/pestline.toml")),
            ..LoadOptions::default()
        };
        let config = AppConfig::load(options).expect("load defaults");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let options = LoadOptions {
            config_path: Some(std::path::PathBuf::from("/nonexistent/pestline.toml")),
            require_file: true,
            ..LoadOptions::default()
        };
        assert!(matches!(
            AppConfig::load(options),
            Err(ConfigError::MissingConfigFile(_))
        ));
    }

    #[test]
    fn file_values_override_defaults_and_explicit_overrides_win() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[database]\nurl = \"sqlite://from-file.db\"\nmax_connections = 9\n\n[logging]\nlevel = \"debug\"\nformat = \"json\"\n"
        )
        .expect("write config");

        let options = LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            overrides: ConfigOverrides {
                database_url: Some("sqlite://from-override.db".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        };

        let config = AppConfig::load(options).expect("load");
        assert_eq!(config.database.url, "sqlite://from-override.db");
        assert_eq!(config.database.max_connections, 9);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn zero_connections_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[database]\nmax_connections = 0\n").expect("write config");

        let options = LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            ..LoadOptions::default()
        };
        assert!(matches!(AppConfig::load(options), Err(ConfigError::Validation(_))));
    }
}
