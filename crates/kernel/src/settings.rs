use std::path::PathBuf;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "BOOKSTORE_ENV";
const CONFIG_DIR_ENV: &str = "BOOKSTORE_CONFIG_DIR";
const ENV_PREFIX: &str = "BOOKSTORE";

/// Deployment environment the application is running in.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "local" => Ok(Environment::Local),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(anyhow!(
                "unsupported environment '{}'; expected local/staging/production",
                other
            )),
        }
    }
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub events: EventSettings,
    #[serde(default)]
    pub mail: MailSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl Settings {
    /// Load configuration by layering `.env`, base file, environment overlay,
    /// and `BOOKSTORE__SECTION__KEY` variables.
    pub fn load() -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config_dir = match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir),
            // Default to the working directory's `config` folder.
            Err(_) => std::env::current_dir()
                .with_context(|| "unable to resolve current directory")?
                .join("config"),
        };

        Self::load_from(&config_dir, &environment)
    }

    /// Load configuration from an explicit directory and environment name.
    pub fn load_from(config_dir: &std::path::Path, environment: &str) -> anyhow::Result<Self> {
        let parsed_environment: Environment = environment.parse()?;

        let base_path = config_dir.join("base.toml");
        let environment_path = config_dir.join(format!("{}.toml", environment));

        let builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        // The environment variable wins over whatever the files say.
        settings.environment = parsed_environment;

        Ok(settings)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    #[serde(default = "ServerSettings::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_request_timeout_ms() -> u64 {
        15000
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

/// Tuning for the transactional document store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseSettings {
    /// redb file holding every table. Unset means an in-memory database that
    /// is lost on exit.
    #[serde(default)]
    pub path: Option<String>,
    /// Transactions older than this are refused at commit.
    #[serde(default = "DatabaseSettings::default_transaction_timeout_ms")]
    pub transaction_timeout_ms: u64,
    /// How many times a transaction that lost a write race is replayed.
    #[serde(default = "DatabaseSettings::default_max_commit_retries")]
    pub max_commit_retries: u32,
}

impl DatabaseSettings {
    fn default_transaction_timeout_ms() -> u64 {
        5000
    }

    fn default_max_commit_retries() -> u32 {
        5
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            transaction_timeout_ms: Self::default_transaction_timeout_ms(),
            max_commit_retries: Self::default_max_commit_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub log_format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "TelemetrySettings::default_filter")]
    pub filter: String,
}

impl TelemetrySettings {
    fn default_filter() -> String {
        "info,tower_http=info".to_string()
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            filter: Self::default_filter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AuthSettings {
    /// Administrator accounts ensured at startup.
    #[serde(default)]
    pub default_admins: Vec<AdminSeed>,
}

/// An administrator account created at startup when missing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminSeed {
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventSettings {
    /// Buffered events per real-time subscriber before it starts lagging.
    #[serde(default = "EventSettings::default_channel_capacity")]
    pub channel_capacity: usize,
}

impl EventSettings {
    fn default_channel_capacity() -> usize {
        256
    }
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            channel_capacity: Self::default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailSettings {
    #[serde(default = "MailSettings::default_enabled")]
    pub enabled: bool,
    #[serde(default = "MailSettings::default_from_address")]
    pub from_address: String,
}

impl MailSettings {
    fn default_enabled() -> bool {
        true
    }

    fn default_from_address() -> String {
        "\"Online Book Store\" <no-reply@bookstore.local>".to_string()
    }
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            from_address: Self::default_from_address(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationSettings {
    /// Read notifications older than this many days are purged.
    #[serde(default = "NotificationSettings::default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "NotificationSettings::default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl NotificationSettings {
    fn default_retention_days() -> i64 {
        30
    }

    fn default_sweep_interval_secs() -> u64 {
        24 * 60 * 60
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            retention_days: Self::default_retention_days(),
            sweep_interval_secs: Self::default_sweep_interval_secs(),
        }
    }
}
