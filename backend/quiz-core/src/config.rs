use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::utils::retry::RetryConfig;

pub const DEFAULT_ORACLE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ORACLE_MODEL: &str = "gpt-4.1-nano";
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ORACLE_MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_attempts: usize,
}

impl OracleConfig {
    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::default().with_max_attempts(self.max_attempts)
    }

    /// Upper bound for one full oracle call: every attempt may hit the
    /// request timeout, with the longest backoff between attempts.
    pub fn call_budget(&self) -> Duration {
        let retry = self.retry();
        let attempts = retry.max_attempts as u32;
        let pause = retry.max_backoff + retry.jitter_max.unwrap_or_default();
        self.timeout() * attempts + pause * (attempts - 1)
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_ORACLE_URL.to_string(),
            api_key: None,
            model: DEFAULT_ORACLE_MODEL.to_string(),
            timeout_secs: DEFAULT_ORACLE_TIMEOUT_SECS,
            max_attempts: DEFAULT_ORACLE_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub oracle: OracleConfig,
    /// JSON file replacing the built-in category table.
    pub category_table_path: Option<String>,
    pub log_format: LogFormat,
    /// OTLP/HTTP collector; tracing export is off when unset.
    pub otlp_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "quizground".to_string(),
            oracle: OracleConfig::default(),
            category_table_path: None,
            log_format: LogFormat::Text,
            otlp_endpoint: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first (two levels up), then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/{env}.toml, overridden by APP_* variables
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or(defaults.mongo_uri);

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or(defaults.mongo_database);

        let api_url = settings
            .get_string("oracle.api_url")
            .or_else(|_| env::var("ORACLE_API_URL"))
            .unwrap_or(defaults.oracle.api_url);

        let api_key = settings
            .get_string("oracle.api_key")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|key| !key.trim().is_empty());

        let model = settings
            .get_string("oracle.model")
            .or_else(|_| env::var("ORACLE_MODEL"))
            .unwrap_or(defaults.oracle.model);

        let timeout_secs = read_positive(&settings, "oracle.timeout_secs", "ORACLE_TIMEOUT_SECS")
            .unwrap_or(defaults.oracle.timeout_secs);

        let max_attempts = read_positive(&settings, "oracle.max_attempts", "ORACLE_MAX_ATTEMPTS")
            .map(|v| v as usize)
            .unwrap_or(defaults.oracle.max_attempts);

        let category_table_path = settings
            .get_string("diagnosis.category_table_path")
            .or_else(|_| env::var("CATEGORY_TABLE_PATH"))
            .ok();

        let log_format = match settings
            .get_string("log_format")
            .or_else(|_| env::var("LOG_FORMAT"))
            .map(|v| v.to_lowercase())
            .as_deref()
        {
            Ok("json") => LogFormat::Json,
            Ok("text") | Err(_) => LogFormat::Text,
            Ok(other) => {
                return Err(config::ConfigError::Message(format!(
                    "Unknown log_format: {}",
                    other
                )))
            }
        };

        let otlp_endpoint = settings
            .get_string("otlp_endpoint")
            .or_else(|_| env::var("OTEL_EXPORTER_OTLP_ENDPOINT"))
            .ok();

        Ok(Config {
            mongo_uri,
            mongo_database,
            oracle: OracleConfig {
                api_url,
                api_key,
                model,
                timeout_secs,
                max_attempts,
            },
            category_table_path,
            log_format,
            otlp_endpoint,
        })
    }
}

fn read_positive(settings: &config::Config, key: &str, env_key: &str) -> Option<u64> {
    settings
        .get_int(key)
        .ok()
        .or_else(|| env::var(env_key).ok().and_then(|v| v.parse::<i64>().ok()))
        .filter(|v| *v > 0)
        .map(|v| v as u64)
}
