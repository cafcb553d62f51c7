use std::env;

use crate::analytics::DEFAULT_SURVEY_CAPACITY;
use crate::permissions::PermissionPolicy;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub survey_capacity: u32,
    pub default_permission: PermissionPolicy,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL must be set to a production Postgres instance")]
    MissingDatabaseUrl,
    #[error("{key} must be a non-negative integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
    #[error("SURVEY_DEFAULT_PERMISSION is invalid: {0}")]
    InvalidPermissionPolicy(String),
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let max_connections = parse_number("SURVEY_DB_MAX_CONNECTIONS", 5)?;
        let survey_capacity = parse_number("SURVEY_CAPACITY", DEFAULT_SURVEY_CAPACITY)?;
        let default_permission = env::var("SURVEY_DEFAULT_PERMISSION")
            .unwrap_or_else(|_| PermissionPolicy::AllowAll.to_string())
            .parse::<PermissionPolicy>()
            .map_err(ConfigError::InvalidPermissionPolicy)?;
        let log_level = env::var("SURVEY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            database_url,
            max_connections,
            survey_capacity,
            default_permission,
            telemetry: TelemetryConfig { log_level },
        })
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::MissingDatabaseUrl)
    }
}

fn parse_number(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        Err(_) => Ok(default),
    }
}
