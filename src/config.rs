use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is missing")]
    Missing(&'static str),
}

/// Runtime configuration for the API server.
#[derive(Clone)]
pub struct Config {
    /// sqlx SQLite URL (default: `"sqlite://aurora.db"`).
    pub database_url: String,

    /// HS256 secret used to sign session tokens. Required.
    pub jwt_secret: String,

    /// Base URL of the FastAPI inference service behind the gateway.
    pub fastapi_url: String,

    pub port: u16,

    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,

    /// Upper bound on one completion round trip.
    pub completion_timeout: Duration,

    /// Upper bound on one proxied round trip.
    pub proxy_timeout: Duration,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        Ok(Self {
            database_url: env_or("DATABASE_URL", "sqlite://aurora.db"),
            jwt_secret,
            fastapi_url: env_or("FASTAPI_URL", "http://127.0.0.1:8000"),
            port: parse_env("PORT", 3001),
            openai_api_key: env_or("OPENAI_API_KEY", ""),
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            openai_model: env_or("OPENAI_MODEL", "gpt-4o-mini"),
            completion_timeout: Duration::from_secs(parse_env("COMPLETION_TIMEOUT_SECS", 60)),
            proxy_timeout: Duration::from_secs(parse_env("PROXY_TIMEOUT_SECS", 120)),
            log_json: std::env::var("LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}

// Keeps the signing secret and API key out of startup logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("fastapi_url", &self.fastapi_url)
            .field("port", &self.port)
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_model", &self.openai_model)
            .field("completion_timeout", &self.completion_timeout)
            .field("proxy_timeout", &self.proxy_timeout)
            .field("log_json", &self.log_json)
            .finish_non_exhaustive()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret".to_string(),
            fastapi_url: "http://127.0.0.1:9".to_string(),
            port: 0,
            openai_api_key: String::new(),
            openai_base_url: "http://127.0.0.1:9".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            completion_timeout: Duration::from_secs(5),
            proxy_timeout: Duration::from_secs(5),
            log_json: false,
        }
    }
}
