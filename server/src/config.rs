//! Configuration management for the server.

use std::env;
use std::time::Duration;

const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// MongoDB connection string
    pub mongodb_uri: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Deadline applied to a lifecycle call when the request sets none
    pub call_timeout: Duration,
    /// Server selection and connect timeout
    pub connect_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let host = non_empty("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = non_empty("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let mongodb_uri = non_empty("MONGODB_URI").ok_or(ConfigError::MissingUri)?;
        let username = non_empty("MONGODB_USERNAME");
        let password = non_empty("MONGODB_PASSWORD");

        // credentials go either in the URI or in the variables, not both
        if (username.is_some() || password.is_some()) && mongodb_uri.contains('@') {
            return Err(ConfigError::CredentialsConflict);
        }

        let call_timeout = match non_empty("KEEL_CALL_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(parse_timeout("KEEL_CALL_TIMEOUT_MS", &raw)?),
            None => Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
        };

        let connect_timeout = match non_empty("MONGODB_CONNECT_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_timeout("MONGODB_CONNECT_TIMEOUT_SECS", &raw)?),
            None => Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self {
            host,
            port,
            mongodb_uri,
            username,
            password,
            call_timeout,
            connect_timeout,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }
}

fn parse_timeout(variable: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidTimeout(variable)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("MONGODB_URI environment variable is required")]
    MissingUri,

    #[error("When username/password are provided, MONGODB_URI must not contain userinfo")]
    CredentialsConflict,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {0} value: expected a positive integer")]
    InvalidTimeout(&'static str),
}
