use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Which storage backend the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(()),
        }
    }
}

/// Token signing settings, loaded once and handed to `TokenIssuer`.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub server_port: u16,
    pub server_host: String,
    pub jwt: JwtConfig,
    pub bcrypt_cost: u32,
    pub store_timeout: Duration,
    /// Retries for idempotent store calls that hit `StorageUnavailable`.
    pub store_max_retries: u32,
    pub db_max_connections: u32,
    pub db_connect_retries: u32,
    pub cors_allowed_origins: Vec<String>,
}

const MIN_SECRET_LEN: usize = 32;

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage = parse_or(&lookup, "STORAGE", StorageBackend::Postgres)?;
        let database_url = lookup("DATABASE_URL");
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let secret = lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                value: format!("{} bytes, need at least {}", secret.len(), MIN_SECRET_LEN),
            });
        }

        let bcrypt_cost: u32 = parse_or(&lookup, "BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                name: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
            });
        }

        let store_timeout_secs: u64 = parse_or(&lookup, "STORE_TIMEOUT_SECS", 30)?;
        if store_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "STORE_TIMEOUT_SECS",
                value: store_timeout_secs.to_string(),
            });
        }

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173,http://localhost:3000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            storage,
            database_url,
            server_port: parse_or(&lookup, "SERVER_PORT", 8080)?,
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            jwt: JwtConfig {
                secret,
                issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "TaskManager".to_string()),
                audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "TaskManager".to_string()),
                ttl_minutes: parse_or(&lookup, "JWT_EXPIRATION_MINUTES", 60 * 24)?,
            },
            bcrypt_cost,
            store_timeout: Duration::from_secs(store_timeout_secs),
            store_max_retries: parse_or(&lookup, "STORE_MAX_RETRIES", 3)?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            db_connect_retries: parse_or(&lookup, "DB_CONNECT_RETRIES", 3)?,
            cors_allowed_origins,
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://test"),
            ("JWT_SECRET", SECRET),
        ]))
        .unwrap();

        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(config.database_url.as_deref(), Some("postgres://test"));
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.server_host, "127.0.0.1");
        assert_eq!(config.jwt.issuer, "TaskManager");
        assert_eq!(config.jwt.audience, "TaskManager");
        assert_eq!(config.jwt.ttl_minutes, 1440);
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert_eq!(config.store_timeout, Duration::from_secs(30));
        assert_eq!(config.store_max_retries, 3);
        assert_eq!(config.cors_allowed_origins.len(), 2);
        assert_eq!(config.server_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_config_custom_values() {
        let config = Config::from_lookup(lookup_from(&[
            ("STORAGE", "memory"),
            ("JWT_SECRET", SECRET),
            ("SERVER_PORT", "3000"),
            ("SERVER_HOST", "0.0.0.0"),
            ("BCRYPT_COST", "4"),
            ("CORS_ALLOWED_ORIGINS", "https://app.example.com, "),
        ]))
        .unwrap();

        assert_eq!(config.storage, StorageBackend::Memory);
        assert!(config.database_url.is_none());
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.server_host, "0.0.0.0");
        assert_eq!(config.bcrypt_cost, 4);
        assert_eq!(config.cors_allowed_origins, vec!["https://app.example.com"]);
    }

    #[test]
    fn test_config_rejects_bad_input() {
        let missing_db = Config::from_lookup(lookup_from(&[("JWT_SECRET", SECRET)]));
        assert_eq!(missing_db.unwrap_err(), ConfigError::Missing("DATABASE_URL"));

        let short_secret = Config::from_lookup(lookup_from(&[
            ("STORAGE", "memory"),
            ("JWT_SECRET", "short"),
        ]));
        assert!(matches!(
            short_secret,
            Err(ConfigError::Invalid { name: "JWT_SECRET", .. })
        ));

        let bad_port = Config::from_lookup(lookup_from(&[
            ("STORAGE", "memory"),
            ("JWT_SECRET", SECRET),
            ("SERVER_PORT", "eighty"),
        ]));
        assert!(matches!(
            bad_port,
            Err(ConfigError::Invalid { name: "SERVER_PORT", .. })
        ));

        let zero_timeout = Config::from_lookup(lookup_from(&[
            ("STORAGE", "memory"),
            ("JWT_SECRET", SECRET),
            ("STORE_TIMEOUT_SECS", "0"),
        ]));
        assert_eq!(
            zero_timeout.unwrap_err(),
            ConfigError::Invalid {
                name: "STORE_TIMEOUT_SECS",
                value: "0".to_string(),
            }
        );
    }
}
