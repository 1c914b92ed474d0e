use std::net::SocketAddr;
use std::time::Duration;

use crate::room::service::RoomServiceConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Process configuration read from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// PostgreSQL connection string. Without one rooms live in memory.
    pub database_url: Option<String>,
    pub room: RoomServiceConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RoomServiceConfig::default();

        let bind_addr = parse_or(
            &lookup,
            "HUDDLE_BIND_ADDR",
            SocketAddr::from(([0, 0, 0, 0], 3000)),
        )?;
        let timeout_secs = parse_or(
            &lookup,
            "HUDDLE_OPERATION_TIMEOUT_SECS",
            defaults.operation_timeout.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "HUDDLE_OPERATION_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "must be at least one second".to_string(),
            });
        }
        let revoke_tags_on_disband = parse_or(
            &lookup,
            "HUDDLE_REVOKE_TAGS_ON_DISBAND",
            defaults.revoke_tags_on_disband,
        )?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());

        Ok(Self {
            bind_addr,
            database_url,
            room: RoomServiceConfig {
                operation_timeout: Duration::from_secs(timeout_secs),
                revoke_tags_on_disband,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}
