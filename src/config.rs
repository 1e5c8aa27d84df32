//! Environment-driven configuration.
//!
//! Values are read from the process environment after `.env` has been
//! loaded with `dotenvy`. Every key has a default so a bare `pairgate serve`
//! works out of the box.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_SESSIONS_DIR: &str = "PAIRGATE_SESSIONS_DIR";
pub const ENV_SESSION_TTL: &str = "PAIRGATE_SESSION_TTL_SECS";
pub const ENV_SWEEP_INTERVAL: &str = "PAIRGATE_SWEEP_INTERVAL_SECS";
pub const ENV_CODE_DIGITS: &str = "PAIRGATE_CODE_DIGITS";
pub const ENV_HTTP_ADDR: &str = "PAIRGATE_HTTP_ADDR";

/// Shortest and longest pairing codes we accept.
pub const MIN_CODE_DIGITS: u32 = 4;
pub const MAX_CODE_DIGITS: u32 = 9;

/// Resolved gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory holding one working directory per session code.
    pub sessions_dir: PathBuf,
    /// Maximum age of a session that never finished pairing.
    pub session_ttl: Duration,
    /// How often the expiry sweeper runs.
    pub sweep_interval: Duration,
    /// Width of generated pairing codes.
    pub code_digits: u32,
    /// Address the HTTP gateway binds to.
    pub http_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sessions_dir: Self::default_sessions_dir(),
            session_ttl: Duration::from_secs(300),   // 5 minutes
            sweep_interval: Duration::from_secs(60), // 1 minute
            code_digits: 6,
            http_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

impl Config {
    /// Build configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let sessions_dir = lookup(ENV_SESSIONS_DIR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.sessions_dir);

        let session_ttl = parse_secs(&lookup, ENV_SESSION_TTL)?.unwrap_or(defaults.session_ttl);
        let sweep_interval =
            parse_secs(&lookup, ENV_SWEEP_INTERVAL)?.unwrap_or(defaults.sweep_interval);

        let code_digits = parse_value::<u32, _>(&lookup, ENV_CODE_DIGITS)?
            .unwrap_or(defaults.code_digits);
        if !(MIN_CODE_DIGITS..=MAX_CODE_DIGITS).contains(&code_digits) {
            return Err(ConfigError::InvalidValue {
                key: ENV_CODE_DIGITS.to_string(),
                message: format!(
                    "must be between {} and {}, got {}",
                    MIN_CODE_DIGITS, MAX_CODE_DIGITS, code_digits
                ),
            });
        }

        let http_addr =
            parse_value::<SocketAddr, _>(&lookup, ENV_HTTP_ADDR)?.unwrap_or(defaults.http_addr);

        Ok(Self {
            sessions_dir,
            session_ttl,
            sweep_interval,
            code_digits,
            http_addr,
        })
    }

    /// Default sessions directory (`~/.pairgate/sessions`).
    pub fn default_sessions_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pairgate")
            .join("sessions")
    }
}

fn parse_value<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{} ({:?})", e, raw),
            }),
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_value::<u64, _>(lookup, key)? {
        Some(0) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        }),
        other => Ok(other.map(Duration::from_secs)),
    }
}
