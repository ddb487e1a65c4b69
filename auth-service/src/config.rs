//! Configuration for the auth service.
//!
//! All values come from environment variables. Signing secrets and token
//! TTLs are required with no default: a missing value fails construction
//! instead of surfacing later as a runtime error.

use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

/// Top-level settings consumed by the credential core.
#[derive(Debug, Clone)]
pub struct Settings {
    pub jwt: JwtSettings,
    pub redis: RedisSettings,
    pub database: DatabaseSettings,
    pub retry: RetrySettings,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            jwt: JwtSettings::from_env()?,
            redis: RedisSettings::from_env()?,
            database: DatabaseSettings::from_env()?,
            retry: RetrySettings::from_env()?,
        })
    }
}

/// Per-kind signing secrets and lifetimes.
///
/// Access and refresh tokens are signed with independent secrets so that
/// possession of one secret cannot forge the other kind.
#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl JwtSettings {
    pub fn from_env() -> Result<Self> {
        let access_secret =
            env::var("JWT_ACCESS_SECRET").context("JWT_ACCESS_SECRET must be set")?;
        let refresh_secret =
            env::var("JWT_REFRESH_SECRET").context("JWT_REFRESH_SECRET must be set")?;

        if access_secret.is_empty() || refresh_secret.is_empty() {
            bail!("JWT secrets must be non-empty");
        }
        if access_secret == refresh_secret {
            bail!("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ");
        }

        let access_ttl = env::var("JWT_ACCESS_TTL")
            .context("JWT_ACCESS_TTL must be set")
            .and_then(|raw| parse_duration(&raw))?;
        let refresh_ttl = env::var("JWT_REFRESH_TTL")
            .context("JWT_REFRESH_TTL must be set")
            .and_then(|raw| parse_duration(&raw))?;

        if refresh_ttl <= access_ttl {
            bail!("JWT_REFRESH_TTL must exceed JWT_ACCESS_TTL");
        }

        Ok(Self {
            access_secret,
            refresh_secret,
            access_ttl,
            refresh_ttl,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
}

impl RedisSettings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL").context("REDIS_URL must be set")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
        })
    }
}

/// Bounded retry applied to store connection establishment at startup only.
/// Per-request operations are never retried by this core.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetrySettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_attempts: env::var("STORE_CONNECT_MAX_ATTEMPTS")
                .map(|raw| raw.parse())
                .unwrap_or(Ok(defaults.max_attempts))
                .context("Invalid STORE_CONNECT_MAX_ATTEMPTS")?,
            delay: match env::var("STORE_CONNECT_DELAY") {
                Ok(raw) => parse_duration(&raw)?,
                Err(_) => defaults.delay,
            },
        })
    }
}

/// Parse a compact duration string such as `30s`, `15m`, `720h` or `30d`.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("empty duration");
    }

    let (value, multiplier) = if let Some(value) = raw.strip_suffix('s') {
        (value, 1)
    } else if let Some(value) = raw.strip_suffix('m') {
        (value, 60)
    } else if let Some(value) = raw.strip_suffix('h') {
        (value, 3600)
    } else if let Some(value) = raw.strip_suffix('d') {
        (value, 86400)
    } else {
        bail!("duration '{raw}' must end in s, m, h or d");
    };

    let value: u64 = value
        .parse()
        .with_context(|| format!("invalid duration value in '{raw}'"))?;
    if value == 0 {
        bail!("duration '{raw}' must be positive");
    }

    Ok(Duration::from_secs(value * multiplier))
}
