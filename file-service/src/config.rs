//! Configuration for the file service.
//!
//! Bucket and connection parameters are required before the core is
//! constructed; a missing value is a fatal startup condition.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub s3: S3Settings,
    pub database: DatabaseSettings,
    pub retry: RetrySettings,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            s3: S3Settings::from_env()?,
            database: DatabaseSettings::from_env()?,
            retry: RetrySettings::from_env()?,
        })
    }
}

/// Object store connection parameters.
///
/// `endpoint` switches the client to path-style addressing for
/// MinIO-compatible deployments.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint: Option<String>,
}

impl S3Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bucket: env::var("S3_BUCKET").context("S3_BUCKET must be set")?,
            region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
            endpoint: env::var("S3_ENDPOINT").ok(),
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

/// Bounded retry for store connection establishment at startup only.
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
            delay: env::var("STORE_CONNECT_DELAY_SECS")
                .map(|raw| raw.parse().map(Duration::from_secs))
                .unwrap_or(Ok(defaults.delay))
                .context("Invalid STORE_CONNECT_DELAY_SECS")?,
        })
    }
}
