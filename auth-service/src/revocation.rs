//! Token revocation store.
//!
//! Records blacklisted access-token identifiers and logged-out session
//! identifiers in Redis. Existence of a key is the signal; each key expires
//! together with the credential it shadows, so the store never grows past
//! the set of live revoked credentials.

use crate::config::RetrySettings;
use crate::error::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{info, warn};

/// Revocation state, keyed by credential identifier (`jti`).
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Mark an access credential unusable for the remainder of its life.
    async fn mark_blacklisted(&self, jti: &str, ttl: Duration) -> Result<()>;

    async fn is_blacklisted(&self, jti: &str) -> Result<bool>;

    /// Mark a refresh credential's session logged out for the remainder
    /// of its life.
    async fn mark_logged_out(&self, jti: &str, ttl: Duration) -> Result<()>;

    async fn is_logged_out(&self, jti: &str) -> Result<bool>;
}

fn blacklist_key(jti: &str) -> String {
    format!("blacklist:{jti}")
}

fn logout_key(jti: &str) -> String {
    format!("logout_session:{jti}")
}

/// Redis-backed revocation store.
#[derive(Clone)]
pub struct RedisRevocationStore {
    redis: ConnectionManager,
}

impl RedisRevocationStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// SET with per-key expiry. Re-marking an existing key overwrites it,
    /// which keeps marking idempotent.
    async fn mark(&self, key: String, ttl: Duration) -> Result<()> {
        let ttl_secs = ttl.as_secs();
        if ttl_secs == 0 {
            // Already expired; decode rejects the credential on its own.
            return Ok(());
        }

        let mut conn = self.redis.clone();
        let _: () = conn.set_ex(&key, 1u8, ttl_secs).await?;
        info!(key = %key, ttl_secs, "revocation recorded");
        Ok(())
    }

    async fn exists(&self, key: String) -> Result<bool> {
        let mut conn = self.redis.clone();
        let found: bool = conn.exists(&key).await?;
        Ok(found)
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn mark_blacklisted(&self, jti: &str, ttl: Duration) -> Result<()> {
        self.mark(blacklist_key(jti), ttl).await
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool> {
        self.exists(blacklist_key(jti)).await
    }

    async fn mark_logged_out(&self, jti: &str, ttl: Duration) -> Result<()> {
        self.mark(logout_key(jti), ttl).await
    }

    async fn is_logged_out(&self, jti: &str) -> Result<bool> {
        self.exists(logout_key(jti)).await
    }
}

/// Connect to Redis with bounded retry. Startup only; per-request
/// operations are never retried here.
pub async fn connect_revocation_store(
    url: &str,
    retry: &RetrySettings,
) -> anyhow::Result<RedisRevocationStore> {
    use anyhow::Context;

    let client = redis::Client::open(url).context("invalid REDIS_URL")?;

    let mut attempt = 1;
    loop {
        match ConnectionManager::new(client.clone()).await {
            Ok(manager) => {
                info!(attempt, "revocation store connected");
                return Ok(RedisRevocationStore::new(manager));
            }
            Err(err) if attempt < retry.max_attempts => {
                warn!(attempt, error = %err, "revocation store connection failed, retrying");
                tokio::time::sleep(retry.delay).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(err).context("failed to connect to Redis revocation store");
            }
        }
    }
}
