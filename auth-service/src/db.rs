//! Subject directory backed by Postgres.
//!
//! The credential core only needs the current subject and role when a
//! refresh credential is presented; account CRUD lives elsewhere.

use crate::config::{DatabaseSettings, RetrySettings};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

/// Current identity of a subject as recorded in the directory.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Subject {
    pub id: Uuid,
    pub role: String,
}

/// Lookup of the subject behind a credential.
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subject>>;
}

pub struct PgSubjectDirectory {
    pool: PgPool,
}

impl PgSubjectDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubjectDirectory for PgSubjectDirectory {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subject>> {
        let subject =
            sqlx::query_as::<_, Subject>("SELECT id, role FROM subjects WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(subject)
    }
}

/// Connect to Postgres with bounded retry at startup.
pub async fn connect_database(
    settings: &DatabaseSettings,
    retry: &RetrySettings,
) -> anyhow::Result<PgPool> {
    use anyhow::Context;

    let mut attempt = 1;
    loop {
        let connect = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.url)
            .await;

        match connect {
            Ok(pool) => {
                info!(attempt, "subject directory connected");
                return Ok(pool);
            }
            Err(err) if attempt < retry.max_attempts => {
                warn!(attempt, error = %err, "database connection failed, retrying");
                tokio::time::sleep(retry.delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err).context("failed to connect to PostgreSQL"),
        }
    }
}

/// Apply schema migrations for the subjects table.
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    use anyhow::Context;
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run auth-service migrations")?;
    Ok(())
}
