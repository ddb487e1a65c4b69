//! Postgres metadata store adapter.

use crate::config::{DatabaseSettings, RetrySettings};
use crate::error::{FileError, Result};
use crate::models::FileRecord;
use crate::store::MetadataStore;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn create(&self, record: &FileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (id, name, mime_type, size, owner_id, course_id, group_id, storage_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.mime_type)
        .bind(record.size)
        .bind(record.owner_id)
        .bind(record.course_id)
        .bind(record.group_id)
        .bind(&record.storage_key)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| match FileError::from(err) {
            FileError::DuplicateEntry => FileError::DuplicateEntry,
            other => FileError::MetadataWriteFailed(other.to_string()),
        })?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(FileError::NotFound);
        }
        Ok(())
    }

    async fn list_by_course(&self, course_id: Uuid) -> Result<Vec<FileRecord>> {
        let records = sqlx::query_as::<_, FileRecord>(
            "SELECT * FROM files WHERE course_id = $1 ORDER BY created_at DESC",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn list_by_group(&self, group_id: Uuid) -> Result<Vec<FileRecord>> {
        let records = sqlx::query_as::<_, FileRecord>(
            "SELECT * FROM files WHERE group_id = $1 ORDER BY created_at DESC",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

/// Connect to Postgres with bounded retry at startup.
pub async fn connect_metadata_store(
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
                info!(attempt, "metadata store connected");
                return Ok(pool);
            }
            Err(err) if attempt < retry.max_attempts => {
                warn!(attempt, error = %err, "metadata store connection failed, retrying");
                tokio::time::sleep(retry.delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err).context("failed to connect to PostgreSQL"),
        }
    }
}

/// Apply schema migrations for the files table.
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    use anyhow::Context;
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run file-service migrations")?;
    Ok(())
}
