//! S3 object store adapter.
//!
//! Whole payloads go through `put_object`; streamed writes use a multipart
//! upload that is aborted on any failure so no partial object ever becomes
//! visible under the key.

use crate::config::{RetrySettings, S3Settings};
use crate::error::{FileError, Result};
use crate::models::ObjectInfo;
use crate::store::{ByteStream, ObjectStore};
use async_trait::async_trait;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Minimum S3 part size; every part except the last must reach it.
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        let aborted = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;
        if let Err(err) = aborted {
            warn!(key, error = %err, "failed to abort multipart upload");
        }
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart> {
        let part = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(aws_sdk_s3::primitives::ByteStream::from(body))
            .send()
            .await
            .map_err(|e| FileError::StorageWriteFailed(e.to_string()))?;

        let etag = part
            .e_tag()
            .ok_or_else(|| {
                FileError::StorageWriteFailed(format!("missing etag for part {part_number}"))
            })?
            .to_string();

        Ok(CompletedPart::builder()
            .part_number(part_number)
            .e_tag(etag)
            .build())
    }

    async fn put_stream_multipart(
        &self,
        key: &str,
        upload_id: &str,
        chunks: &mut mpsc::Receiver<Bytes>,
    ) -> Result<u64> {
        let mut parts: Vec<CompletedPart> = Vec::new();
        let mut buffer = BytesMut::new();
        let mut total: u64 = 0;
        let mut part_number = 1;

        while let Some(chunk) = chunks.recv().await {
            total += chunk.len() as u64;
            buffer.extend_from_slice(&chunk);

            while buffer.len() >= MIN_PART_SIZE {
                let body = buffer.split_to(MIN_PART_SIZE).freeze();
                parts.push(self.upload_part(key, upload_id, part_number, body).await?);
                part_number += 1;
            }
        }

        if !buffer.is_empty() || parts.is_empty() {
            let body = buffer.freeze();
            parts.push(self.upload_part(key, upload_id, part_number, body).await?);
        }

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| FileError::StorageWriteFailed(e.to_string()))?;

        Ok(total)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, content_type: &str, body: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(aws_sdk_s3::primitives::ByteStream::from(body))
            .send()
            .await
            .map_err(|e| FileError::StorageWriteFailed(e.to_string()))?;

        Ok(())
    }

    async fn put_stream(
        &self,
        key: &str,
        content_type: &str,
        mut chunks: mpsc::Receiver<Bytes>,
    ) -> Result<u64> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| FileError::StorageWriteFailed(e.to_string()))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| FileError::StorageWriteFailed("missing multipart upload id".into()))?
            .to_string();

        match self.put_stream_multipart(key, &upload_id, &mut chunks).await {
            Ok(total) => Ok(total),
            Err(err) => {
                chunks.close();
                self.abort_multipart(key, &upload_id).await;
                Err(err)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<ByteStream> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    FileError::NotFound
                } else {
                    FileError::StorageReadFailed(service.to_string())
                }
            })?;

        let stream = futures::stream::try_unfold(resp.body, |mut body| async move {
            match body.try_next().await {
                Ok(Some(chunk)) => Ok(Some((chunk, body))),
                Ok(None) => Ok(None),
                Err(err) => Err(FileError::StorageReadFailed(err.to_string())),
            }
        });

        Ok(stream.boxed())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| FileError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn stat(&self, key: &str) -> Result<ObjectInfo> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_not_found() {
                    FileError::NotFound
                } else {
                    FileError::Storage(service.to_string())
                }
            })?;

        let last_modified = head
            .last_modified()
            .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), t.subsec_nanos()));

        Ok(ObjectInfo {
            size: head.content_length().unwrap_or(0),
            content_type: head.content_type().map(|s| s.to_string()),
            last_modified,
        })
    }
}

/// Build an S3 client from settings and verify bucket reachability with
/// bounded retry. Startup only.
pub async fn connect_object_store(
    settings: &S3Settings,
    retry: &RetrySettings,
) -> anyhow::Result<S3ObjectStore> {
    use anyhow::Context;

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(settings.region.clone()));

    if let (Some(key), Some(secret)) = (
        settings.access_key_id.as_deref(),
        settings.secret_access_key.as_deref(),
    ) {
        loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
            key,
            secret,
            None,
            None,
            "environment",
        ));
    }

    let sdk_config = loader.load().await;
    let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
    if let Some(endpoint) = &settings.endpoint {
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }
    let client = Client::from_conf(builder.build());

    let mut attempt = 1;
    loop {
        match client
            .head_bucket()
            .bucket(&settings.bucket)
            .send()
            .await
        {
            Ok(_) => {
                info!(attempt, bucket = %settings.bucket, "object store connected");
                return Ok(S3ObjectStore::new(client, settings.bucket.clone()));
            }
            Err(err) if attempt < retry.max_attempts => {
                warn!(attempt, error = %err, "object store connection failed, retrying");
                tokio::time::sleep(retry.delay).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(err).context("failed to reach S3 bucket");
            }
        }
    }
}
