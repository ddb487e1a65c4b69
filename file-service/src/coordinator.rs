//! Two-phase upload orchestration.
//!
//! Create order is fixed: blob first, metadata second. A metadata row is
//! never written for a blob that was not durably stored, and a failed
//! metadata write triggers a best-effort delete of the blob so the caller
//! sees only the original cause. Delete order is inverted: blob first,
//! then the row, so a reader can never observe a row pointing at a
//! missing blob.

use crate::error::{FileError, Result};
use crate::models::{storage_key, FileChunk, FileRecord, UploadHeader};
use crate::store::{ByteStream, MetadataStore, ObjectStore};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, TryStreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Number of in-flight chunks between reception and the object-store
/// write; keeps streamed uploads at O(chunk size) memory.
const RELAY_BUFFER_CHUNKS: usize = 8;

/// A file ready to be served to a caller.
pub struct Download {
    pub content: ByteStream,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
}

pub struct UploadCoordinator {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
}

/// Teardown for a streamed write whose driving future is dropped before
/// it resolves, which is how client cancellation reaches this layer.
///
/// Dropping the relay closes the channel, and the writer would read that
/// close as a normal end-of-stream and make a truncated blob visible. An
/// armed guard instead aborts the writer task and spawns a best-effort
/// delete of the key, covering both a writer that was stopped in time and
/// one that had already completed.
struct RelayGuard {
    objects: Arc<dyn ObjectStore>,
    key: String,
    writer: JoinHandle<Result<u64>>,
    armed: bool,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.writer.abort();
        let objects = self.objects.clone();
        let key = std::mem::take(&mut self.key);
        tokio::spawn(async move {
            if let Err(err) = objects.delete(&key).await {
                warn!(key, error = %err, "compensating blob delete failed");
            }
        });
    }
}

impl UploadCoordinator {
    pub fn new(objects: Arc<dyn ObjectStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { objects, metadata }
    }

    /// Best-effort removal of a blob whose metadata write failed. The
    /// result is logged, not surfaced; the caller keeps the original
    /// error.
    async fn compensate(&self, key: &str) {
        if let Err(err) = self.objects.delete(key).await {
            warn!(key, error = %err, "compensating blob delete failed");
        }
    }

    /// Store a whole payload and its metadata as one logical operation.
    pub async fn upload(
        &self,
        owner_id: Uuid,
        header: UploadHeader,
        body: Bytes,
    ) -> Result<Uuid> {
        let file_id = Uuid::new_v4();
        let key = storage_key(file_id);
        let size = body.len() as i64;

        self.objects.put(&key, &header.mime_type, body).await?;

        let record = FileRecord {
            id: file_id,
            name: header.name,
            mime_type: header.mime_type,
            size,
            owner_id,
            course_id: header.course_id,
            group_id: header.group_id,
            storage_key: key.clone(),
            created_at: Utc::now(),
        };

        if let Err(err) = self.metadata.create(&record).await {
            self.compensate(&key).await;
            return Err(err);
        }

        info!(file_id = %file_id, size, "file uploaded");
        Ok(file_id)
    }

    /// Store a chunked upload: payload bytes are relayed to the object
    /// store as a single streamed write while this method accumulates the
    /// byte count and captures the first-seen header. The metadata row is
    /// created only after the streamed write completes.
    ///
    /// Any inbound failure, including client cancellation, tears down the
    /// relay and compensates exactly like the whole-payload path.
    pub async fn upload_stream<S>(&self, owner_id: Uuid, mut inbound: S) -> Result<Uuid>
    where
        S: Stream<Item = Result<FileChunk>> + Send + Unpin,
    {
        // Pull chunks until the header appears; payload seen before it is
        // kept for the relay.
        let mut pending: Vec<Bytes> = Vec::new();
        let header: UploadHeader = loop {
            match inbound.try_next().await? {
                Some(chunk) => {
                    if !chunk.data.is_empty() {
                        pending.push(chunk.data);
                    }
                    if let Some(header) = chunk.header {
                        break header;
                    }
                }
                None => {
                    return Err(FileError::InvalidStream(
                        "stream ended before metadata header".into(),
                    ))
                }
            }
        };

        let file_id = Uuid::new_v4();
        let key = storage_key(file_id);

        let (tx, rx) = mpsc::channel::<Bytes>(RELAY_BUFFER_CHUNKS);
        let writer = {
            let objects = self.objects.clone();
            let key = key.clone();
            let content_type = header.mime_type.clone();
            tokio::spawn(async move { objects.put_stream(&key, &content_type, rx).await })
        };
        let mut guard = RelayGuard {
            objects: self.objects.clone(),
            key: key.clone(),
            writer,
            armed: true,
        };

        let relay: Result<()> = async {
            for data in pending {
                if tx.send(data).await.is_err() {
                    // Writer closed its end; its error surfaces below.
                    return Ok(());
                }
            }
            while let Some(chunk) = inbound.try_next().await? {
                if chunk.data.is_empty() {
                    continue;
                }
                if tx.send(chunk.data).await.is_err() {
                    return Ok(());
                }
            }
            Ok(())
        }
        .await;

        // Closing the sender signals end-of-stream to the writer.
        drop(tx);

        let written = (&mut guard.writer)
            .await
            .map_err(|e| FileError::StorageWriteFailed(format!("stream writer task failed: {e}")));

        match (relay, written) {
            (Ok(()), Ok(Ok(written))) => {
                let record = FileRecord {
                    id: file_id,
                    name: header.name,
                    mime_type: header.mime_type,
                    size: written as i64,
                    owner_id,
                    course_id: header.course_id,
                    group_id: header.group_id,
                    storage_key: key.clone(),
                    created_at: Utc::now(),
                };

                // The guard stays armed until the record exists so a drop
                // between blob completion and the metadata write still
                // cleans the blob up.
                let created = self.metadata.create(&record).await;
                guard.armed = false;
                if let Err(err) = created {
                    self.compensate(&key).await;
                    return Err(err);
                }

                info!(file_id = %file_id, size = written, "file uploaded from stream");
                Ok(file_id)
            }
            // The inbound failure is the original cause even when the
            // writer also failed as a consequence.
            (Err(err), _) => {
                guard.armed = false;
                self.compensate(&key).await;
                Err(err)
            }
            (Ok(()), Ok(Err(err))) | (Ok(()), Err(err)) => {
                guard.armed = false;
                self.compensate(&key).await;
                Err(err)
            }
        }
    }

    /// Stream a file back to the caller together with its descriptive
    /// metadata.
    pub async fn download(&self, file_id: Uuid) -> Result<Download> {
        let record = self
            .metadata
            .get(file_id)
            .await?
            .ok_or(FileError::NotFound)?;

        let content = self.objects.get(&record.storage_key).await?;

        Ok(Download {
            content,
            name: record.name,
            mime_type: record.mime_type,
            size: record.size,
        })
    }

    /// Delete a file: blob first, then the metadata row. If the blob
    /// delete fails the row is left intact so the file stays visible in
    /// the catalog while still physically present.
    pub async fn delete(&self, file_id: Uuid) -> Result<()> {
        let record = self
            .metadata
            .get(file_id)
            .await?
            .ok_or(FileError::NotFound)?;

        self.objects.delete(&record.storage_key).await?;
        self.metadata.delete(file_id).await?;

        info!(file_id = %file_id, "file deleted");
        Ok(())
    }

    /// Fetch a file's metadata record.
    pub async fn get(&self, file_id: Uuid) -> Result<FileRecord> {
        self.metadata
            .get(file_id)
            .await?
            .ok_or(FileError::NotFound)
    }

    pub async fn list_by_course(&self, course_id: Uuid) -> Result<Vec<FileRecord>> {
        self.metadata.list_by_course(course_id).await
    }

    pub async fn list_by_group(&self, group_id: Uuid) -> Result<Vec<FileRecord>> {
        self.metadata.list_by_group(group_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectInfo;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryObjectStore {
        objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
        fail_stream: AtomicBool,
        fail_delete: AtomicBool,
    }

    #[async_trait]
    impl ObjectStore for MemoryObjectStore {
        async fn put(&self, key: &str, content_type: &str, body: Bytes) -> Result<()> {
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), (content_type.to_string(), body.to_vec()));
            Ok(())
        }

        async fn put_stream(
            &self,
            key: &str,
            content_type: &str,
            mut chunks: mpsc::Receiver<Bytes>,
        ) -> Result<u64> {
            let mut buf = Vec::new();
            while let Some(chunk) = chunks.recv().await {
                if self.fail_stream.load(Ordering::SeqCst) {
                    return Err(FileError::StorageWriteFailed("injected stream failure".into()));
                }
                buf.extend_from_slice(&chunk);
            }
            let total = buf.len() as u64;
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), (content_type.to_string(), buf));
            Ok(total)
        }

        async fn get(&self, key: &str) -> Result<ByteStream> {
            let body = self
                .objects
                .lock()
                .unwrap()
                .get(key)
                .map(|(_, body)| body.clone())
                .ok_or(FileError::NotFound)?;
            Ok(futures::stream::once(async move { Ok(Bytes::from(body)) }).boxed())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(FileError::Storage("injected delete failure".into()));
            }
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        async fn stat(&self, key: &str) -> Result<ObjectInfo> {
            let guard = self.objects.lock().unwrap();
            let (content_type, body) = guard.get(key).ok_or(FileError::NotFound)?;
            Ok(ObjectInfo {
                size: body.len() as i64,
                content_type: Some(content_type.clone()),
                last_modified: None,
            })
        }
    }

    #[derive(Default)]
    struct MemoryMetadataStore {
        rows: Mutex<HashMap<Uuid, FileRecord>>,
        fail_create: AtomicBool,
    }

    #[async_trait]
    impl MetadataStore for MemoryMetadataStore {
        async fn create(&self, record: &FileRecord) -> Result<()> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(FileError::MetadataWriteFailed("injected failure".into()));
            }
            let mut rows = self.rows.lock().unwrap();
            if rows.contains_key(&record.id) {
                return Err(FileError::DuplicateEntry);
            }
            rows.insert(record.id, record.clone());
            Ok(())
        }

        async fn get(&self, id: Uuid) -> Result<Option<FileRecord>> {
            Ok(self.rows.lock().unwrap().get(&id).cloned())
        }

        async fn delete(&self, id: Uuid) -> Result<()> {
            self.rows
                .lock()
                .unwrap()
                .remove(&id)
                .map(|_| ())
                .ok_or(FileError::NotFound)
        }

        async fn list_by_course(&self, course_id: Uuid) -> Result<Vec<FileRecord>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.course_id == Some(course_id))
                .cloned()
                .collect())
        }

        async fn list_by_group(&self, group_id: Uuid) -> Result<Vec<FileRecord>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.group_id == Some(group_id))
                .cloned()
                .collect())
        }
    }

    fn coordinator() -> (
        UploadCoordinator,
        Arc<MemoryObjectStore>,
        Arc<MemoryMetadataStore>,
    ) {
        let objects = Arc::new(MemoryObjectStore::default());
        let metadata = Arc::new(MemoryMetadataStore::default());
        (
            UploadCoordinator::new(objects.clone(), metadata.clone()),
            objects,
            metadata,
        )
    }

    fn header(name: &str) -> UploadHeader {
        UploadHeader {
            name: name.to_string(),
            mime_type: "application/pdf".to_string(),
            course_id: None,
            group_id: None,
        }
    }

    async fn collect(mut stream: ByteStream) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.try_next().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn upload_then_download_roundtrip() {
        let (coordinator, _, _) = coordinator();
        let owner = Uuid::new_v4();
        let body = payload(4096);

        let file_id = coordinator
            .upload(owner, header("syllabus.pdf"), Bytes::from(body.clone()))
            .await
            .unwrap();

        let record = coordinator.get(file_id).await.unwrap();
        assert_eq!(record.name, "syllabus.pdf");
        assert_eq!(record.mime_type, "application/pdf");
        assert_eq!(record.size, 4096);
        assert_eq!(record.owner_id, owner);
        assert_eq!(record.storage_key, format!("files/{file_id}"));

        let download = coordinator.download(file_id).await.unwrap();
        assert_eq!(download.name, "syllabus.pdf");
        assert_eq!(collect(download.content).await.unwrap(), body);
    }

    #[tokio::test]
    async fn delete_removes_blob_and_record() {
        let (coordinator, objects, metadata) = coordinator();
        let file_id = coordinator
            .upload(Uuid::new_v4(), header("a.pdf"), Bytes::from(payload(128)))
            .await
            .unwrap();
        let key = format!("files/{file_id}");

        coordinator.delete(file_id).await.unwrap();

        match coordinator.download(file_id).await {
            Err(FileError::NotFound) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
        assert!(matches!(objects.stat(&key).await, Err(FileError::NotFound)));
        assert!(metadata.get(file_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn metadata_failure_compensates_blob() {
        let (coordinator, objects, metadata) = coordinator();
        metadata.fail_create.store(true, Ordering::SeqCst);

        match coordinator
            .upload(Uuid::new_v4(), header("a.pdf"), Bytes::from(payload(64)))
            .await
        {
            Err(FileError::MetadataWriteFailed(_)) => {}
            other => panic!("expected MetadataWriteFailed, got {:?}", other.map(|_| ())),
        }

        // Compensation deleted the blob; nothing remains in either store
        assert!(objects.objects.lock().unwrap().is_empty());
        assert!(metadata.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chunked_upload_is_boundary_independent() {
        let body = payload(10_000);

        for chunk_size in [1usize, 3, 7, 100, 4096, 9_999, 10_000] {
            let (coordinator, objects, _) = coordinator();
            let owner = Uuid::new_v4();

            let mut chunks = vec![Ok(FileChunk::header(header("lecture.mp4")))];
            for window in body.chunks(chunk_size) {
                chunks.push(Ok(FileChunk::data(Bytes::copy_from_slice(window))));
            }

            let file_id = coordinator
                .upload_stream(owner, futures::stream::iter(chunks))
                .await
                .unwrap();

            let record = coordinator.get(file_id).await.unwrap();
            assert_eq!(record.size, 10_000, "chunk_size {chunk_size}");

            let key = format!("files/{file_id}");
            let stored = objects.objects.lock().unwrap().get(&key).unwrap().1.clone();
            assert_eq!(stored, body, "chunk_size {chunk_size}");
        }
    }

    #[tokio::test]
    async fn chunked_upload_accepts_header_after_first_data_chunk() {
        let (coordinator, _, _) = coordinator();
        let body = payload(512);

        let chunks = vec![
            Ok(FileChunk::data(Bytes::copy_from_slice(&body[..100]))),
            Ok(FileChunk::header(header("notes.txt"))),
            Ok(FileChunk::data(Bytes::copy_from_slice(&body[100..]))),
        ];

        let file_id = coordinator
            .upload_stream(Uuid::new_v4(), futures::stream::iter(chunks))
            .await
            .unwrap();

        let record = coordinator.get(file_id).await.unwrap();
        assert_eq!(record.size, 512);
        assert_eq!(record.name, "notes.txt");
    }

    #[tokio::test]
    async fn chunked_upload_without_header_is_rejected() {
        let (coordinator, objects, metadata) = coordinator();

        let chunks = vec![Ok(FileChunk::data(Bytes::from_static(b"orphan bytes")))];
        match coordinator
            .upload_stream(Uuid::new_v4(), futures::stream::iter(chunks))
            .await
        {
            Err(FileError::InvalidStream(_)) => {}
            other => panic!("expected InvalidStream, got {:?}", other.map(|_| ())),
        }

        assert!(objects.objects.lock().unwrap().is_empty());
        assert!(metadata.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inbound_error_tears_down_and_compensates() {
        let (coordinator, objects, metadata) = coordinator();

        let chunks: Vec<Result<FileChunk>> = vec![
            Ok(FileChunk::header(header("partial.bin"))),
            Ok(FileChunk::data(Bytes::from(payload(1024)))),
            Err(FileError::Canceled),
        ];

        match coordinator
            .upload_stream(Uuid::new_v4(), futures::stream::iter(chunks))
            .await
        {
            Err(FileError::Canceled) => {}
            other => panic!("expected Canceled, got {:?}", other.map(|_| ())),
        }

        assert!(objects.objects.lock().unwrap().is_empty());
        assert!(metadata.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_upload_aborts_writer_and_compensates() {
        use std::time::Duration;

        let objects = Arc::new(MemoryObjectStore::default());
        let metadata = Arc::new(MemoryMetadataStore::default());
        let coordinator = Arc::new(UploadCoordinator::new(objects.clone(), metadata.clone()));

        // Header and one chunk arrive, then the client goes silent.
        let inbound = futures::stream::iter(vec![
            Ok(FileChunk::header(header("halted.bin"))),
            Ok(FileChunk::data(Bytes::from(payload(1024)))),
        ])
        .chain(futures::stream::pending());

        let upload = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.upload_stream(Uuid::new_v4(), inbound).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        upload.abort();
        let _ = upload.await;

        // Let the spawned teardown run
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(objects.objects.lock().unwrap().is_empty());
        assert!(metadata.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn writer_failure_surfaces_and_compensates() {
        let (coordinator, objects, metadata) = coordinator();
        objects.fail_stream.store(true, Ordering::SeqCst);

        let chunks = vec![
            Ok(FileChunk::header(header("doomed.bin"))),
            Ok(FileChunk::data(Bytes::from(payload(2048)))),
        ];

        match coordinator
            .upload_stream(Uuid::new_v4(), futures::stream::iter(chunks))
            .await
        {
            Err(FileError::StorageWriteFailed(_)) => {}
            other => panic!("expected StorageWriteFailed, got {:?}", other.map(|_| ())),
        }

        assert!(objects.objects.lock().unwrap().is_empty());
        assert!(metadata.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chunked_metadata_failure_compensates_blob() {
        let (coordinator, objects, metadata) = coordinator();
        metadata.fail_create.store(true, Ordering::SeqCst);

        let chunks = vec![
            Ok(FileChunk::header(header("unlisted.bin"))),
            Ok(FileChunk::data(Bytes::from(payload(256)))),
        ];

        match coordinator
            .upload_stream(Uuid::new_v4(), futures::stream::iter(chunks))
            .await
        {
            Err(FileError::MetadataWriteFailed(_)) => {}
            other => panic!("expected MetadataWriteFailed, got {:?}", other.map(|_| ())),
        }

        assert!(objects.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blob_delete_failure_keeps_record() {
        let (coordinator, objects, metadata) = coordinator();
        let file_id = coordinator
            .upload(Uuid::new_v4(), header("sticky.pdf"), Bytes::from(payload(64)))
            .await
            .unwrap();

        objects.fail_delete.store(true, Ordering::SeqCst);
        match coordinator.delete(file_id).await {
            Err(FileError::Storage(_)) => {}
            other => panic!("expected Storage error, got {other:?}"),
        }

        // The catalog still lists the file; nothing was half-deleted
        assert!(metadata.get(file_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_by_course_and_group() {
        let (coordinator, _, _) = coordinator();
        let owner = Uuid::new_v4();
        let course = Uuid::new_v4();
        let group = Uuid::new_v4();

        let mut course_header = header("c.pdf");
        course_header.course_id = Some(course);
        let mut group_header = header("g.pdf");
        group_header.group_id = Some(group);

        let course_file = coordinator
            .upload(owner, course_header, Bytes::from(payload(10)))
            .await
            .unwrap();
        let group_file = coordinator
            .upload(owner, group_header, Bytes::from(payload(10)))
            .await
            .unwrap();

        let by_course = coordinator.list_by_course(course).await.unwrap();
        assert_eq!(by_course.len(), 1);
        assert_eq!(by_course[0].id, course_file);

        let by_group = coordinator.list_by_group(group).await.unwrap();
        assert_eq!(by_group.len(), 1);
        assert_eq!(by_group[0].id, group_file);
    }

    #[tokio::test]
    async fn zero_byte_stream_upload_is_stored() {
        let (coordinator, _, _) = coordinator();

        let chunks = vec![Ok(FileChunk::header(header("empty.txt")))];
        let file_id = coordinator
            .upload_stream(Uuid::new_v4(), futures::stream::iter(chunks))
            .await
            .unwrap();

        let record = coordinator.get(file_id).await.unwrap();
        assert_eq!(record.size, 0);
        assert!(collect(coordinator.download(file_id).await.unwrap().content)
            .await
            .unwrap()
            .is_empty());
    }
}
