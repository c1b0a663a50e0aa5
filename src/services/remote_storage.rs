//! src/services/remote_storage.rs
//!
//! RemoteStorage — a façade over a single bucket of an S3-compatible object
//! store (MinIO in deployment). The surface is deliberately small: presigned
//! GET URLs, open/write/read/stream/delete against one bucket. No retries,
//! no caching; conflict semantics on overlapping writes belong to the store.

use crate::errors::{StorageError, StorageResult};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region, timeout::TimeoutConfig};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

/// Fixed part size for multipart transfers.
const PART_SIZE: usize = 1024 * 1024;

/// Maximum accepted object path length in bytes.
const MAX_OBJECT_PATH_LEN: usize = 1024;

/// Default lifetime of presigned GET URLs (the signing scheme's maximum).
pub const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Connection settings for [`RemoteStorage::connect`].
#[derive(Debug, Clone)]
pub struct RemoteStorageConfig {
    /// Host:port of the store, or a full URL. A bare host:port is prefixed
    /// with `https://` or `http://` according to `secure`.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// Use TLS when `endpoint` carries no explicit scheme.
    pub secure: bool,
    pub region: String,
    /// Applied to every remote call, construction included.
    pub operation_timeout: Duration,
}

/// RemoteStorage provides the object operations the blog service needs:
/// - Write a payload (single put, or 1 MiB multipart above the part size)
/// - Read an object fully into memory
/// - Stream an object in bounded chunks
/// - Delete an object
/// - Produce presigned GET URLs and lightweight file handles
///
/// The bucket is verified (and created if absent) once, at construction.
/// Externally deleting it afterwards surfaces as `BucketNotFound` on the
/// next operation rather than being re-checked per call.
#[derive(Clone)]
pub struct RemoteStorage {
    client: Client,
    bucket: String,
}

impl RemoteStorage {
    /// Build a client for the configured endpoint and make sure the target
    /// bucket exists, creating it when absent. Idempotent: connecting twice
    /// against the same bucket succeeds both times.
    ///
    /// Unlike the per-object operations, failures here are always fatal —
    /// an instance bound to an unreachable endpoint would be useless.
    pub async fn connect(config: RemoteStorageConfig) -> StorageResult<Self> {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "blog-store",
        );
        let endpoint_url = endpoint_url(&config.endpoint, config.secure);
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .endpoint_url(endpoint_url)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.operation_timeout)
                    .build(),
            )
            .load()
            .await;
        // Path-style addressing: MinIO and most self-hosted stores do not
        // resolve virtual-hosted bucket subdomains.
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();
        let client = Client::from_conf(s3_config);

        ensure_bucket_exists(&client, &config.bucket).await?;
        info!(bucket = %config.bucket, "connected to object store");

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }

    /// Name of the bucket this instance is bound to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Return a handle bound to this storage and `path`. No existence check,
    /// no I/O; only local path validation.
    pub fn open(&self, path: &str) -> StorageResult<StorageFile> {
        ensure_path_valid(path)?;
        Ok(StorageFile {
            storage: self.clone(),
            path: path.to_string(),
        })
    }

    /// Presigned GET URL with the default expiry.
    pub async fn presigned_get_url(&self, path: &str) -> StorageResult<String> {
        self.presigned_get_url_with_expiry(path, DEFAULT_PRESIGN_EXPIRY)
            .await
    }

    /// Time-limited signed URL permitting retrieval of `path` without
    /// further authentication.
    pub async fn presigned_get_url_with_expiry(
        &self,
        path: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        ensure_path_valid(path)?;
        let presign = PresigningConfig::expires_in(expires_in)
            .map_err(|err| StorageError::Transfer(format!("presign expiry rejected: {err}")))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .presigned(presign)
            .await
            .map_err(|err| classify(&self.bucket, Some(path), err))?;
        Ok(request.uri().to_string())
    }

    /// Upload `data` to `path`, overwriting any existing object. Payloads
    /// above the part size go through multipart upload with `Content-MD5`
    /// on every part; a failed part upload aborts the whole session.
    pub async fn write(&self, path: &str, data: Bytes) -> StorageResult<()> {
        ensure_path_valid(path)?;
        let result = if data.len() <= PART_SIZE {
            self.put_single(path, data).await
        } else {
            self.put_multipart(path, data).await
        };
        if let Err(err) = &result {
            warn!(path, error = %err, "write failed");
        }
        result
    }

    /// Fetch the full object at `path`. A missing object is an
    /// `ObjectNotFound` error, never an empty buffer.
    pub async fn read(&self, path: &str) -> StorageResult<Bytes> {
        ensure_path_valid(path)?;
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|err| {
                let err = classify(&self.bucket, Some(path), err);
                warn!(path, error = %err, "read failed");
                err
            })?;
        let data = response
            .body
            .collect()
            .await
            .map_err(|err| StorageError::Transfer(format!("reading object body: {err}")))?;
        Ok(data.into_bytes())
    }

    /// Stream the object at `path` as chunks of exactly `chunk_size` bytes
    /// (the final chunk may be shorter). The remote read handle is released
    /// when the returned stream is dropped, consumed or not.
    ///
    /// `chunk_size` is clamped to at least 1.
    pub async fn stream(&self, path: &str, chunk_size: usize) -> StorageResult<ObjectStream> {
        ensure_path_valid(path)?;
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|err| {
                let err = classify(&self.bucket, Some(path), err);
                warn!(path, error = %err, "stream open failed");
                err
            })?;
        Ok(ObjectStream::new(
            response.body.into_async_read(),
            chunk_size,
        ))
    }

    /// Remove the object at `path`. Follows S3 semantics: deleting a key
    /// that does not exist succeeds.
    pub async fn delete(&self, path: &str) -> StorageResult<()> {
        ensure_path_valid(path)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| {
                let err = classify(&self.bucket, Some(path), err);
                warn!(path, error = %err, "delete failed");
                err
            })
    }

    async fn put_single(&self, path: &str, data: Bytes) -> StorageResult<()> {
        let checksum = md5_base64(&data);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .content_md5(checksum)
            .body(ByteStream::from(data))
            .send()
            .await
            .map(|_| ())
            .map_err(|err| classify(&self.bucket, Some(path), err))
    }

    async fn put_multipart(&self, path: &str, data: Bytes) -> StorageResult<()> {
        let create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|err| classify(&self.bucket, Some(path), err))?;
        let upload_id = create
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Transfer("store returned no multipart upload id".into()))?;

        let mut completed = Vec::new();
        let mut offset = 0usize;
        let mut part_number = 1i32;
        while offset < data.len() {
            let end = (offset + PART_SIZE).min(data.len());
            let part = data.slice(offset..end);
            let checksum = md5_base64(&part);
            let response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(path)
                .upload_id(&upload_id)
                .part_number(part_number)
                .content_md5(checksum)
                .body(ByteStream::from(part))
                .send()
                .await;
            let response = match response {
                Ok(response) => response,
                Err(err) => {
                    self.abort_multipart(path, &upload_id).await;
                    return Err(classify(&self.bucket, Some(path), err));
                }
            };
            completed.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(response.e_tag().map(str::to_string))
                    .build(),
            );
            offset = end;
            part_number += 1;
        }

        let parts = CompletedMultipartUpload::builder()
            .set_parts(Some(completed))
            .build();
        if let Err(err) = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(path)
            .upload_id(&upload_id)
            .multipart_upload(parts)
            .send()
            .await
        {
            self.abort_multipart(path, &upload_id).await;
            return Err(classify(&self.bucket, Some(path), err));
        }
        debug!(path, parts = part_number - 1, "multipart upload complete");
        Ok(())
    }

    /// Best-effort abort; the session would otherwise linger until the
    /// store's own cleanup reaps it.
    async fn abort_multipart(&self, path: &str, upload_id: &str) {
        if let Err(err) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(path)
            .upload_id(upload_id)
            .send()
            .await
        {
            debug!(
                path,
                "failed to abort multipart upload: {}",
                DisplayErrorContext(&err)
            );
        }
    }
}

/// A named object in the bucket: just (storage, path), constructed on
/// demand by [`RemoteStorage::open`] and never persisted. Its one derived
/// behavior is producing a presigned retrieval URL.
#[derive(Clone)]
pub struct StorageFile {
    storage: RemoteStorage,
    path: String,
}

impl StorageFile {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Presigned GET URL for this object, default expiry.
    pub async fn url(&self) -> StorageResult<String> {
        self.storage.presigned_get_url(&self.path).await
    }
}

/// Lazy, finite, non-restartable sequence of object chunks.
///
/// Holds the open remote body for its lifetime; dropping the stream —
/// after full consumption, early abandonment, or an error — releases it.
/// On a transport error the consumer sees a single `Err` item and the
/// stream terminates.
pub struct ObjectStream {
    inner: BoxStream<'static, StorageResult<Bytes>>,
}

impl ObjectStream {
    fn new<R>(reader: R, chunk_size: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self {
            inner: chunk_reader(reader, chunk_size).boxed(),
        }
    }
}

impl Stream for ObjectStream {
    type Item = StorageResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Re-chunk an async reader into `Bytes` of exactly `chunk_size`, except
/// possibly the last. The underlying reader may return short reads at
/// network boundaries, so each chunk is filled before being yielded.
/// `chunk_size` is clamped to at least 1; a read error surfaces as a single
/// `Err` item and the stream terminates.
fn chunk_reader<R>(reader: R, chunk_size: usize) -> impl Stream<Item = StorageResult<Bytes>> + Send
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let chunk_size = chunk_size.max(1);
    futures::stream::try_unfold((reader, chunk_size), |(mut reader, chunk_size)| async move {
        let mut buf = vec![0u8; chunk_size];
        let mut filled = 0usize;
        while filled < chunk_size {
            let n = reader.read(&mut buf[filled..]).await.map_err(|err| {
                warn!(error = %err, "object stream aborted");
                StorageError::Transfer(format!("reading object body: {err}"))
            })?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            Ok(None)
        } else {
            buf.truncate(filled);
            Ok(Some((Bytes::from(buf), (reader, chunk_size))))
        }
    })
}

/// Object paths are canonical UTF-8 strings, validated before any network
/// I/O: non-empty, at most 1024 bytes, no leading `/`, no `..` segments,
/// no control characters, backslashes, or NUL.
fn ensure_path_valid(path: &str) -> StorageResult<()> {
    if path.is_empty() {
        return Err(StorageError::InvalidObjectPath("path is empty".into()));
    }
    if path.len() > MAX_OBJECT_PATH_LEN {
        return Err(StorageError::InvalidObjectPath(format!(
            "path exceeds {MAX_OBJECT_PATH_LEN} bytes"
        )));
    }
    if path.starts_with('/') {
        return Err(StorageError::InvalidObjectPath(
            "path must not start with `/`".into(),
        ));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(StorageError::InvalidObjectPath(
            "path must not contain `..` segments".into(),
        ));
    }
    if path
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(StorageError::InvalidObjectPath(
            "path contains control characters or backslashes".into(),
        ));
    }
    Ok(())
}

/// Map an SDK failure onto the storage error taxonomy. Dispatch and timeout
/// failures are connection problems; service errors are told apart by code.
fn classify<E>(bucket: &str, key: Option<&str>, err: SdkError<E>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if matches!(err, SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)) {
        return StorageError::Connection(DisplayErrorContext(&err).to_string());
    }
    match err.code() {
        Some("NoSuchKey") | Some("NotFound") => match key {
            Some(key) => StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            None => StorageError::BucketNotFound(bucket.to_string()),
        },
        Some("NoSuchBucket") => StorageError::BucketNotFound(bucket.to_string()),
        Some("AccessDenied") | Some("InvalidAccessKeyId") | Some("SignatureDoesNotMatch") => {
            StorageError::Authorization(DisplayErrorContext(&err).to_string())
        }
        _ => StorageError::Transfer(DisplayErrorContext(&err).to_string()),
    }
}

/// HeadBucket, then CreateBucket when absent. "Already exists" and
/// "already owned by you" on create count as success so repeated
/// construction stays idempotent.
async fn ensure_bucket_exists(client: &Client, bucket: &str) -> StorageResult<()> {
    match client.head_bucket().bucket(bucket).send().await {
        Ok(_) => return Ok(()),
        Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
            debug!(bucket, "bucket absent, creating");
        }
        Err(err) => return Err(classify(bucket, None, err)),
    }
    match client.create_bucket().bucket(bucket).send().await {
        Ok(_) => {
            info!(bucket, "created bucket");
            Ok(())
        }
        Err(err)
            if err.as_service_error().is_some_and(|e| {
                e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists()
            }) =>
        {
            Ok(())
        }
        Err(err) => Err(classify(bucket, None, err)),
    }
}

fn endpoint_url(endpoint: &str, secure: bool) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else if secure {
        format!("https://{endpoint}")
    } else {
        format!("http://{endpoint}")
    }
}

fn md5_base64(data: &[u8]) -> String {
    let digest = md5::compute(data);
    B64.encode(digest.0)
}
