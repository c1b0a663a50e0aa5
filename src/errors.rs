//! Error types for the remote storage layer.
//!
//! Every fallible storage operation returns `StorageResult` instead of
//! swallowing remote-store failures. Logging happens at the call site as a
//! side effect; the error itself always reaches the caller.

use thiserror::Error;

/// Failure categories for object store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Endpoint unreachable, TLS negotiation failed, or the operation timed
    /// out. Fatal at construction time, retryable by the caller afterwards.
    #[error("cannot reach object store: {0}")]
    Connection(String),

    /// Invalid credentials or insufficient permission on the bucket.
    /// Never worth retrying.
    #[error("object store denied access: {0}")]
    Authorization(String),

    /// The configured bucket does not exist at call time.
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),

    /// The requested object does not exist.
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },

    /// The object path failed local validation; no network I/O was attempted.
    #[error("invalid object path: {0}")]
    InvalidObjectPath(String),

    /// Partial upload/download or any other remote failure. Retryable with
    /// caller-controlled backoff.
    #[error("transfer failed: {0}")]
    Transfer(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
