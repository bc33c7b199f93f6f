//! Resumable upload records.

use std::time::Duration;

use cineload_protocol::FileIdentity;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{KvBackend, StoreError, now_millis};

/// Key prefix of upload progress entries.
pub const KEY_PREFIX: &str = "upload_progress_";

/// Records older than this are stale.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Persisted state of an unfinished upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub upload_id: String,
    pub file_name: String,
    pub file_size: u64,
    #[serde(default)]
    pub file_type: String,
    pub uploaded_bytes: u64,
    /// 1-based number of the last acknowledged chunk.
    pub current_chunk: u32,
    pub total_chunks: u32,
    /// Last update, epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub uploaded_chunks: Vec<u32>,
    /// Absent in records written before chunk sizes were tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl ProgressRecord {
    /// Builds a record stamped with the current time.
    pub fn new(
        upload_id: impl Into<String>,
        identity: &FileIdentity,
        chunk_size: u64,
        total_chunks: u32,
    ) -> Self {
        let now = now_millis();
        Self {
            upload_id: upload_id.into(),
            file_name: identity.name.clone(),
            file_size: identity.size,
            file_type: identity.mime_type.clone(),
            uploaded_bytes: 0,
            current_chunk: 0,
            total_chunks,
            timestamp: now,
            uploaded_chunks: Vec::new(),
            chunk_size: Some(chunk_size),
            created_at: Some(now),
        }
    }

    pub fn key(&self) -> String {
        record_key(&self.upload_id)
    }

    pub fn identity(&self) -> FileIdentity {
        FileIdentity::new(&self.file_name, self.file_size, &self.file_type)
    }

    /// Returns `true` if the record was last updated more than `max_age` before `now_ms`.
    pub fn is_expired(&self, now_ms: i64, max_age: Duration) -> bool {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.timestamp) > max_age_ms
    }

    /// Returns `true` if the record was split the same way as a plan with
    /// `chunk_size` and `total_chunks`.
    ///
    /// Legacy records without a chunk size are accepted when the chunk
    /// count agrees.
    pub fn is_compatible(&self, chunk_size: u64, total_chunks: u32) -> bool {
        match self.chunk_size {
            Some(size) => size == chunk_size && self.total_chunks == total_chunks,
            None => self.total_chunks == total_chunks,
        }
    }
}

/// Returns the backend key for an upload id.
pub fn record_key(upload_id: &str) -> String {
    format!("{KEY_PREFIX}{upload_id}")
}

/// Durable storage of [`ProgressRecord`]s.
pub trait ProgressStore: Send + Sync {
    /// Inserts or replaces the record for `record.upload_id`.
    fn put(&self, record: &ProgressRecord) -> Result<(), StoreError>;

    /// Returns the record for `upload_id` unless missing or expired.
    fn get(&self, upload_id: &str) -> Result<Option<ProgressRecord>, StoreError>;

    /// Finds a live record whose file name and size match exactly.
    ///
    /// Several matches resolve to the most recently updated one, ties to the
    /// greatest upload id.
    fn find_by_file_identity(
        &self,
        file_name: &str,
        file_size: u64,
    ) -> Result<Option<ProgressRecord>, StoreError>;

    fn delete(&self, upload_id: &str) -> Result<(), StoreError>;

    /// All live records, newest first.
    fn list_pending(&self) -> Result<Vec<ProgressRecord>, StoreError>;
}

/// [`ProgressStore`] over a [`KvBackend`], with lazy expiry.
pub struct KvProgressStore<B> {
    backend: B,
    max_age: Duration,
}

impl<B: KvBackend> KvProgressStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_max_age(backend, DEFAULT_MAX_AGE)
    }

    pub fn with_max_age(backend: B, max_age: Duration) -> Self {
        Self { backend, max_age }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Loads one entry, dropping it if expired or unreadable.
    fn load(&self, key: &str, now_ms: i64) -> Result<Option<ProgressRecord>, StoreError> {
        let Some(raw) = self.backend.get(key)? else {
            return Ok(None);
        };
        let record: ProgressRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(key, error = %e, "discarding unreadable progress record");
                self.backend.remove(key)?;
                return Ok(None);
            }
        };
        if record.is_expired(now_ms, self.max_age) {
            debug!(upload_id = %record.upload_id, "discarding expired progress record");
            self.backend.remove(key)?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    fn load_all(&self) -> Result<Vec<ProgressRecord>, StoreError> {
        let now = now_millis();
        let mut records = Vec::new();
        for key in self.backend.keys()? {
            if !key.starts_with(KEY_PREFIX) {
                continue;
            }
            if let Some(record) = self.load(&key, now)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

impl<B: KvBackend> ProgressStore for KvProgressStore<B> {
    fn put(&self, record: &ProgressRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        self.backend.set(&record.key(), &json)
    }

    fn get(&self, upload_id: &str) -> Result<Option<ProgressRecord>, StoreError> {
        self.load(&record_key(upload_id), now_millis())
    }

    fn find_by_file_identity(
        &self,
        file_name: &str,
        file_size: u64,
    ) -> Result<Option<ProgressRecord>, StoreError> {
        let found = self
            .load_all()?
            .into_iter()
            .filter(|r| r.file_name == file_name && r.file_size == file_size)
            .max_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.upload_id.cmp(&b.upload_id))
            });
        Ok(found)
    }

    fn delete(&self, upload_id: &str) -> Result<(), StoreError> {
        self.backend.remove(&record_key(upload_id))
    }

    fn list_pending(&self) -> Result<Vec<ProgressRecord>, StoreError> {
        let mut records = self.load_all()?;
        records.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.upload_id.cmp(&a.upload_id))
        });
        Ok(records)
    }
}
