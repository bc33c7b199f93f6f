//! Upload configuration, outcomes and events.

use std::time::Duration;

use cineload_protocol::{SessionState, UploadProgress};
use serde::Serialize;

use crate::retry::RetryPolicy;

/// Tunables of the upload flow.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadConfig {
    /// Bytes per chunk; fixed for the lifetime of a session.
    pub chunk_size: u64,
    /// Upper bound for a single chunk request.
    pub chunk_timeout: Duration,
    pub retry: RetryPolicy,
    /// Persisted progress older than this is discarded.
    pub max_record_age: Duration,
    /// Largest accepted source file.
    pub max_file_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: cineload_transfer::DEFAULT_CHUNK_SIZE,
            chunk_timeout: Duration::from_secs(30 * 60),
            retry: RetryPolicy::default(),
            max_record_age: cineload_progress_store::progress::DEFAULT_MAX_AGE,
            max_file_size: cineload_transfer::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// How a `start` or `resume` call ended, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The server merged all chunks.
    Completed { upload_id: String, file_url: String },
    /// Stopped by `pause()`. `upload_id` is `None` if the pause landed
    /// before the server assigned one.
    Paused {
        upload_id: Option<String>,
        uploaded_chunks: u32,
        total_chunks: u32,
    },
}

/// Events emitted by the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum UploadEvent {
    Started {
        file_name: String,
        file_size: u64,
        total_chunks: u32,
        /// Chunks already acknowledged by an earlier attempt, as far as
        /// known locally.
        resumed_chunks: u32,
    },
    Progress(UploadProgress),
    Paused {
        upload_id: Option<String>,
        uploaded_chunks: u32,
        total_chunks: u32,
    },
    Completed {
        upload_id: String,
        file_url: String,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSnapshot {
    pub state: SessionState,
    pub file_name: Option<String>,
    pub upload_id: Option<String>,
    pub progress: Option<UploadProgress>,
}
