use serde::{Deserialize, Serialize};

/// Heuristic identity of a source file: name, byte size and MIME type.
///
/// Two files with the same name and size are treated as the same upload.
/// The MIME type is carried along for the init request but is not part of
/// the match key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIdentity {
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
}

impl FileIdentity {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
        }
    }

    /// Returns `true` if `name` and `size` match.
    pub fn matches(&self, name: &str, size: u64) -> bool {
        self.name == name && self.size == size
    }
}

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Uploading,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

/// Progress snapshot handed to callers after every acknowledged chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    /// Acknowledged bytes.
    pub uploaded: u64,
    /// File size in bytes.
    pub total: u64,
    /// `round(uploaded / total * 100)`; 100 for an empty file.
    pub percentage: u8,
    /// 1-based number of the last acknowledged chunk (0 before the first).
    pub current_chunk: u32,
    pub total_chunks: u32,
}

impl UploadProgress {
    pub fn new(uploaded: u64, total: u64, current_chunk: u32, total_chunks: u32) -> Self {
        Self {
            uploaded,
            total,
            percentage: percentage(uploaded, total),
            current_chunk,
            total_chunks,
        }
    }
}

/// Rounded percentage of `uploaded` over `total`, clamped to 100.
pub fn percentage(uploaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (uploaded as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}
