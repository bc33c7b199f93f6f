//! Endpoint paths, multipart field names and envelope codes.

/// `POST`: negotiates a new upload identifier.
pub const INIT_PATH: &str = "/api/upload/init";

/// `POST`: multipart chunk body.
pub const CHUNK_PATH: &str = "/api/upload/chunk";

/// `POST`: asks the server to merge all chunks.
pub const COMPLETE_PATH: &str = "/api/upload/complete";

/// `GET` prefix; the upload id is appended as the last path segment.
pub const PROGRESS_PATH: &str = "/api/upload/progress";

/// Returns the resume-check path for an upload.
pub fn progress_path(upload_id: &str) -> String {
    format!("{PROGRESS_PATH}/{upload_id}")
}

/// Multipart field names of a chunk request.
pub mod fields {
    pub const UPLOAD_ID: &str = "uploadId";
    pub const CHUNK: &str = "chunk";
    pub const CHUNK_INDEX: &str = "chunkIndex";
    pub const TOTAL_CHUNKS: &str = "totalChunks";
}

/// Envelope code for success.
pub const CODE_OK: i32 = 200;

/// Envelope code the backend uses for a missing or invalid token.
pub const CODE_UNAUTHORIZED: i32 = 401;

/// Message fragments the backend puts in auth-related error messages.
///
/// Some endpoints answer with a generic error code but an auth message,
/// so the message has to be inspected as well.
pub const AUTH_MESSAGE_MARKERS: &[&str] = &["未登录", "token", "Token", "401"];
