//! Upload error types.

use cineload_progress_store::StoreError;
use cineload_transfer::{TransferError, ValidationError};

/// Failure of a single API call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// HTTP 401, envelope code 401, or an auth-related message.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The envelope carried a non-success code.
    #[error("server rejected request (code {code}): {message}")]
    Rejected { code: i32, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Returns `true` for failures worth retrying: server-side errors,
    /// network errors and timeouts.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500,
            Self::Rejected { code, .. } => *code >= 500,
            Self::Network(_) | Self::Timeout => true,
            Self::Unauthorized(_) | Self::Decode(_) => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Errors surfaced by sessions and the controller.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The login is missing or expired; stored credentials have been cleared.
    #[error("authentication required: {0}")]
    Auth(String),

    #[error("not logged in")]
    NoCredential,

    #[error("invalid file: {0}")]
    InvalidFile(#[from] ValidationError),

    #[error("an upload is already in progress")]
    AlreadyInProgress,

    #[error("failed to initialize upload: {0}")]
    Init(ApiError),

    /// The server could not be asked about a known upload. Its progress
    /// record is kept so a later attempt can resume.
    #[error("failed to check upload {upload_id} after {attempts} attempt(s): {source}")]
    ResumeCheck {
        upload_id: String,
        attempts: u32,
        source: ApiError,
    },

    #[error("chunk {index} of {total} failed after {attempts} attempt(s): {source}")]
    Chunk {
        index: u32,
        total: u32,
        attempts: u32,
        source: ApiError,
    },

    #[error("failed to complete upload: {0}")]
    Complete(ApiError),

    #[error("upload cancelled")]
    Cancelled,

    /// A paused upload was found but its file is no longer held; the caller
    /// has to select the same file again.
    #[error(
        "upload {upload_id} of {file_name} is {uploaded_chunks}/{total_chunks} done; select the same file again to resume"
    )]
    FileReferenceLost {
        upload_id: String,
        file_name: String,
        uploaded_chunks: u32,
        total_chunks: u32,
    },

    #[error("no active upload")]
    NoActiveUpload,

    #[error("upload is not running")]
    NotUploading,

    #[error("upload is not paused")]
    NotPaused,

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl UploadError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Maps an API failure outside the chunk loop, routing auth failures to
    /// [`UploadError::Auth`].
    pub(crate) fn from_api(e: ApiError, wrap: fn(ApiError) -> Self) -> Self {
        match e {
            ApiError::Unauthorized(msg) => Self::Auth(msg),
            other => wrap(other),
        }
    }
}
