//! Wire types for the chunked video upload API.
//!
//! Every JSON response from the catalog backend is wrapped in the
//! `{code, data, message}` envelope; see [`envelope::ApiResponse`].

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use envelope::ApiResponse;
pub use messages::{
    CompleteUploadRequest, CompleteUploadResponse, InitUploadRequest, InitUploadResponse,
    UploadProgressResponse,
};
pub use types::{FileIdentity, SessionState, UploadProgress};
