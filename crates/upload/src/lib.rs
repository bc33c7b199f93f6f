//! Resumable chunked video uploads.
//!
//! An [`UploadController`] owns at most one [`UploadSession`] and drives it
//! against an [`UploadApi`] transport. Progress is persisted to a
//! [`ProgressStore`](cineload_progress_store::ProgressStore) after every
//! acknowledged chunk so an interrupted upload can pick up where it left off,
//! even from a new process.

pub mod api;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod http;
pub mod retry;
pub mod session;
pub mod signal;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use api::{ApiFuture, ChunkUpload, UploadApi};
pub use controller::UploadController;
pub use credentials::{CredentialError, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{ApiError, UploadError};
pub use http::HttpUploadApi;
pub use retry::RetryPolicy;
pub use session::{SessionContext, SessionOutcome, UploadSession};
pub use signal::{AbortReason, AbortSignal};
pub use types::{UploadConfig, UploadEvent, UploadOutcome, UploadSnapshot};
