//! Upload API transport trait.
//!
//! [`HttpUploadApi`](crate::http::HttpUploadApi) implements it over HTTP;
//! tests substitute in-memory servers. Envelope handling (success code,
//! auth detection) is the implementation's job: callers only see typed
//! results and [`ApiError`]s.

use std::future::Future;
use std::pin::Pin;

use cineload_protocol::{InitUploadRequest, UploadProgressResponse};

use crate::error::ApiError;

pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// One chunk request.
#[derive(Debug, Clone, Copy)]
pub struct ChunkUpload<'a> {
    pub upload_id: &'a str,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Sent as the multipart file name of the chunk part.
    pub file_name: &'a str,
    pub data: &'a [u8],
}

/// The four calls of the chunked upload protocol. Every call carries the
/// caller's bearer token.
pub trait UploadApi: Send + Sync {
    /// Negotiates a new upload and returns its id.
    fn init_upload<'a>(&'a self, token: &'a str, req: &'a InitUploadRequest)
    -> ApiFuture<'a, String>;

    /// Asks which chunks of `upload_id` the server already holds.
    fn upload_progress<'a>(
        &'a self,
        token: &'a str,
        upload_id: &'a str,
    ) -> ApiFuture<'a, UploadProgressResponse>;

    fn upload_chunk<'a>(&'a self, token: &'a str, chunk: ChunkUpload<'a>) -> ApiFuture<'a, ()>;

    /// Asks the server to merge all chunks; returns the file URL.
    fn complete_upload<'a>(&'a self, token: &'a str, upload_id: &'a str) -> ApiFuture<'a, String>;
}
