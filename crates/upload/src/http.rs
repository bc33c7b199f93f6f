//! HTTP transport for the upload API.

use cineload_protocol::constants::{self, fields};
use cineload_protocol::{
    ApiResponse, CompleteUploadRequest, CompleteUploadResponse, InitUploadRequest,
    InitUploadResponse, UploadProgressResponse,
};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::{ApiFuture, ChunkUpload, UploadApi};
use crate::error::ApiError;

/// [`UploadApi`] over `reqwest`.
///
/// No client-wide timeout is set: chunk requests are bounded by the
/// session's per-chunk timeout instead.
pub struct HttpUploadApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpUploadApi {
    /// Creates a client for the backend at `base_url` (scheme and host,
    /// optionally with a path prefix).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Checks the HTTP status and the envelope code, returning the envelope
/// of a successful call.
async fn read_envelope<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<ApiResponse<T>, ApiError> {
    let status = resp.status();
    let body = resp.text().await?;

    if status == StatusCode::UNAUTHORIZED {
        let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
            .ok()
            .and_then(|env| env.message)
            .unwrap_or_else(|| "HTTP 401".to_string());
        return Err(ApiError::Unauthorized(message));
    }
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let envelope: ApiResponse<T> =
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
    if envelope.is_auth_error() {
        return Err(ApiError::Unauthorized(envelope.message().to_string()));
    }
    if !envelope.is_ok() {
        return Err(ApiError::Rejected {
            code: envelope.code,
            message: envelope.message().to_string(),
        });
    }
    Ok(envelope)
}

fn require_data<T>(envelope: ApiResponse<T>, what: &str) -> Result<T, ApiError> {
    envelope
        .data
        .ok_or_else(|| ApiError::Decode(format!("{what} response has no data")))
}

impl UploadApi for HttpUploadApi {
    fn init_upload<'a>(
        &'a self,
        token: &'a str,
        req: &'a InitUploadRequest,
    ) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let resp = self
                .http
                .post(self.url(constants::INIT_PATH))
                .bearer_auth(token)
                .json(req)
                .send()
                .await?;
            let envelope = read_envelope::<InitUploadResponse>(resp).await?;
            let upload_id = require_data(envelope, "init")?.upload_id;
            debug!(upload_id = %upload_id, file = %req.file_name, "upload initialized");
            Ok(upload_id)
        })
    }

    fn upload_progress<'a>(
        &'a self,
        token: &'a str,
        upload_id: &'a str,
    ) -> ApiFuture<'a, UploadProgressResponse> {
        Box::pin(async move {
            let resp = self
                .http
                .get(self.url(&constants::progress_path(upload_id)))
                .bearer_auth(token)
                .send()
                .await?;
            let envelope = read_envelope::<UploadProgressResponse>(resp).await?;
            require_data(envelope, "progress")
        })
    }

    fn upload_chunk<'a>(&'a self, token: &'a str, chunk: ChunkUpload<'a>) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let part = Part::bytes(chunk.data.to_vec())
                .file_name(chunk.file_name.to_string())
                .mime_str("application/octet-stream")?;
            let form = Form::new()
                .text(fields::UPLOAD_ID, chunk.upload_id.to_string())
                .text(fields::CHUNK_INDEX, chunk.chunk_index.to_string())
                .text(fields::TOTAL_CHUNKS, chunk.total_chunks.to_string())
                .part(fields::CHUNK, part);

            let resp = self
                .http
                .post(self.url(constants::CHUNK_PATH))
                .bearer_auth(token)
                .multipart(form)
                .send()
                .await?;
            read_envelope::<serde_json::Value>(resp).await?;
            Ok(())
        })
    }

    fn complete_upload<'a>(&'a self, token: &'a str, upload_id: &'a str) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let req = CompleteUploadRequest {
                upload_id: upload_id.to_string(),
            };
            let resp = self
                .http
                .post(self.url(constants::COMPLETE_PATH))
                .bearer_auth(token)
                .json(&req)
                .send()
                .await?;
            let envelope = read_envelope::<CompleteUploadResponse>(resp).await?;
            Ok(require_data(envelope, "complete")?.file_url)
        })
    }
}
