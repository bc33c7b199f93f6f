//! A single file upload: negotiate an id, send missing chunks, complete.

use std::collections::BTreeSet;

use cineload_progress_store::{ProgressRecord, ProgressStore, now_millis};
use cineload_protocol::{FileIdentity, InitUploadRequest, SessionState, UploadProgress};
use cineload_transfer::{ChunkPlan, ChunkRange, ChunkReader, SourceFile, TransferError};
use tracing::{debug, info, warn};

use crate::api::{ChunkUpload, UploadApi};
use crate::error::{ApiError, UploadError};
use crate::retry::RetryError;
use crate::signal::{AbortReason, AbortSignal};
use crate::types::UploadConfig;

/// Everything a running session borrows from its owner.
pub struct SessionContext<'a> {
    pub api: &'a dyn UploadApi,
    pub store: &'a dyn ProgressStore,
    pub token: &'a str,
    pub config: &'a UploadConfig,
    pub signal: &'a AbortSignal,
    /// Called with the upload id and a snapshot after every acknowledged
    /// chunk, and once when the chunk loop starts.
    pub on_progress: &'a (dyn Fn(&str, &UploadProgress) + Send + Sync),
}

/// How [`UploadSession::run`] returned without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed { file_url: String },
    Paused,
}

/// Why the inner loop stopped early.
enum Interrupt {
    Aborted(AbortReason),
    Failed(UploadError),
}

impl From<UploadError> for Interrupt {
    fn from(e: UploadError) -> Self {
        Self::Failed(e)
    }
}

impl From<TransferError> for Interrupt {
    fn from(e: TransferError) -> Self {
        Self::Failed(e.into())
    }
}

/// State of one file upload.
///
/// The chunk plan is fixed at creation. `uploaded` only grows while
/// running; it is replaced by the server's view on resume and cleared on
/// cancel or when the server no longer knows the upload.
#[derive(Debug, Clone)]
pub struct UploadSession {
    upload_id: Option<String>,
    identity: FileIdentity,
    plan: ChunkPlan,
    uploaded: BTreeSet<u32>,
    state: SessionState,
    created_at: Option<i64>,
}

impl UploadSession {
    /// Creates a fresh session; the server id is negotiated on first run.
    pub fn new(identity: FileIdentity, chunk_size: u64) -> Result<Self, TransferError> {
        let plan = ChunkPlan::new(identity.size, chunk_size)?;
        Ok(Self {
            upload_id: None,
            identity,
            plan,
            uploaded: BTreeSet::new(),
            state: SessionState::Idle,
            created_at: None,
        })
    }

    /// Rebuilds a paused session from a persisted record.
    ///
    /// Returns `None` if the record was split with a different chunk size.
    pub fn from_record(
        record: &ProgressRecord,
        chunk_size: u64,
    ) -> Result<Option<Self>, TransferError> {
        let plan = ChunkPlan::new(record.file_size, chunk_size)?;
        if !record.is_compatible(chunk_size, plan.count()) {
            return Ok(None);
        }
        let uploaded = record
            .uploaded_chunks
            .iter()
            .copied()
            .filter(|&i| i < plan.count())
            .collect();
        Ok(Some(Self {
            upload_id: Some(record.upload_id.clone()),
            identity: record.identity(),
            plan,
            uploaded,
            state: SessionState::Paused,
            created_at: record.created_at,
        }))
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    pub fn identity(&self) -> &FileIdentity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn total_chunks(&self) -> u32 {
        self.plan.count()
    }

    /// Number of acknowledged chunks.
    pub fn uploaded_chunks(&self) -> u32 {
        self.uploaded.len() as u32
    }

    pub fn uploaded_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.uploaded.iter().copied()
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.plan.bytes_in(&self.uploaded)
    }

    /// 1-based number of the highest acknowledged chunk.
    fn current_chunk(&self) -> u32 {
        self.uploaded.last().map_or(0, |i| i + 1)
    }

    pub fn progress(&self) -> UploadProgress {
        UploadProgress::new(
            self.uploaded_bytes(),
            self.identity.size,
            self.current_chunk(),
            self.plan.count(),
        )
    }

    /// The record persisted for this session, if it has an id.
    pub fn to_record(&self) -> Option<ProgressRecord> {
        let upload_id = self.upload_id.as_ref()?;
        let now = now_millis();
        Some(ProgressRecord {
            upload_id: upload_id.clone(),
            file_name: self.identity.name.clone(),
            file_size: self.identity.size,
            file_type: self.identity.mime_type.clone(),
            uploaded_bytes: self.uploaded_bytes(),
            current_chunk: self.current_chunk(),
            total_chunks: self.plan.count(),
            timestamp: now,
            uploaded_chunks: self.uploaded.iter().copied().collect(),
            chunk_size: Some(self.plan.chunk_size()),
            created_at: Some(self.created_at.unwrap_or(now)),
        })
    }

    /// Runs the session until it completes, pauses, is cancelled or fails.
    ///
    /// A paused or failed session may be run again; it resumes from the
    /// server's view of acknowledged chunks. A transient failure of that
    /// check keeps the persisted record. Pause and cancel take effect up to
    /// the last chunk; the completion request is never interrupted.
    pub async fn run(
        &mut self,
        source: &SourceFile,
        ctx: &SessionContext<'_>,
    ) -> Result<SessionOutcome, UploadError> {
        if matches!(self.state, SessionState::Completed | SessionState::Cancelled) {
            return Err(UploadError::NotPaused);
        }
        self.state = SessionState::Uploading;

        match self.drive(source, ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(Interrupt::Aborted(AbortReason::Pause)) => {
                self.state = SessionState::Paused;
                self.persist(ctx.store);
                info!(
                    upload_id = self.upload_id().unwrap_or("-"),
                    uploaded = self.uploaded.len(),
                    total = self.plan.count(),
                    "upload paused"
                );
                Ok(SessionOutcome::Paused)
            }
            Err(Interrupt::Aborted(AbortReason::Cancel)) => {
                self.cancel(ctx.store);
                Err(UploadError::Cancelled)
            }
            Err(Interrupt::Failed(e)) => {
                self.state = SessionState::Failed;
                if !e.is_auth() {
                    self.persist(ctx.store);
                }
                warn!(
                    upload_id = self.upload_id().unwrap_or("-"),
                    error = %e,
                    "upload failed"
                );
                Err(e)
            }
        }
    }

    /// Discards the session and its persisted record. Terminal.
    pub fn cancel(&mut self, store: &dyn ProgressStore) {
        self.forget(store);
        self.state = SessionState::Cancelled;
        info!(file = %self.identity.name, "upload cancelled");
    }

    async fn drive(
        &mut self,
        source: &SourceFile,
        ctx: &SessionContext<'_>,
    ) -> Result<SessionOutcome, Interrupt> {
        let upload_id = self.resolve_upload_id(ctx).await?;
        (ctx.on_progress)(&upload_id, &self.progress());

        if self.plan.count() > 0 {
            let mut reader = ChunkReader::open(source.path(), self.identity.size).await?;
            let pending: Vec<ChunkRange> = self
                .plan
                .iter()
                .filter(|r| !self.uploaded.contains(&r.index))
                .collect();

            for range in pending {
                if let Some(reason) = ctx.signal.reason() {
                    return Err(Interrupt::Aborted(reason));
                }
                let data = tokio::select! {
                    biased;
                    reason = ctx.signal.aborted() => return Err(Interrupt::Aborted(reason)),
                    r = reader.read_chunk(range) => r?,
                };

                self.send_chunk(&upload_id, range.index, &data, ctx).await?;

                self.uploaded.insert(range.index);
                self.persist(ctx.store);
                let progress = self.progress();
                debug!(
                    upload_id = %upload_id,
                    chunk = range.index,
                    percentage = progress.percentage,
                    "chunk acknowledged"
                );
                (ctx.on_progress)(&upload_id, &progress);
            }
        }

        // Not raced against the abort signal: with every chunk acknowledged
        // the upload always runs to completion.
        let file_url = ctx
            .api
            .complete_upload(ctx.token, &upload_id)
            .await
            .map_err(|e| UploadError::from_api(e, UploadError::Complete))?;

        if let Err(e) = ctx.store.delete(&upload_id) {
            warn!(upload_id = %upload_id, error = %e, "failed to delete progress record");
        }
        self.state = SessionState::Completed;
        info!(upload_id = %upload_id, file_url = %file_url, "upload completed");
        Ok(SessionOutcome::Completed { file_url })
    }

    /// Returns the id to upload under: the known one if the server still
    /// has it, otherwise a freshly negotiated one.
    async fn resolve_upload_id(&mut self, ctx: &SessionContext<'_>) -> Result<String, Interrupt> {
        if let Some(id) = self.upload_id.clone() {
            let timeout = ctx.config.chunk_timeout;
            let checked = ctx
                .config
                .retry
                .run(ctx.signal, |_| {
                    let request = ctx.api.upload_progress(ctx.token, &id);
                    async move {
                        tokio::time::timeout(timeout, request)
                            .await
                            .unwrap_or(Err(ApiError::Timeout))
                    }
                })
                .await;
            match checked {
                Ok(progress) => {
                    self.reconcile(&progress.uploaded_chunk_indices);
                    info!(
                        upload_id = %id,
                        uploaded = self.uploaded.len(),
                        total = self.plan.count(),
                        "resuming upload"
                    );
                    return Ok(id);
                }
                Err(RetryError::Aborted(reason)) => return Err(Interrupt::Aborted(reason)),
                Err(RetryError::Failed {
                    source: ApiError::Unauthorized(msg),
                    ..
                }) => return Err(UploadError::Auth(msg).into()),
                // The server may still hold the upload; keep id and record.
                Err(RetryError::Failed { attempts, source }) if source.is_transient() => {
                    return Err(UploadError::ResumeCheck {
                        upload_id: id,
                        attempts,
                        source,
                    }
                    .into());
                }
                Err(RetryError::Failed { source, .. }) => {
                    warn!(
                        upload_id = %id,
                        error = %source,
                        "server does not know the upload, starting over"
                    );
                    self.forget(ctx.store);
                }
            }
        }

        let req = InitUploadRequest {
            file_name: self.identity.name.clone(),
            file_size: self.identity.size,
            file_type: self.identity.mime_type.clone(),
            chunk_size: self.plan.chunk_size(),
        };
        let id = tokio::select! {
            biased;
            reason = ctx.signal.aborted() => return Err(Interrupt::Aborted(reason)),
            r = ctx.api.init_upload(ctx.token, &req) => {
                r.map_err(|e| UploadError::from_api(e, UploadError::Init))?
            }
        };
        info!(
            upload_id = %id,
            file = %self.identity.name,
            total_chunks = self.plan.count(),
            "upload initialized"
        );
        self.upload_id = Some(id.clone());
        Ok(id)
    }

    /// Sends one chunk under the retry policy and per-chunk timeout.
    async fn send_chunk(
        &self,
        upload_id: &str,
        index: u32,
        data: &[u8],
        ctx: &SessionContext<'_>,
    ) -> Result<(), Interrupt> {
        let total = self.plan.count();
        let chunk = ChunkUpload {
            upload_id,
            chunk_index: index,
            total_chunks: total,
            file_name: &self.identity.name,
            data,
        };
        let timeout = ctx.config.chunk_timeout;

        let result = ctx
            .config
            .retry
            .run(ctx.signal, |_| {
                let request = ctx.api.upload_chunk(ctx.token, chunk);
                async move {
                    tokio::time::timeout(timeout, request)
                        .await
                        .unwrap_or(Err(ApiError::Timeout))
                }
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(RetryError::Aborted(reason)) => Err(Interrupt::Aborted(reason)),
            Err(RetryError::Failed {
                source: ApiError::Unauthorized(msg),
                ..
            }) => Err(UploadError::Auth(msg).into()),
            Err(RetryError::Failed { attempts, source }) => Err(UploadError::Chunk {
                index,
                total,
                attempts,
                source,
            }
            .into()),
        }
    }

    /// Replaces local indices with the server's view.
    fn reconcile(&mut self, server_indices: &[u32]) {
        let total = self.plan.count();
        let server: BTreeSet<u32> = server_indices.iter().copied().filter(|&i| i < total).collect();
        if server != self.uploaded {
            debug!(
                local = self.uploaded.len(),
                server = server.len(),
                "server progress differs from local record"
            );
        }
        self.uploaded = server;
    }

    /// Drops the id, the acknowledged set and the persisted record.
    fn forget(&mut self, store: &dyn ProgressStore) {
        if let Some(id) = self.upload_id.take()
            && let Err(e) = store.delete(&id)
        {
            warn!(upload_id = %id, error = %e, "failed to delete progress record");
        }
        self.uploaded.clear();
        self.created_at = None;
    }

    /// Writes the progress record. Nothing is written before the first
    /// acknowledged chunk. Store failures only cost resumability.
    fn persist(&mut self, store: &dyn ProgressStore) {
        if self.uploaded.is_empty() {
            return;
        }
        let Some(record) = self.to_record() else {
            return;
        };
        self.created_at = record.created_at;
        if let Err(e) = store.put(&record) {
            warn!(upload_id = %record.upload_id, error = %e, "failed to persist upload progress");
        }
    }
}
