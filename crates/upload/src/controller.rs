//! Upload controller: one session at a time, pause/resume/cancel from any task.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cineload_progress_store::{ProgressRecord, ProgressStore};
use cineload_protocol::{FileIdentity, SessionState, UploadProgress};
use cineload_transfer::{SourceFile, validate_video_file};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::UploadApi;
use crate::credentials::CredentialStore;
use crate::error::UploadError;
use crate::session::{SessionContext, SessionOutcome, UploadSession};
use crate::signal::{AbortReason, AbortSignal};
use crate::types::{UploadConfig, UploadEvent, UploadOutcome, UploadSnapshot};

/// A paused session together with the file it reads from.
struct Parked {
    session: UploadSession,
    source: SourceFile,
}

struct Inner {
    state: SessionState,
    /// Set while a session is running.
    signal: Option<Arc<AbortSignal>>,
    parked: Option<Parked>,
    /// A persisted upload found by `resume()` without a file to go with it.
    recovered: Option<ProgressRecord>,
    file_name: Option<String>,
    upload_id: Option<String>,
    progress: Option<UploadProgress>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            signal: None,
            parked: None,
            recovered: None,
            file_name: None,
            upload_id: None,
            progress: None,
        }
    }

    fn has_session(&self) -> bool {
        self.parked.is_some() || self.recovered.is_some()
    }

    fn begin(&mut self, session: &UploadSession, signal: Arc<AbortSignal>) {
        self.state = SessionState::Uploading;
        self.signal = Some(signal);
        self.recovered = None;
        self.file_name = Some(session.identity().name.clone());
        self.upload_id = session.upload_id().map(str::to_string);
        self.progress = Some(session.progress());
    }
}

/// Drives uploads of one file at a time.
///
/// `start` and `resume` run the upload on the calling task; `pause` and
/// `cancel` are synchronous and may be called from any other task while
/// they await. Share the controller through an `Arc`.
pub struct UploadController {
    api: Arc<dyn UploadApi>,
    store: Arc<dyn ProgressStore>,
    credentials: Arc<dyn CredentialStore>,
    config: UploadConfig,
    inner: Mutex<Inner>,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
}

impl UploadController {
    pub fn new(
        api: Arc<dyn UploadApi>,
        store: Arc<dyn ProgressStore>,
        credentials: Arc<dyn CredentialStore>,
        config: UploadConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            api,
            store,
            credentials,
            config,
            inner: Mutex::new(Inner::new()),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Events are dropped rather than awaited when the channel is full.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Uploads `source`, resuming earlier progress for the same file
    /// (name and size) when there is any.
    ///
    /// Returns once the upload completes or is paused.
    pub async fn start(&self, source: SourceFile) -> Result<UploadOutcome, UploadError> {
        let identity = source.identity().clone();
        validate_video_file(
            &identity.name,
            identity.size,
            &identity.mime_type,
            self.config.max_file_size,
        )?;
        let token = self.token()?;

        let (session, signal) = {
            let mut inner = self.lock();
            if inner.state == SessionState::Uploading {
                warn!(file = %identity.name, "start rejected: an upload is already running");
                return Err(UploadError::AlreadyInProgress);
            }
            let session = self.select_session(&mut inner, &identity)?;
            let signal = Arc::new(AbortSignal::new());
            inner.begin(&session, signal.clone());
            (session, signal)
        };

        self.drive(session, source, token, signal).await
    }

    /// Requests the running upload to pause. The pending `start`/`resume`
    /// call returns [`UploadOutcome::Paused`].
    pub fn pause(&self) -> Result<(), UploadError> {
        let inner = self.lock();
        match (&inner.state, &inner.signal) {
            (SessionState::Uploading, Some(signal)) => {
                signal.abort(AbortReason::Pause);
                info!(file = inner.file_name.as_deref().unwrap_or("-"), "pause requested");
                Ok(())
            }
            _ if inner.has_session() => {
                warn!(state = ?inner.state, "pause ignored: upload is not running");
                Err(UploadError::NotUploading)
            }
            _ => {
                warn!("pause ignored: no active upload");
                Err(UploadError::NoActiveUpload)
            }
        }
    }

    /// Continues a paused upload.
    ///
    /// Without a paused session in memory (e.g. after a restart) the most
    /// recent persisted upload is looked up and reported as
    /// [`UploadError::FileReferenceLost`]; passing the same file to
    /// [`start`](Self::start) then picks it up.
    pub async fn resume(&self) -> Result<UploadOutcome, UploadError> {
        let token = self.credentials.token().filter(|t| !t.is_empty());
        let resumed = {
            let mut inner = self.lock();
            if inner.state == SessionState::Uploading {
                warn!("resume ignored: upload is already running");
                return Err(UploadError::NotPaused);
            }
            if inner.parked.is_some() && token.is_none() {
                return Err(UploadError::NoCredential);
            }
            inner.parked.take().map(|parked| {
                let signal = Arc::new(AbortSignal::new());
                inner.begin(&parked.session, signal.clone());
                (parked, signal)
            })
        };

        match (resumed, token) {
            (Some((parked, signal)), Some(token)) => {
                info!(upload_id = parked.session.upload_id().unwrap_or("-"), "resuming upload");
                self.drive(parked.session, parked.source, token, signal).await
            }
            _ => self.recover(),
        }
    }

    /// Cancels the running or paused upload and deletes its progress.
    pub fn cancel(&self) -> Result<(), UploadError> {
        let mut inner = self.lock();
        if inner.state == SessionState::Uploading
            && let Some(signal) = &inner.signal
        {
            signal.abort(AbortReason::Cancel);
            info!(file = inner.file_name.as_deref().unwrap_or("-"), "cancel requested");
            return Ok(());
        }

        let parked = inner.parked.take();
        let recovered = inner.recovered.take();
        if parked.is_none() && recovered.is_none() {
            warn!("cancel ignored: no active upload");
            return Err(UploadError::NoActiveUpload);
        }
        if let Some(mut parked) = parked {
            parked.session.cancel(self.store.as_ref());
        }
        if let Some(record) = recovered
            && let Err(e) = self.store.delete(&record.upload_id)
        {
            warn!(upload_id = %record.upload_id, error = %e, "failed to delete progress record");
        }
        inner.state = SessionState::Cancelled;
        inner.upload_id = None;
        inner.progress = None;
        drop(inner);

        self.emit(UploadEvent::Cancelled);
        Ok(())
    }

    /// Current state and the last reported progress.
    pub fn snapshot(&self) -> UploadSnapshot {
        let inner = self.lock();
        UploadSnapshot {
            state: inner.state,
            file_name: inner.file_name.clone(),
            upload_id: inner.upload_id.clone(),
            progress: inner.progress.clone(),
        }
    }

    /// Resumable uploads on record, newest first.
    pub fn pending_uploads(&self) -> Result<Vec<ProgressRecord>, UploadError> {
        Ok(self.store.list_pending()?)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn token(&self) -> Result<String, UploadError> {
        self.credentials
            .token()
            .filter(|t| !t.is_empty())
            .ok_or(UploadError::NoCredential)
    }

    /// Picks the session to run for `identity`: the paused one, the one
    /// recovered by `resume()`, a persisted one, or a new one.
    fn select_session(
        &self,
        inner: &mut Inner,
        identity: &FileIdentity,
    ) -> Result<UploadSession, UploadError> {
        if let Some(parked) = inner.parked.take() {
            if parked.session.identity().matches(&identity.name, identity.size) {
                return Ok(parked.session);
            }
            debug!(
                paused = %parked.session.identity().name,
                "starting another file; the paused upload stays on record"
            );
        }

        if let Some(record) = inner.recovered.take()
            && record.identity().matches(&identity.name, identity.size)
            && let Some(session) = UploadSession::from_record(&record, self.config.chunk_size)?
        {
            return Ok(session);
        }

        match self.store.find_by_file_identity(&identity.name, identity.size) {
            Ok(Some(record)) => {
                match UploadSession::from_record(&record, self.config.chunk_size)? {
                    Some(session) => {
                        info!(
                            upload_id = %record.upload_id,
                            uploaded = record.uploaded_chunks.len(),
                            total = record.total_chunks,
                            "found unfinished upload for this file"
                        );
                        return Ok(session);
                    }
                    None => warn!(
                        upload_id = %record.upload_id,
                        "ignoring progress record with a different chunk size"
                    ),
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "progress lookup failed"),
        }

        Ok(UploadSession::new(identity.clone(), self.config.chunk_size)?)
    }

    async fn drive(
        &self,
        mut session: UploadSession,
        source: SourceFile,
        token: String,
        signal: Arc<AbortSignal>,
    ) -> Result<UploadOutcome, UploadError> {
        self.emit(UploadEvent::Started {
            file_name: session.identity().name.clone(),
            file_size: session.identity().size,
            total_chunks: session.total_chunks(),
            resumed_chunks: session.uploaded_chunks(),
        });

        let on_progress = |upload_id: &str, progress: &UploadProgress| {
            {
                let mut inner = self.lock();
                inner.upload_id = Some(upload_id.to_string());
                inner.progress = Some(progress.clone());
            }
            self.emit(UploadEvent::Progress(progress.clone()));
        };
        let ctx = SessionContext {
            api: self.api.as_ref(),
            store: self.store.as_ref(),
            token: &token,
            config: &self.config,
            signal: &signal,
            on_progress: &on_progress,
        };

        let result = session.run(&source, &ctx).await;
        self.finish(session, source, result)
    }

    fn finish(
        &self,
        session: UploadSession,
        source: SourceFile,
        result: Result<SessionOutcome, UploadError>,
    ) -> Result<UploadOutcome, UploadError> {
        let mut inner = self.lock();
        inner.signal = None;
        inner.upload_id = session.upload_id().map(str::to_string);

        match result {
            Ok(SessionOutcome::Completed { file_url }) => {
                inner.state = SessionState::Completed;
                inner.progress = Some(session.progress());
                drop(inner);

                let upload_id = session.upload_id().unwrap_or_default().to_string();
                self.emit(UploadEvent::Completed {
                    upload_id: upload_id.clone(),
                    file_url: file_url.clone(),
                });
                Ok(UploadOutcome::Completed { upload_id, file_url })
            }
            Ok(SessionOutcome::Paused) => {
                inner.state = SessionState::Paused;
                let upload_id = session.upload_id().map(str::to_string);
                let uploaded_chunks = session.uploaded_chunks();
                let total_chunks = session.total_chunks();
                inner.parked = Some(Parked { session, source });
                drop(inner);

                self.emit(UploadEvent::Paused {
                    upload_id: upload_id.clone(),
                    uploaded_chunks,
                    total_chunks,
                });
                Ok(UploadOutcome::Paused {
                    upload_id,
                    uploaded_chunks,
                    total_chunks,
                })
            }
            Err(UploadError::Cancelled) => {
                inner.state = SessionState::Cancelled;
                inner.progress = None;
                drop(inner);

                self.emit(UploadEvent::Cancelled);
                Err(UploadError::Cancelled)
            }
            Err(e) => {
                inner.state = SessionState::Failed;
                drop(inner);

                if e.is_auth() {
                    self.clear_credentials();
                }
                error!(file = %session.identity().name, error = %e, "upload failed");
                self.emit(UploadEvent::Failed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Looks up a persisted upload to report after a restart.
    fn recover(&self) -> Result<UploadOutcome, UploadError> {
        let recovered = self.lock().recovered.clone();
        let record = match recovered {
            Some(record) => Some(record),
            None => self.store.list_pending()?.into_iter().next(),
        };
        let Some(record) = record else {
            warn!("resume ignored: no paused upload");
            return Err(UploadError::NoActiveUpload);
        };

        warn!(
            upload_id = %record.upload_id,
            file = %record.file_name,
            "paused upload found but its file is not available; select the same file again"
        );
        {
            let mut inner = self.lock();
            inner.state = SessionState::Paused;
            inner.file_name = Some(record.file_name.clone());
            inner.upload_id = Some(record.upload_id.clone());
            inner.progress = Some(UploadProgress::new(
                record.uploaded_bytes,
                record.file_size,
                record.current_chunk,
                record.total_chunks,
            ));
            inner.recovered = Some(record.clone());
        }
        Err(UploadError::FileReferenceLost {
            upload_id: record.upload_id,
            file_name: record.file_name,
            uploaded_chunks: record.uploaded_chunks.len() as u32,
            total_chunks: record.total_chunks,
        })
    }

    fn clear_credentials(&self) {
        match self.credentials.clear() {
            Ok(()) => info!("login expired; stored credentials cleared"),
            Err(e) => warn!(error = %e, "failed to clear credentials"),
        }
    }

    fn emit(&self, event: UploadEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            debug!(error = %e, "upload event dropped");
        }
    }
}
