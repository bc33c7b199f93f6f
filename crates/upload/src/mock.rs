//! In-memory upload server for session and controller tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use cineload_protocol::{InitUploadRequest, UploadProgressResponse};

use crate::api::{ApiFuture, ChunkUpload, UploadApi};
use crate::error::ApiError;

/// Scripted answer to one call. Unscripted calls succeed.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Ok,
    Fail(ApiError),
    /// Succeeds after the given time; the server-side effect happens at once.
    Delay(Duration),
    /// Never resolves; used to hold a request in flight.
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Init(InitUploadRequest),
    Progress(String),
    Chunk {
        upload_id: String,
        index: u32,
        total: u32,
        data: Vec<u8>,
    },
    Complete(String),
}

#[derive(Default)]
pub(crate) struct MockApi {
    next_id: AtomicU32,
    calls: Mutex<Vec<Call>>,
    init_replies: Mutex<VecDeque<Reply>>,
    progress_replies: Mutex<VecDeque<Reply>>,
    chunk_replies: Mutex<VecDeque<Reply>>,
    complete_replies: Mutex<VecDeque<Reply>>,
    /// Acknowledged chunk indices per upload id.
    server: Mutex<HashMap<String, BTreeSet<u32>>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_init(&self, replies: impl IntoIterator<Item = Reply>) {
        self.init_replies.lock().unwrap().extend(replies);
    }

    pub fn script_progress(&self, replies: impl IntoIterator<Item = Reply>) {
        self.progress_replies.lock().unwrap().extend(replies);
    }

    pub fn script_chunks(&self, replies: impl IntoIterator<Item = Reply>) {
        self.chunk_replies.lock().unwrap().extend(replies);
    }

    pub fn script_complete(&self, replies: impl IntoIterator<Item = Reply>) {
        self.complete_replies.lock().unwrap().extend(replies);
    }

    /// Registers an upload the server already knows about.
    pub fn seed_upload(&self, upload_id: &str, acknowledged: impl IntoIterator<Item = u32>) {
        self.server
            .lock()
            .unwrap()
            .insert(upload_id.to_string(), acknowledged.into_iter().collect());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn init_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Init(_)))
            .count()
    }

    pub fn progress_checks(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Progress(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Indices of all chunk requests, retries included, in call order.
    pub fn chunk_indices(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Chunk { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }

    pub fn chunk_data(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Chunk { data, .. } => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn completed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Complete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn acknowledged(&self, upload_id: &str) -> Vec<u32> {
        self.server
            .lock()
            .unwrap()
            .get(upload_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Yields until `done` holds.
    pub async fn wait_until(&self, done: impl Fn(&Self) -> bool) {
        while !done(self) {
            tokio::task::yield_now().await;
        }
    }

    /// Yields until at least `n` chunk requests have been made.
    pub async fn wait_for_chunk_calls(&self, n: usize) {
        self.wait_until(|api| api.chunk_indices().len() >= n).await;
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn next_reply(queue: &Mutex<VecDeque<Reply>>) -> Reply {
    queue.lock().unwrap().pop_front().unwrap_or(Reply::Ok)
}

/// Turns a scripted reply into a response. `ok` runs at call time so the
/// server-side effect is visible before the response resolves.
fn answer<'a, T: Send + 'a>(
    reply: Reply,
    ok: impl FnOnce() -> Result<T, ApiError>,
) -> ApiFuture<'a, T> {
    match reply {
        Reply::Ok => {
            let result = ok();
            Box::pin(async move { result })
        }
        Reply::Delay(delay) => {
            let result = ok();
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                result
            })
        }
        Reply::Fail(e) => Box::pin(async move { Err(e) }),
        Reply::Hang => Box::pin(std::future::pending()),
    }
}

impl UploadApi for MockApi {
    fn init_upload<'a>(
        &'a self,
        _token: &'a str,
        req: &'a InitUploadRequest,
    ) -> ApiFuture<'a, String> {
        self.record(Call::Init(req.clone()));
        answer(next_reply(&self.init_replies), || {
            let id = format!("u{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            self.seed_upload(&id, []);
            Ok(id)
        })
    }

    fn upload_progress<'a>(
        &'a self,
        _token: &'a str,
        upload_id: &'a str,
    ) -> ApiFuture<'a, UploadProgressResponse> {
        self.record(Call::Progress(upload_id.to_string()));
        answer(next_reply(&self.progress_replies), || {
            match self.server.lock().unwrap().get(upload_id) {
                Some(indices) => Ok(UploadProgressResponse {
                    uploaded_chunk_indices: indices.iter().copied().collect(),
                    total_chunks: None,
                    status: None,
                }),
                None => Err(ApiError::Rejected {
                    code: 404,
                    message: "upload not found".into(),
                }),
            }
        })
    }

    fn upload_chunk<'a>(&'a self, _token: &'a str, chunk: ChunkUpload<'a>) -> ApiFuture<'a, ()> {
        self.record(Call::Chunk {
            upload_id: chunk.upload_id.to_string(),
            index: chunk.chunk_index,
            total: chunk.total_chunks,
            data: chunk.data.to_vec(),
        });
        answer(next_reply(&self.chunk_replies), || {
            self.server
                .lock()
                .unwrap()
                .entry(chunk.upload_id.to_string())
                .or_default()
                .insert(chunk.chunk_index);
            Ok(())
        })
    }

    fn complete_upload<'a>(&'a self, _token: &'a str, upload_id: &'a str) -> ApiFuture<'a, String> {
        self.record(Call::Complete(upload_id.to_string()));
        answer(next_reply(&self.complete_replies), || {
            Ok(format!("https://cdn.example.com/videos/{upload_id}.mp4"))
        })
    }
}
