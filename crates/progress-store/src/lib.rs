//! Durable client-side state for the upload flow.
//!
//! A small string key-value layer ([`KvBackend`]) with a directory-backed and
//! an in-memory implementation, and two typed stores on top of it:
//!
//! - [`ProgressStore`]: resumable upload records keyed `upload_progress_<id>`,
//!   findable by file identity, expiring after 24 hours.
//! - [`PlaybackStore`]: player positions keyed `movie_playback_<id>`,
//!   expiring after 7 days.
//!
//! Expiry is enforced lazily on read; there is no background sweep.

pub mod error;
pub mod kv;
pub mod playback;
pub mod progress;

pub use error::StoreError;
pub use kv::{FileBackend, KvBackend, MemoryBackend};
pub use playback::{PlaybackPosition, PlaybackStore};
pub use progress::{KvProgressStore, ProgressRecord, ProgressStore};

/// Milliseconds since the Unix epoch, the timestamp unit of all records.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
