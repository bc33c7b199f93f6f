//! Player position records.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{KvBackend, StoreError, now_millis};

pub const KEY_PREFIX: &str = "movie_playback_";

/// Positions older than this are pruned.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A position is only restored when more than this much playback remains.
pub const MIN_REMAINING_SECS: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackPosition {
    /// Seconds into the movie.
    pub current_time: f64,
    /// Movie length in seconds.
    pub duration: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Remembers where a movie was left off.
pub struct PlaybackStore<B> {
    backend: B,
    max_age: Duration,
}

impl<B: KvBackend> PlaybackStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Saves a position. Returns `false` (and stores nothing) when either
    /// value is not positive.
    pub fn save(&self, movie_id: &str, current_time: f64, duration: f64) -> Result<bool, StoreError> {
        if !(current_time > 0.0 && duration > 0.0) {
            return Ok(false);
        }
        let position = PlaybackPosition {
            current_time,
            duration,
            timestamp: now_millis(),
        };
        self.backend
            .set(&playback_key(movie_id), &serde_json::to_string(&position)?)?;
        Ok(true)
    }

    /// Returns the stored position unless it is stale.
    pub fn get(&self, movie_id: &str) -> Result<Option<PlaybackPosition>, StoreError> {
        let key = playback_key(movie_id);
        let Some(raw) = self.backend.get(&key)? else {
            return Ok(None);
        };
        let Ok(position) = serde_json::from_str::<PlaybackPosition>(&raw) else {
            self.backend.remove(&key)?;
            return Ok(None);
        };
        let max_age_ms = i64::try_from(self.max_age.as_millis()).unwrap_or(i64::MAX);
        if now_millis().saturating_sub(position.timestamp) > max_age_ms {
            debug!(movie_id, "pruning stale playback position");
            self.backend.remove(&key)?;
            return Ok(None);
        }
        Ok(Some(position))
    }

    /// Returns the time to seek to, if worth resuming.
    pub fn restore(&self, movie_id: &str) -> Result<Option<f64>, StoreError> {
        Ok(self
            .get(movie_id)?
            .filter(|p| p.current_time < p.duration - MIN_REMAINING_SECS)
            .map(|p| p.current_time))
    }

    /// Forgets the position, e.g. when playback reaches the end.
    pub fn clear(&self, movie_id: &str) -> Result<(), StoreError> {
        self.backend.remove(&playback_key(movie_id))
    }
}

pub fn playback_key(movie_id: &str) -> String {
    format!("{KEY_PREFIX}{movie_id}")
}
