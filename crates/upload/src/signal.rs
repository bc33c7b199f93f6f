//! Cooperative pause/cancel signal for a running session.

use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

/// Why a running session was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Pause,
    Cancel,
}

/// A [`CancellationToken`] paired with the reason it was triggered.
///
/// The session races every network call, chunk read and backoff sleep
/// against [`AbortSignal::aborted`]; dropping the losing future is what
/// aborts an in-flight request.
#[derive(Debug, Default)]
pub struct AbortSignal {
    token: CancellationToken,
    reason: Mutex<Option<AbortReason>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the signal. A cancel overrides an earlier pause; a pause
    /// never downgrades a cancel.
    pub fn abort(&self, reason: AbortReason) {
        {
            let mut current = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
            if *current != Some(AbortReason::Cancel) {
                *current = Some(reason);
            }
        }
        self.token.cancel();
    }

    /// Returns the reason if the signal has fired.
    pub fn reason(&self) -> Option<AbortReason> {
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal fires.
    pub async fn aborted(&self) -> AbortReason {
        self.token.cancelled().await;
        self.reason().unwrap_or(AbortReason::Cancel)
    }
}
