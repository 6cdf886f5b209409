//! Shared download throttle
//!
//! A throttle is a counting semaphore owned by the caller and handed to any
//! number of downloaders. Each operation holds one permit for its duration.
//! The permit is returned when the guard drops, on success, failure or
//! cancellation alike.

use crate::error::{FeedError, FeedResult};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Counting semaphore limiting concurrent downloads
#[derive(Debug, Clone)]
pub struct Throttle {
    semaphore: Arc<Semaphore>,
}

/// One held throttle permit
#[derive(Debug)]
pub struct ThrottlePermit {
    _permit: OwnedSemaphorePermit,
}

impl Throttle {
    /// Create a throttle with `permits` slots. Zero is allowed; operations
    /// then wait until [`Throttle::release`] adds a slot.
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Add `permits` slots
    pub fn release(&self, permits: usize) {
        self.semaphore.add_permits(permits);
    }

    /// Wait for a slot, or fail with `Cancelled` if the token fires first
    pub async fn acquire(&self, token: &CancellationToken) -> FeedResult<ThrottlePermit> {
        if token.is_cancelled() {
            return Err(FeedError::Cancelled);
        }
        tokio::select! {
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit
                .map(|p| ThrottlePermit { _permit: p })
                .map_err(|_| FeedError::Internal("download throttle closed".to_string())),
            _ = token.cancelled() => Err(FeedError::Cancelled),
        }
    }
}
