//! Compute-once cells
//!
//! A `MemoCell` runs its initializer at most once. The outcome, whether a
//! value or an error, is stored and handed back unchanged on every later
//! access.

use crate::error::FeedResult;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

type Init<T> = Box<dyn FnOnce() -> FeedResult<T> + Send>;

/// A lazily computed value that replays its first outcome
pub struct MemoCell<T> {
    outcome: OnceLock<FeedResult<Arc<T>>>,
    init: Mutex<Option<Init<T>>>,
}

impl<T> MemoCell<T> {
    /// Create a cell that computes its value on first access
    pub fn new<F>(init: F) -> Self
    where
        F: FnOnce() -> FeedResult<T> + Send + 'static,
    {
        Self {
            outcome: OnceLock::new(),
            init: Mutex::new(Some(Box::new(init))),
        }
    }

    /// Create a cell that already holds a value
    pub fn ready(value: T) -> Self {
        let outcome = OnceLock::new();
        let _ = outcome.set(Ok(Arc::new(value)));
        Self {
            outcome,
            init: Mutex::new(None),
        }
    }

    /// Get the value, computing it on first access
    pub fn value(&self) -> FeedResult<Arc<T>> {
        self.outcome
            .get_or_init(|| {
                let init = self
                    .init
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                match init {
                    Some(f) => f().map(Arc::new),
                    None => Err(crate::error::FeedError::Internal(
                        "memo cell initializer already consumed".to_string(),
                    )),
                }
            })
            .clone()
    }

    /// Whether the outcome has been computed
    pub fn is_computed(&self) -> bool {
        self.outcome.get().is_some()
    }
}

impl<T> fmt::Debug for MemoCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoCell")
            .field("computed", &self.is_computed())
            .finish()
    }
}

/// Existence check that remembers only a positive answer.
///
/// Files that appear later are picked up on the next probe; files that
/// were seen once are assumed to stay.
#[derive(Debug, Default)]
pub struct ExistenceProbe {
    seen: AtomicBool,
}

impl ExistenceProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `check` unless a previous check already returned `true`
    pub fn exists(&self, check: impl FnOnce() -> bool) -> bool {
        if self.seen.load(Ordering::Acquire) {
            return true;
        }
        let found = check();
        if found {
            self.seen.store(true, Ordering::Release);
        }
        found
    }
}
