//! Cooperative cancellation for in-flight requests.
//!
//! A [`CancellationToken`] is the trigger side and a [`CancelSignal`] is the
//! observing side. Both share the same state, so aborting the token wakes
//! every task waiting on one of its signals.
//!
//! ```
//! use fetchline_core::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let signal = token.signal();
//!
//! token.abort();
//! assert!(signal.is_cancelled());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cancellation token scoped to one request.
///
/// The token is cheap to clone; clones trigger the same cancellation.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<CancelState>,
}

impl CancellationToken {
    /// Create a new, untriggered token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Get the observing side of this token.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            inner: self.inner.clone(),
        }
    }

    /// Request cancellation.
    ///
    /// Sets the cancellation flag and wakes all waiters. Aborting more than
    /// once has no further effect.
    pub fn abort(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Check if cancellation has been requested.
    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// The observing side of a [`CancellationToken`].
#[derive(Debug, Clone)]
pub struct CancelSignal {
    inner: Arc<CancelState>,
}

impl CancelSignal {
    /// Check if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Wait until cancellation is requested.
    ///
    /// Returns immediately if the token was already aborted.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
            if self.is_cancelled() {
                return;
            }
        }
    }

    /// Check whether two signals observe the same token.
    pub fn same_token(&self, other: &CancelSignal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
