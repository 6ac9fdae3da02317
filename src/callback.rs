//! Completion callbacks for asynchronous sends.
//!
//! Every send that takes a [`Callback`] completes it exactly once. Clones
//! share one completion slot: whichever clone completes first wins and any
//! later completion is ignored. This lets the endpoint keep a handle to a
//! callback it has passed to the sink and still report a synchronous
//! refusal without risking a double notification.
//!
//! # Example
//!
//! ```
//! use ws_outgoing::Callback;
//!
//! # tokio_test_block_on(async {
//! let (callback, completion) = Callback::channel();
//! callback.succeeded();
//! assert!(completion.await.is_ok());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{Result, WsError};

type CompleteFn = Box<dyn FnOnce(Result<()>) + Send>;

/// Exactly-once completion handle.
#[derive(Clone)]
pub struct Callback {
    slot: Arc<Mutex<Option<CompleteFn>>>,
}

impl Callback {
    /// Wrap a closure that receives the outcome.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(f)))),
        }
    }

    /// A callback that ignores its outcome.
    pub fn noop() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// A callback paired with a future resolving to its outcome.
    pub fn channel() -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        let callback = Self::new(move |result| {
            let _ = tx.send(result);
        });
        (callback, Completion { rx })
    }

    /// Report success.
    pub fn succeeded(&self) {
        self.complete(Ok(()));
    }

    /// Report failure.
    pub fn failed(&self, err: WsError) {
        self.complete(Err(err));
    }

    /// Report an outcome. Only the first completion is delivered.
    pub fn complete(&self, result: Result<()>) {
        let f = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(f) = f {
            f(result);
        }
    }

    /// Whether the outcome has already been delivered (always true for `noop`).
    pub fn is_completed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Future side of [`Callback::channel`].
///
/// Resolves to [`WsError::ConnectionClosed`] if every clone of the callback
/// is dropped without being completed.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<()>>,
}

impl Future for Completion {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(WsError::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_first_completion_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let callback = Callback::new(move |result| {
            assert!(result.is_ok());
            seen.fetch_add(1, Ordering::SeqCst);
        });

        callback.succeeded();
        callback.failed(WsError::ConnectionClosed);
        callback.succeeded();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(callback.is_completed());
    }

    #[test]
    fn test_clones_share_slot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let callback = Callback::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let other = callback.clone();

        other.failed(WsError::Backpressure);
        callback.succeeded();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(callback.is_completed());
    }

    #[test]
    fn test_noop_is_completed() {
        let callback = Callback::noop();
        assert!(callback.is_completed());
        callback.succeeded();
    }

    #[tokio::test]
    async fn test_channel_delivers_failure() {
        let (callback, completion) = Callback::channel();
        callback.failed(WsError::Backpressure);
        assert!(matches!(completion.await, Err(WsError::Backpressure)));
    }

    #[tokio::test]
    async fn test_dropped_callback_resolves_closed() {
        let (callback, completion) = Callback::channel();
        drop(callback);
        assert!(matches!(completion.await, Err(WsError::ConnectionClosed)));
    }
}
