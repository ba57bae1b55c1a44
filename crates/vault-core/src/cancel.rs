//! Cancellable biometric operations

use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;

pub(crate) type AbortFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct CancelState {
    requested: AtomicBool,
    settled: AtomicBool,
    token: CancellationToken,
}

/// Asks the backend to abort one in-flight biometric operation.
///
/// Cheap to clone; every clone controls the same operation.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
    abort: AbortFn,
}

impl CancelHandle {
    pub(crate) fn new(abort: AbortFn) -> Self {
        Self {
            state: Arc::new(CancelState {
                requested: AtomicBool::new(false),
                settled: AtomicBool::new(false),
                token: CancellationToken::new(),
            }),
            abort,
        }
    }

    /// Request the backend to abort the prompt.
    ///
    /// Only the first successful call reaches the backend; a failed abort
    /// is retried by the next call. Once the operation has settled this
    /// does nothing. The operation itself still settles
    /// through the backend; on modal backends it settles normally.
    pub async fn cancel(&self) -> Result<()> {
        if self.state.settled.load(Ordering::SeqCst) {
            debug!("cancel after settlement ignored");
            return Ok(());
        }
        if self.state.requested.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.state.token.cancel();
        let aborted = (self.abort)().await;
        if aborted.is_err() {
            // Let the next call try the backend again
            self.state.requested.store(false, Ordering::SeqCst);
        }
        aborted
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.token.is_cancelled()
    }

    pub fn is_settled(&self) -> bool {
        self.state.settled.load(Ordering::SeqCst)
    }

    /// Resolves once cancel has been requested
    pub async fn cancelled(&self) {
        self.state.token.cancelled().await
    }

    /// Fired on cancel; handed to the backend with the call
    pub(crate) fn token(&self) -> CancellationToken {
        self.state.token.clone()
    }

    pub(crate) fn mark_settled(&self) {
        self.state.settled.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Pending result of a biometric call plus its [`CancelHandle`].
///
/// The backend call is already running when this is returned; awaiting
/// yields its result. Dropping the operation does not abort the prompt.
pub struct CancellableOperation<T> {
    result: BoxFuture<'static, Result<T>>,
    handle: CancelHandle,
}

impl<T> CancellableOperation<T> {
    pub(crate) fn new(result: BoxFuture<'static, Result<T>>, handle: CancelHandle) -> Self {
        Self { result, handle }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    pub async fn cancel(&self) -> Result<()> {
        self.handle.cancel().await
    }

    /// Split into the pending result and the handle
    pub fn into_parts(self) -> (BoxFuture<'static, Result<T>>, CancelHandle) {
        (self.result, self.handle)
    }
}

impl<T> Future for CancellableOperation<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.result.poll_unpin(cx)
    }
}

impl<T> fmt::Debug for CancellableOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellableOperation")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
