//! Carrying a context across executor boundaries.
//!
//! Executors snapshot the ambient context with [`Context::saved`] before
//! handing work to another thread and install it again when the work runs.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use super::context_impl::Context;
use super::guards::ContextScopeGuard;

/// Runs `f` with `saved` installed, restoring the previous context afterwards.
pub fn with_context<R>(saved: Option<Context>, f: impl FnOnce() -> R) -> R {
    let _guard = ContextScopeGuard::with_saved(saved);
    f()
}

/// Captures the calling thread's context and binds it to `f`.
///
/// The returned closure can run on any thread; it installs the captured
/// handle for the duration of `f`.
///
/// ```rust
/// use ctxflow::context::{bind, Context, ContextScopeGuard};
///
/// let guard = ContextScopeGuard::new();
/// let expected = guard.context();
/// let task = bind(move || Context::current() == expected);
/// assert!(std::thread::spawn(task).join().unwrap());
/// ```
pub fn bind<F, R>(f: F) -> impl FnOnce() -> R + Send
where
    F: FnOnce() -> R + Send,
{
    let saved = Context::saved();
    move || with_context(saved, f)
}

/// A [`Future`] wrapper that installs a context around every poll.
///
/// Executors that move tasks between worker threads do not carry
/// thread-local state along; `ContextFuture` restores it on whichever
/// thread polls.
pub struct ContextFuture<F> {
    context: Option<Context>,
    future: Pin<Box<F>>,
}

impl<F> ContextFuture<F> {
    /// Wraps `future` so it is polled with `context` installed.
    pub fn new(context: Option<Context>, future: F) -> Self {
        Self {
            context,
            future: Box::pin(future),
        }
    }

    /// Returns the context installed while polling.
    #[must_use]
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }
}

impl<F: Future> Future for ContextFuture<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let _guard = ContextScopeGuard::with_saved(this.context.clone());
        this.future.as_mut().poll(cx)
    }
}

impl<F> std::fmt::Debug for ContextFuture<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextFuture")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Extension methods for attaching a context to a future.
pub trait FutureContextExt: Future + Sized {
    /// Polls this future with `context` installed.
    fn with_context(self, context: Context) -> ContextFuture<Self> {
        ContextFuture::new(Some(context), self)
    }

    /// Polls this future with the calling thread's current handle installed.
    fn in_current_context(self) -> ContextFuture<Self> {
        ContextFuture::new(Context::saved(), self)
    }
}

impl<F: Future> FutureContextExt for F {}
