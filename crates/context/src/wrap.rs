use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;

use crate::context::RequestContext;
use crate::stack::push;

/// Wraps a callable so that it runs with `ctx` pushed onto this thread's
/// context stack for its duration, popping afterward even if it panics
/// (the [`crate::stack::PushGuard`] pops on drop regardless).
pub fn wrap_fn<F, R>(ctx: Arc<RequestContext>, f: F) -> impl FnOnce() -> R
where
    F: FnOnce() -> R,
{
    move || {
        let _guard = push(ctx);
        f()
    }
}

pin_project! {
    /// Wraps a future so every [`Future::poll`] call runs with `ctx`
    /// current on whichever thread happens to drive it.
    pub struct ContextAwareFuture<Fut> {
        ctx: Arc<RequestContext>,
        #[pin]
        inner: Fut,
    }
}

impl<Fut> ContextAwareFuture<Fut> {
    pub fn new(ctx: Arc<RequestContext>, inner: Fut) -> Self {
        Self { ctx, inner }
    }
}

impl<Fut: Future> Future for ContextAwareFuture<Fut> {
    type Output = Fut::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = push(Arc::clone(this.ctx));
        this.inner.poll(cx)
    }
}

/// Spawns futures with the captured context current on the executing task.
pub trait ContextAwareExecutor {
    fn spawn_with_context<F>(&self, ctx: Arc<RequestContext>, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static;
}

/// The default executor: `tokio::spawn`, wrapping the future first.
pub struct TokioContextAwareExecutor;

impl ContextAwareExecutor for TokioContextAwareExecutor {
    fn spawn_with_context<F>(&self, ctx: Arc<RequestContext>, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::task::spawn(ContextAwareFuture::new(ctx, future))
    }
}
