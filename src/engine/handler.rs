//! Event handlers and their execution mode.
//!
//! A handler is registered either as async work, which runs on the tokio
//! scheduler, or as blocking work, which always runs on tokio's blocking pool
//! so it never stalls the tasks driving the connection.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::tasks::panic_message;

type AsyncFn<E> = dyn Fn(E) -> BoxFuture<'static, Result<()>> + Send + Sync;
type BlockingFn<E> = dyn Fn(E) -> Result<()> + Send + Sync;

/// A callback for events of type `E`.
pub enum Handler<E> {
    /// Runs as a tokio task.
    Async(Arc<AsyncFn<E>>),
    /// Runs on the blocking thread pool.
    Blocking(Arc<BlockingFn<E>>),
}

impl<E> Clone for Handler<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Async(f) => Self::Async(Arc::clone(f)),
            Self::Blocking(f) => Self::Blocking(Arc::clone(f)),
        }
    }
}

impl<E> std::fmt::Debug for Handler<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Async(_) => f.write_str("Handler::Async"),
            Self::Blocking(_) => f.write_str("Handler::Blocking"),
        }
    }
}

impl<E: Send + 'static> Handler<E> {
    /// Wrap an async function.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::Async(Arc::new(move |event| f(event).boxed()))
    }

    /// Wrap a blocking function.
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(E) -> Result<()> + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(f))
    }

    /// Whether this handler is offloaded to the blocking pool.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking(_))
    }

    /// Build the unit of work that runs this handler for one event.
    ///
    /// Nothing of the handler runs until the returned future is polled, so
    /// whoever polls it sees every panic. Panics inside a blocking handler
    /// surface as an error of the returned future.
    pub(crate) fn invoke(&self, event: E) -> BoxFuture<'static, Result<()>> {
        match self {
            Self::Async(f) => {
                let f = Arc::clone(f);
                async move { f(event).await }.boxed()
            }
            Self::Blocking(f) => {
                let f = Arc::clone(f);
                async move {
                    match tokio::task::spawn_blocking(move || f(event)).await {
                        Ok(result) => result,
                        Err(e) => match e.try_into_panic() {
                            Ok(panic) => Err(anyhow::anyhow!(
                                "handler panicked: {}",
                                panic_message(panic.as_ref())
                            )),
                            Err(e) => Err(anyhow::anyhow!("blocking handler did not finish: {e}")),
                        },
                    }
                }
                .boxed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_async_handler_runs() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handler = Handler::from_async(move |n: usize| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(n, Ordering::SeqCst);
                Ok(())
            }
        });
        handler.invoke(3).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(!handler.is_blocking());
    }

    #[tokio::test]
    async fn test_blocking_handler_runs_off_runtime_thread() {
        let handler = Handler::blocking(|expected: String| {
            let name = std::thread::current().name().map(str::to_string);
            anyhow::ensure!(name.as_deref() != Some(expected.as_str()));
            Ok(())
        });
        let runtime_thread = std::thread::current().name().unwrap_or_default().to_string();
        assert!(handler.is_blocking());
        handler.invoke(runtime_thread).await.unwrap();
    }

    #[tokio::test]
    async fn test_blocking_handler_panic_becomes_error() {
        let handler = Handler::blocking(|_: ()| -> Result<()> { panic!("boom") });
        let err = handler.invoke(()).await.unwrap_err();
        assert_eq!(err.to_string(), "handler panicked: boom");
    }

    #[tokio::test]
    async fn test_async_handler_does_not_run_until_polled() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handler = Handler::from_async(move |(): ()| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
        let work = handler.invoke(());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        work.await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
