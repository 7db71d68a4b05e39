//! Supervision of dispatched units of work.
//!
//! Every handler invocation runs as its own tokio task. While it runs, the
//! supervisor keeps an entry with the raw frame that triggered it; a handler
//! that returns an error or panics is reported to the error hook together
//! with that frame. Entries are removed when the work finishes, whatever the
//! outcome.
//!
//! ```text
//! spawn(label, frame, work)
//!   ├─► track { label, frame, abort }
//!   └─► tokio::spawn
//!         ├─ Ok(())         ─► untrack
//!         ├─ Err(e)         ─► error hook(failure, frame) ─► untrack
//!         └─ panic          ─► error hook(failure, frame) ─► untrack
//! ```

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use anyhow::Result;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::AbortHandle;

use super::handler::Handler;

/// Identifier of a supervised unit of work.
pub type TaskId = u64;

/// Hook receiving every handler failure with the raw frame that caused it.
pub type ErrorHook = Handler<(HandlerFailure, Arc<Value>)>;

/// A unit of work that ended with an error or a panic.
#[derive(Debug)]
pub struct HandlerFailure {
    /// Supervisor id of the failed work.
    pub task_id: TaskId,
    /// What the work was (e.g., "command:ping", "notice:GroupRecall").
    pub label: String,
    /// The error, or the panic message wrapped as an error.
    pub error: anyhow::Error,
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (task {}) failed: {:#}", self.label, self.task_id, self.error)
    }
}

struct Tracked {
    label: String,
    frame: Arc<Value>,
    abort: Option<AbortHandle>,
}

/// Tracks in-flight handler work and funnels failures to the error hook.
pub struct TaskSupervisor {
    tasks: Mutex<HashMap<TaskId, Tracked>>,
    next_id: AtomicU64,
    hook: RwLock<Option<ErrorHook>>,
    idle: Notify,
}

impl std::fmt::Debug for TaskSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSupervisor")
            .field("in_flight", &self.in_flight())
            .field("has_hook", &self.has_error_hook())
            .finish_non_exhaustive()
    }
}

impl TaskSupervisor {
    /// Create a supervisor with no error hook.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            hook: RwLock::new(None),
            idle: Notify::new(),
        })
    }

    /// Install the error hook, replacing any previous one.
    pub fn set_error_hook(&self, hook: ErrorHook) {
        *self.hook.write().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    /// Whether an error hook is installed.
    #[must_use]
    pub fn has_error_hook(&self) -> bool {
        self.hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Spawn `work` as an independent task triggered by `frame`.
    pub fn spawn(
        self: &Arc<Self>,
        label: impl Into<String>,
        frame: Arc<Value>,
        work: BoxFuture<'static, Result<()>>,
    ) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(
            id,
            Tracked {
                label: label.into(),
                frame,
                abort: None,
            },
        );

        let me = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(work).catch_unwind().await;
            let error = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(panic) => Some(anyhow::anyhow!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };
            if let Some(error) = error {
                me.report(id, error).await;
            }
            me.untrack(id);
        });

        if let Some(tracked) = self.lock().get_mut(&id) {
            tracked.abort = Some(handle.abort_handle());
        }
        id
    }

    /// Number of units of work still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Raw frame that triggered a running unit of work.
    #[must_use]
    pub fn frame_of(&self, id: TaskId) -> Option<Arc<Value>> {
        self.lock().get(&id).map(|t| Arc::clone(&t.frame))
    }

    /// Wait until no work is in flight, or until `timeout` elapses.
    ///
    /// Returns `true` if everything finished in time.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let wait_idle = async {
            loop {
                let notified = self.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait_idle).await.is_ok()
    }

    /// Abort every unit of work still running.
    pub fn abort_all(&self) -> usize {
        let drained: Vec<Tracked> = self.lock().drain().map(|(_, t)| t).collect();
        for tracked in &drained {
            if let Some(abort) = &tracked.abort {
                abort.abort();
            }
        }
        self.idle.notify_waiters();
        if !drained.is_empty() {
            log::warn!("[Tasks] Aborted {} in-flight handlers", drained.len());
        }
        drained.len()
    }

    async fn report(&self, id: TaskId, error: anyhow::Error) {
        let (label, frame) = match self.lock().get(&id) {
            Some(t) => (t.label.clone(), Arc::clone(&t.frame)),
            None => (String::from("unknown"), Arc::new(Value::Null)),
        };
        let failure = HandlerFailure {
            task_id: id,
            label,
            error,
        };

        let hook = self
            .hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(hook) = hook else {
            log::error!("[Tasks] {} (frame: {})", failure, frame);
            return;
        };

        match AssertUnwindSafe(hook.invoke((failure, frame)))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("[Tasks] Error hook failed: {:#}", e),
            Err(panic) => log::error!(
                "[Tasks] Error hook panicked: {}",
                panic_message(panic.as_ref())
            ),
        }
    }

    fn untrack(&self, id: TaskId) {
        let mut tasks = self.lock();
        tasks.remove(&id);
        if tasks.is_empty() {
            self.idle.notify_waiters();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, Tracked>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_successful_work_is_untracked() {
        let supervisor = TaskSupervisor::new();
        supervisor.spawn("ok", Arc::new(json!({})), async { Ok(()) }.boxed());
        assert!(supervisor.drain(Duration::from_secs(1)).await);
        assert_eq!(supervisor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_reaches_hook_with_frame() {
        let supervisor = TaskSupervisor::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        supervisor.set_error_hook(Handler::from_async(
            move |(failure, frame): (HandlerFailure, Arc<Value>)| {
                let tx = tx.clone();
                async move {
                    tx.send((failure.label, failure.error.to_string(), frame))
                        .map_err(|e| anyhow::anyhow!("{e}"))?;
                    Ok(())
                }
            },
        ));

        let frame = Arc::new(json!({ "post_type": "notice", "id": 7 }));
        supervisor.spawn(
            "notice:FriendAdd",
            Arc::clone(&frame),
            async { anyhow::bail!("handler broke") }.boxed(),
        );

        let (label, error, seen) = rx.recv().await.unwrap();
        assert_eq!(label, "notice:FriendAdd");
        assert_eq!(error, "handler broke");
        assert_eq!(seen, frame);
        assert!(supervisor.drain(Duration::from_secs(1)).await);
        assert_eq!(supervisor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panic_reaches_blocking_hook() {
        let supervisor = TaskSupervisor::new();
        let (tx, rx) = std::sync::mpsc::channel();
        let tx = Mutex::new(tx);
        supervisor.set_error_hook(Handler::blocking(
            move |(failure, _frame): (HandlerFailure, Arc<Value>)| {
                tx.lock()
                    .map_err(|e| anyhow::anyhow!("{e}"))?
                    .send(failure.error.to_string())?;
                Ok(())
            },
        ));

        supervisor.spawn(
            "panics",
            Arc::new(Value::Null),
            async { panic!("kaboom") }.boxed(),
        );

        assert!(supervisor.drain(Duration::from_secs(1)).await);
        let message = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(message.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_drain_times_out_on_stuck_work() {
        let supervisor = TaskSupervisor::new();
        let id = supervisor.spawn(
            "stuck",
            Arc::new(json!({ "n": 1 })),
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
            .boxed(),
        );
        assert_eq!(supervisor.frame_of(id).unwrap()["n"], 1);
        assert!(!supervisor.drain(Duration::from_millis(50)).await);
        assert_eq!(supervisor.abort_all(), 1);
        assert_eq!(supervisor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_without_hook_is_logged_and_untracked() {
        let supervisor = TaskSupervisor::new();
        assert!(!supervisor.has_error_hook());
        supervisor.spawn(
            "fails",
            Arc::new(Value::Null),
            async { Err(anyhow::anyhow!("nobody listens")) }.boxed(),
        );
        assert!(supervisor.drain(Duration::from_secs(1)).await);
    }
}
