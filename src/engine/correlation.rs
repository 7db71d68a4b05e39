//! Correlation of call responses with their callers.
//!
//! Every outbound call registers a one-shot slot under a fresh echo token.
//! The receiver loop resolves the slot when the matching response arrives;
//! the slot is removed on resolution, on timeout, or when the engine
//! abandons all pending calls.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::error::EngineError;
use crate::protocol::{new_echo, CallResponse};

/// What a caller eventually receives.
pub type CallOutcome = Result<CallResponse, EngineError>;

/// Pending call slots keyed by echo.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    slots: Mutex<HashMap<String, oneshot::Sender<CallOutcome>>>,
}

impl CorrelationTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new slot, returning its echo and the receiving end.
    pub fn register(&self) -> (String, oneshot::Receiver<CallOutcome>) {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.lock();
        let mut echo = new_echo();
        while slots.contains_key(&echo) {
            echo = new_echo();
        }
        slots.insert(echo.clone(), tx);
        (echo, rx)
    }

    /// Resolve the slot for `echo`.
    ///
    /// Returns `false` if no slot exists (unknown or already resolved echo).
    /// A caller that stopped waiting still counts as resolved.
    pub fn resolve(&self, echo: &str, response: CallResponse) -> bool {
        self.complete(echo, Ok(response))
    }

    /// Fail the slot for `echo` with `error`.
    ///
    /// Returns `false` if no slot exists.
    pub fn reject(&self, echo: &str, error: EngineError) -> bool {
        self.complete(echo, Err(error))
    }

    fn complete(&self, echo: &str, outcome: CallOutcome) -> bool {
        let Some(tx) = self.lock().remove(echo) else {
            return false;
        };
        if tx.send(outcome).is_err() {
            log::debug!("[Correlation] Caller for echo {} stopped waiting", echo);
        }
        true
    }

    /// Drop the slot for `echo` without resolving it.
    pub fn forget(&self, echo: &str) -> bool {
        self.lock().remove(echo).is_some()
    }

    /// Drop every slot; waiting callers observe the sender going away.
    pub fn abandon_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        drained.len()
    }

    /// Number of unresolved calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no call is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<CallOutcome>>> {
        // A poisoned table still holds valid senders.
        self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
