//! Lookup of live engines by the agent account they serve.
//!
//! An engine registers itself when the agent announces its lifecycle
//! `connect` event and is evicted when that session ends. Entries hold weak
//! references, so the registry never keeps an engine alive.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, Weak};

use super::{Engine, EngineInner};

/// Agent id → engine map shared by every engine of a process.
#[derive(Debug, Default)]
pub struct EngineRegistry {
    engines: RwLock<HashMap<i64, Weak<EngineInner>>>,
}

impl EngineRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine currently serving `agent_id`, if it is still alive.
    #[must_use]
    pub fn get(&self, agent_id: i64) -> Option<Engine> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&agent_id)
            .and_then(Weak::upgrade)
            .map(Engine::from_inner)
    }

    /// Number of registered agent ids, live or not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no engine is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn register(&self, agent_id: i64, engine: Weak<EngineInner>) {
        let previous = self
            .engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(agent_id, engine);
        if previous.is_some() {
            log::debug!("[Registry] Replaced engine for agent {}", agent_id);
        } else {
            log::info!("[Registry] Registered engine for agent {}", agent_id);
        }
    }

    /// Remove `agent_id` if it still points at `engine`.
    pub(crate) fn evict(&self, agent_id: i64, engine: &Weak<EngineInner>) -> bool {
        let mut engines = self.engines.write().unwrap_or_else(PoisonError::into_inner);
        let owned = engines
            .get(&agent_id)
            .is_some_and(|current| current.ptr_eq(engine));
        if owned {
            engines.remove(&agent_id);
            log::info!("[Registry] Evicted engine for agent {}", agent_id);
        }
        owned
    }
}
