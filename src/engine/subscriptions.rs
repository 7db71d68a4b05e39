//! Handler subscriptions keyed by event kind.
//!
//! Dispatch walks the concrete kind's lineage from the capability root down
//! to the kind itself and collects the handlers of every step, in
//! registration order per kind.

use std::collections::HashMap;

use super::handler::Handler;
use crate::models::Lineage;

/// Handlers for one capability root.
#[derive(Debug)]
pub struct Subscriptions<K, E> {
    handlers: HashMap<K, Vec<Handler<E>>>,
}

impl<K, E> Default for Subscriptions<K, E> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<K: Lineage, E: Send + 'static> Subscriptions<K, E> {
    /// Subscribe `handler` to `kind` and everything below it.
    pub fn add(&mut self, kind: K, handler: Handler<E>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Handlers interested in an event of concrete kind `concrete`.
    #[must_use]
    pub fn handlers_for(&self, concrete: K) -> Vec<(K, Handler<E>)> {
        concrete
            .lineage()
            .iter()
            .filter_map(|kind| self.handlers.get(kind).map(|list| (*kind, list)))
            .flat_map(|(kind, list)| list.iter().map(move |h| (kind, h.clone())))
            .collect()
    }

    /// Number of handlers subscribed directly to `kind`.
    #[must_use]
    pub fn count(&self, kind: K) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }
}
