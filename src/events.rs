//! Change notification for store commits.
//!
//! The block store publishes one event per `(scope, kind)` it touches;
//! interested parties subscribe (optionally per scope) and re-fetch what
//! they need on notification. Plain std channels, no delivery guarantees
//! beyond in-process FIFO per subscriber.

use std::sync::{
    mpsc::{channel, Receiver, Sender},
    Mutex,
};

use crate::blocks::BlockKind;
use crate::scope::ScopeType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub scope_type: ScopeType,
    pub scope_id: String,
    pub kind: BlockKind,
}

#[derive(Debug, Default)]
pub struct ChangeBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

#[derive(Debug)]
struct Subscriber {
    filter: Option<(ScopeType, String)>,
    tx: Sender<ChangeEvent>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives every committed change.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.register(None)
    }

    /// Receives changes for a single scope.
    pub fn subscribe_scope(&self, scope_type: ScopeType, scope_id: &str) -> Receiver<ChangeEvent> {
        self.register(Some((scope_type, scope_id.to_string())))
    }

    fn register(&self, filter: Option<(ScopeType, String)>) -> Receiver<ChangeEvent> {
        let (tx, rx) = channel();
        self.subscribers
            .lock()
            .unwrap()
            .push(Subscriber { filter, tx });
        rx
    }

    /// Fans an event out to matching subscribers. Subscribers whose
    /// receiver has been dropped are pruned here.
    pub fn publish(&self, event: ChangeEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|sub| {
            let wanted = match &sub.filter {
                Some((scope_type, scope_id)) => {
                    *scope_type == event.scope_type && *scope_id == event.scope_id
                }
                None => true,
            };
            if !wanted {
                return true;
            }
            sub.tx.send(event.clone()).is_ok()
        });
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}
