//! Relay subscription bookkeeping.
//!
//! Tracks active `REQ` subscriptions so incoming `EVENT` frames reach the
//! right receiver and so every subscription can be re-sent after a
//! reconnect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use nostr::{Event, Filter, SubscriptionId};
use tokio::sync::mpsc;

/// An open subscription: its id and the stream of matching events.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub receiver: mpsc::UnboundedReceiver<Event>,
}

struct SubscriptionEntry {
    filter: Filter,
    sender: mpsc::UnboundedSender<Event>,
}

/// Shared between a relay client and its connection task.
#[derive(Clone, Default)]
pub struct SubscriptionManager {
    entries: Arc<Mutex<HashMap<SubscriptionId, SubscriptionEntry>>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionId, SubscriptionEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a subscription and return its receiver.
    pub fn register(&self, id: SubscriptionId, filter: Filter) -> mpsc::UnboundedReceiver<Event> {
        let (sender, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, SubscriptionEntry { filter, sender });
        rx
    }

    /// Forward an event to its subscription. Returns `false` when the id is
    /// unknown or the receiver is gone.
    pub fn dispatch(&self, id: &SubscriptionId, event: Event) -> bool {
        match self.lock().get(id) {
            Some(entry) => entry.sender.send(event).is_ok(),
            None => false,
        }
    }

    pub fn remove(&self, id: &SubscriptionId) {
        self.lock().remove(id);
    }

    /// `(id, filter)` for every subscription whose receiver is still alive.
    pub fn active_subscriptions(&self) -> Vec<(SubscriptionId, Filter)> {
        let mut entries = self.lock();
        entries.retain(|_, e| !e.sender.is_closed());
        entries
            .iter()
            .map(|(id, e)| (id.clone(), e.filter.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
