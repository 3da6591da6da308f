use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::client::ClientNode;

/// The reserved sentinel name for the default/global channel.
pub const DEFAULT_CHANNEL: &str = "";

/// A named bucket of subscribers, keyed by event name within the channel
///.
///
/// Subscriber sets are compared by `ClientNode` identity rather than by
/// pointer, matching "a client reconnects with the same identity" semantics
/// elsewhere in the system: two `Arc<ClientNode>` with the same `id()` are
/// treated as the same subscriber slot.
#[derive(Default)]
pub struct Channel {
    subscribers: RwLock<BTreeMap<String, Vec<Arc<ClientNode>>>>,
}

impl Channel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, event: &str, node: Arc<ClientNode>) {
        let mut subs = self.subscribers.write().expect("channel lock poisoned");
        let set = subs.entry(event.to_owned()).or_default();
        let node_id = node.id();
        if !set.iter().any(|existing| existing.id() == node_id) {
            set.push(node);
        }
    }

    pub fn unsubscribe(&self, event: &str, node: &ClientNode) {
        let mut subs = self.subscribers.write().expect("channel lock poisoned");
        if let Some(set) = subs.get_mut(event) {
            let node_id = node.id();
            set.retain(|existing| existing.id() != node_id);
            if set.is_empty() {
                subs.remove(event);
            }
        }
    }

    /// Deliver pre-encoded bytes to every subscriber of `event`. Encoding
    /// happens once at emit time, not per-subscriber.
    pub fn propagate(&self, event: &str, encoded_payload: &[u8]) {
        let subs = self.subscribers.read().expect("channel lock poisoned");
        let Some(set) = subs.get(event) else {
            return;
        };
        for node in set {
            // A send failure here means the node's transport already
            // dropped; disconnect cleanup will prune it via `remove_node`.
            let _ = node.send_encoded(encoded_payload);
        }
    }

    /// Strip a node from every event's subscriber set.
    pub fn remove_node(&self, node: &ClientNode) {
        let mut subs = self.subscribers.write().expect("channel lock poisoned");
        let node_id = node.id();
        subs.retain(|_, set| {
            set.retain(|existing| existing.id() != node_id);
            !set.is_empty()
        });
    }

    /// True once every event's subscriber set is empty, i.e. this channel is
    /// eligible for garbage collection.
    pub fn is_empty(&self) -> bool {
        self.subscribers.read().expect("channel lock poisoned").is_empty()
    }

    /// The set of event names this channel currently has subscribers for.
    pub fn subscribed_events(&self) -> HashSet<String> {
        self.subscribers
            .read()
            .expect("channel lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}
