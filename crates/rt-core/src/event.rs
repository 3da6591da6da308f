use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::client::ClientNode;
use crate::channel::DEFAULT_CHANNEL;

/// A subscription-authorization predicate: `(node, channel) -> allowed`.
pub type ShouldSubscribe = Box<dyn Fn(&ClientNode, &str) -> bool + Send + Sync>;

/// Options accepted by [`EventRegistry::add_event`].
#[derive(Default)]
pub struct EventOptions {
    pub protected: bool,
    pub user_scoped: bool,
    pub should_subscribe: Option<ShouldSubscribe>,
    pub cluster: bool,
}

pub struct EventEntry {
    pub name: String,
    pub protected: bool,
    pub user_scoped: bool,
    pub should_subscribe: Option<ShouldSubscribe>,
    pub cluster: bool,
}

impl EventEntry {
    /// Resolution order: explicit predicate first, then the
    /// user-scoped default (`authenticated AND channel == stringified user
    /// id`), then unconditional allow.
    fn is_subscription_allowed(&self, node: &ClientNode, channel: &str) -> bool {
        if let Some(predicate) = &self.should_subscribe {
            return predicate(node, channel);
        }
        if self.user_scoped {
            return node.is_authenticated()
                && node.user_id().as_deref() == Some(channel);
        }
        true
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscribeError {
    #[error("event not found")]
    NotFound,
    #[error("subscription forbidden")]
    Forbidden,
}

/// Registry of declared events and their subscription/cluster policy
///.
#[derive(Default)]
pub struct EventRegistry {
    events: RwLock<HashMap<String, EventEntry>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&self, name: impl Into<String>, options: EventOptions) {
        let name = name.into();
        let entry = EventEntry {
            name: name.clone(),
            protected: options.protected,
            user_scoped: options.user_scoped,
            should_subscribe: options.should_subscribe,
            cluster: options.cluster,
        };
        self.events.write().expect("event registry lock poisoned").insert(name, entry);
    }

    pub fn is_cluster(&self, name: &str) -> bool {
        self.events
            .read()
            .expect("event registry lock poisoned")
            .get(name)
            .is_some_and(|e| e.cluster)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.events.read().expect("event registry lock poisoned").contains_key(name)
    }

    /// Names of every event registered with `cluster: true`, used to derive
    /// the broker topic list at subscription time.
    pub fn cluster_event_names(&self) -> Vec<String> {
        self.events
            .read()
            .expect("event registry lock poisoned")
            .values()
            .filter(|entry| entry.cluster)
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Authorize a `subscribe(event, channel)` request from `node`
    ///. Defaults `channel` to the sentinel default channel when
    /// none was supplied.
    pub fn authorize_subscribe(
        &self,
        name: &str,
        node: &ClientNode,
        channel: Option<&str>,
    ) -> Result<(), SubscribeError> {
        let events = self.events.read().expect("event registry lock poisoned");
        let entry = events.get(name).ok_or(SubscribeError::NotFound)?;
        if entry.protected && !node.is_authenticated() {
            return Err(SubscribeError::Forbidden);
        }
        let channel = channel.unwrap_or(DEFAULT_CHANNEL);
        if entry.is_subscription_allowed(node, channel) {
            Ok(())
        } else {
            Err(SubscribeError::Forbidden)
        }
    }
}
