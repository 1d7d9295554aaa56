//! Topic-based publish/subscribe between decoupled parts of a scene.
//!
//! Topics are free-form strings and payloads are arbitrary JSON values. A
//! topic gets an (initially empty) subscriber list on its first `subscribe`;
//! publishing to a topic that has no list is a no-op, while unsubscribing
//! from one is a wiring bug and returns [`EcsError::UnknownTopic`].
//!
//! The broker itself only stores subscriptions and runs host callbacks.
//! Delivery to components is done by the
//! [`EntityManager`](crate::manager::EntityManager), which owns the
//! components being delivered to.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::ComponentRef;
use crate::entity::EntityId;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A published message: topic plus an arbitrary payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Message {
    /// Build a message with the given topic and payload.
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// A message carrying an empty JSON object, like a bare click.
    pub fn empty(topic: impl Into<String>) -> Self {
        Self::new(topic, serde_json::Value::Object(Default::default()))
    }

    /// Read a boolean flag from an object payload, `false` when absent.
    pub fn flag(&self, key: &str) -> bool {
        self.payload
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Handle returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

/// Host-side callback subscriber.
pub type Callback = Box<dyn FnMut(&Message)>;

/// Who receives messages for a subscription.
pub enum Subscriber {
    /// A component; delivered through its `on_message` hook.
    Component(ComponentRef),
    /// A host callback, run inline by [`MessagingManager::publish`].
    Callback(Callback),
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subscriber::Component(target) => f.debug_tuple("Component").field(target).finish(),
            Subscriber::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

#[derive(Debug)]
struct Subscription {
    id: SubscriptionId,
    subscriber: Subscriber,
}

// ---------------------------------------------------------------------------
// MessagingManager
// ---------------------------------------------------------------------------

/// Topic -> ordered subscriber list.
#[derive(Debug, Default)]
pub struct MessagingManager {
    topics: HashMap<String, Vec<Subscription>>,
    next_id: u64,
}

impl MessagingManager {
    /// Create a broker with no topics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscriber to `topic`, creating the topic list on first use.
    pub fn subscribe(&mut self, topic: &str, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.topics
            .entry(topic.to_owned())
            .or_default()
            .push(Subscription { id, subscriber });
        tracing::debug!(topic, subscription = id.0, "subscribed");
        id
    }

    /// Convenience for [`Subscriber::Callback`].
    pub fn subscribe_callback<F>(&mut self, topic: &str, callback: F) -> SubscriptionId
    where
        F: FnMut(&Message) + 'static,
    {
        self.subscribe(topic, Subscriber::Callback(Box::new(callback)))
    }

    /// Remove one subscription.
    ///
    /// Returns `Ok(false)` when the topic exists but the id is not subscribed
    /// to it.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownTopic`] if `topic` never had a subscriber.
    pub fn unsubscribe(&mut self, topic: &str, id: SubscriptionId) -> Result<bool, EcsError> {
        let list = self
            .topics
            .get_mut(topic)
            .ok_or_else(|| EcsError::UnknownTopic {
                topic: topic.to_owned(),
            })?;
        let before = list.len();
        list.retain(|s| s.id != id);
        Ok(list.len() != before)
    }

    /// Drop every component subscription owned by `entity`. Returns how many
    /// were removed.
    pub fn unsubscribe_entity(&mut self, entity: EntityId) -> usize {
        let mut removed = 0;
        for list in self.topics.values_mut() {
            let before = list.len();
            list.retain(|s| !matches!(s.subscriber, Subscriber::Component(r) if r.entity == entity));
            removed += before - list.len();
        }
        removed
    }

    /// Run host callbacks for `message` in subscription order and return the
    /// component subscribers, also in subscription order, for the caller to
    /// deliver.
    ///
    /// A topic without a subscriber list yields an empty result.
    pub fn publish(&mut self, message: &Message) -> Vec<ComponentRef> {
        let Some(list) = self.topics.get_mut(&message.topic) else {
            tracing::trace!(topic = %message.topic, "publish on topic without subscribers");
            return Vec::new();
        };
        let mut targets = Vec::new();
        for subscription in list.iter_mut() {
            match &mut subscription.subscriber {
                Subscriber::Component(target) => targets.push(*target),
                Subscriber::Callback(callback) => callback(message),
            }
        }
        targets
    }

    /// Number of subscribers currently on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }

    /// Whether `topic` has a subscriber list (possibly empty).
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// All known topics, sorted.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.topics.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
