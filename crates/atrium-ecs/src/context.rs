//! The handle every component hook receives.
//!
//! A [`Context`] names the component being run ([`ComponentRef`]) and borrows
//! the [`EntityManager`] for the duration of the hook. Through it a component
//! reads and moves its own entity, looks up siblings and other entities,
//! talks to the topic broker and reaches the spatial grid.
//!
//! While a hook runs, its own component is detached from the entity, so
//! [`sibling`](Context::sibling) never returns the caller itself.
//!
//! Messages published through a context are queued and delivered by the
//! manager as soon as the running hook returns, never re-entrantly.

use glam::{Quat, Vec3};

use crate::component::{Component, ComponentRef};
use crate::entity::{Entity, EntityId};
use crate::manager::{EntityManager, Envelope};
use crate::messaging::{Message, Subscriber, SubscriptionId};
use crate::spatial::SpatialHashGrid;
use crate::EcsError;

/// Explicit access to the owning entity and the shared runtime services.
pub struct Context<'a> {
    manager: &'a mut EntityManager,
    this: ComponentRef,
}

impl<'a> Context<'a> {
    pub(crate) fn new(manager: &'a mut EntityManager, this: ComponentRef) -> Self {
        Self { manager, this }
    }

    // -- identity -----------------------------------------------------------

    /// Id of the owning entity.
    pub fn entity_id(&self) -> EntityId {
        self.this.entity
    }

    /// Address of the component whose hook is running.
    pub fn component_ref(&self) -> ComponentRef {
        self.this
    }

    /// The owning entity.
    pub fn entity(&self) -> Option<&Entity> {
        self.manager.get_by_id(self.this.entity)
    }

    /// Read-only view of the whole registry, for `get` and
    /// `filter_components` queries.
    pub fn manager(&self) -> &EntityManager {
        &*self.manager
    }

    // -- transform ----------------------------------------------------------

    pub fn position(&self) -> Vec3 {
        self.entity().map_or(Vec3::ZERO, Entity::position)
    }

    pub fn rotation(&self) -> Quat {
        self.entity().map_or(Quat::IDENTITY, Entity::rotation)
    }

    pub fn set_position(&mut self, position: Vec3) {
        if let Some(entity) = self.manager.entity_mut(self.this.entity) {
            entity.set_position(position);
        }
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        if let Some(entity) = self.manager.entity_mut(self.this.entity) {
            entity.set_rotation(rotation);
        }
    }

    // -- siblings -----------------------------------------------------------

    /// First sibling component of type `T`.
    pub fn sibling<T: Component>(&self) -> Option<&T> {
        self.entity()?.get_component::<T>()
    }

    /// Mutable variant of [`sibling`](Self::sibling).
    pub fn sibling_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.manager
            .entity_mut(self.this.entity)?
            .get_component_mut::<T>()
    }

    // -- messaging ----------------------------------------------------------

    /// Queue `payload` for every subscriber of `topic`.
    pub fn publish(&mut self, topic: &str, payload: serde_json::Value) {
        self.manager
            .enqueue(Envelope::Topic(Message::new(topic, payload)));
    }

    /// Queue an entity-local message for the handlers registered on the
    /// owning entity.
    pub fn broadcast(&mut self, topic: &str, payload: serde_json::Value) {
        self.broadcast_to(self.this.entity, topic, payload);
    }

    /// Queue an entity-local message for another entity's handlers.
    pub fn broadcast_to(&mut self, entity: EntityId, topic: &str, payload: serde_json::Value) {
        self.manager.enqueue(Envelope::Entity {
            target: entity,
            message: Message::new(topic, payload),
        });
    }

    /// Subscribe this component to `topic`. Messages arrive through
    /// [`Component::on_message`].
    pub fn subscribe(&mut self, topic: &str) -> SubscriptionId {
        self.manager
            .messaging_mut()
            .subscribe(topic, Subscriber::Component(self.this))
    }

    /// Drop one of this component's subscriptions.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownTopic`] if `topic` was never subscribed to.
    pub fn unsubscribe(&mut self, topic: &str, id: SubscriptionId) -> Result<bool, EcsError> {
        self.manager.messaging_mut().unsubscribe(topic, id)
    }

    /// Receive entity-local messages on `topic`. Registering twice is a
    /// no-op.
    pub fn register_handler(&mut self, topic: &str) {
        let slot = self.this.slot;
        if let Some(entity) = self.manager.entity_mut(self.this.entity) {
            let slots = entity.handlers.entry(topic.to_owned()).or_default();
            if !slots.contains(&slot) {
                slots.push(slot);
            }
        }
    }

    // -- world --------------------------------------------------------------

    pub fn grid(&self) -> Option<&SpatialHashGrid> {
        self.manager.grid()
    }

    pub fn grid_mut(&mut self) -> Option<&mut SpatialHashGrid> {
        self.manager.grid_mut()
    }

    /// Register a new entity. Its components are initialised right away;
    /// messages they publish are delivered after the current hook.
    pub fn spawn(&mut self, entity: Entity, name: &str) -> EntityId {
        self.manager.add(entity, name)
    }

    /// Request removal of `entity`. Removal happens once the current update
    /// pass (or host operation) finishes.
    pub fn despawn(&mut self, entity: EntityId) {
        self.manager.defer_removal(entity);
    }
}
