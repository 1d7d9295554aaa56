//! The [`EntityManager`]: registry, frame driver and message router.
//!
//! The manager owns every registered [`Entity`], the topic broker and the
//! optional spatial grid. It is the only place where component hooks are
//! invoked. To run a hook, the component is taken out of its slot, handed a
//! [`Context`] that borrows the manager, and put back afterwards. That is
//! what lets a component mutate its own state while reading its siblings and
//! the rest of the world through the same `&mut EntityManager`.
//!
//! # Frame pass
//!
//! [`update`](EntityManager::update) visits entities in registration order
//! and, within each entity, components in addition order. Messages published
//! from a hook are delivered after that hook returns (and before the next
//! component runs). Removals requested with
//! [`Context::despawn`] are applied once the pass is complete.
//!
//! # Isolation
//!
//! A component whose `update` returns an error is logged, the failure is
//! recorded in the [`FrameReport`], and the remaining components of that
//! entity are skipped for the frame. Other entities are unaffected.

use std::collections::{HashMap, VecDeque};

use glam::{Quat, Vec3};

use crate::component::{Component, ComponentRef, ComponentSlot};
use crate::context::Context;
use crate::entity::{Entity, EntityAllocator, EntityId};
use crate::messaging::{Message, MessagingManager, SubscriptionId};
use crate::spatial::SpatialHashGrid;
use crate::EcsError;

/// Maximum component deliveries per queue drain before the rest of the
/// queue is dropped.
pub const DEFAULT_DELIVERY_CAP: usize = 1024;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// A hook that returned an error.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateFailure {
    pub entity: EntityId,
    pub component: &'static str,
    pub error: EcsError,
}

/// Summary of one [`EntityManager::update`] pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Entities visited.
    pub entities_updated: usize,
    /// Component `update` hooks that returned `Ok`.
    pub components_updated: usize,
    /// Failures from `update`, `on_message` and `init_component` hooks that
    /// ran during the pass.
    pub failures: Vec<UpdateFailure>,
}

impl FrameReport {
    /// Whether no hook failed during the pass.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Work waiting for delivery once the running hook returns.
#[derive(Debug)]
pub(crate) enum Envelope {
    /// Fan out to the topic's subscribers.
    Topic(Message),
    /// Deliver to the handlers registered on one entity.
    Entity { target: EntityId, message: Message },
}

// ---------------------------------------------------------------------------
// EntityManager
// ---------------------------------------------------------------------------

/// Owns all entities and drives their components.
pub struct EntityManager {
    allocator: EntityAllocator,
    /// Indexed by `EntityId::index()`.
    slots: Vec<Option<Entity>>,
    /// Registration order; also update order.
    order: Vec<EntityId>,
    by_name: HashMap<String, EntityId>,
    messaging: MessagingManager,
    grid: Option<SpatialHashGrid>,
    queue: VecDeque<Envelope>,
    pending_removals: Vec<EntityId>,
    failures: Vec<UpdateFailure>,
    /// Number of hooks currently on the stack.
    hook_depth: usize,
    updating: bool,
    delivery_cap: usize,
}

impl EntityManager {
    /// Create an empty manager without a spatial grid.
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            slots: Vec::new(),
            order: Vec::new(),
            by_name: HashMap::new(),
            messaging: MessagingManager::new(),
            grid: None,
            queue: VecDeque::new(),
            pending_removals: Vec::new(),
            failures: Vec::new(),
            hook_depth: 0,
            updating: false,
            delivery_cap: DEFAULT_DELIVERY_CAP,
        }
    }

    /// Create an empty manager that owns `grid`.
    pub fn with_grid(grid: SpatialHashGrid) -> Self {
        Self {
            grid: Some(grid),
            ..Self::new()
        }
    }

    /// Change the per-drain delivery cap.
    pub fn set_delivery_cap(&mut self, cap: usize) {
        self.delivery_cap = cap.max(1);
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register `entity`, optionally under `name`.
    ///
    /// An empty name registers the entity anonymously. Names are not required
    /// to be unique; the most recent registration wins name lookup.
    ///
    /// Every attached component's `init_component` hook runs in addition
    /// order before this returns. A failing init is logged and recorded; the
    /// entity stays registered.
    pub fn add(&mut self, mut entity: Entity, name: &str) -> EntityId {
        let id = self.allocator.allocate();
        entity.id = Some(id);
        if !name.is_empty() {
            entity.name = Some(name.to_owned());
            if let Some(previous) = self.by_name.insert(name.to_owned(), id) {
                tracing::debug!(name, %previous, %id, "entity name rebound");
            }
        }
        let component_count = entity.components.len();

        let index = id.index() as usize;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(entity);
        self.order.push(id);
        tracing::debug!(%id, name, components = component_count, "entity registered");

        for slot in 0..component_count {
            self.init_slot(ComponentRef { entity: id, slot });
        }
        self.settle();
        id
    }

    /// Attach a component to an already registered entity and initialise
    /// it. Returns the new slot index.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` is not alive.
    pub fn add_component<C: Component>(&mut self, id: EntityId, component: C) -> Result<usize, EcsError> {
        let entity = self
            .entity_mut(id)
            .ok_or(EcsError::StaleEntity { entity: id })?;
        let slot = entity.push_boxed(Box::new(component));
        self.init_slot(ComponentRef { entity: id, slot });
        self.settle();
        Ok(slot)
    }

    /// Remove an entity: dispose every component in addition order, drop its
    /// topic subscriptions and grid clients, forget its name and retire the
    /// id.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` is not alive.
    pub fn remove(&mut self, id: EntityId) -> Result<(), EcsError> {
        let component_count = self
            .get_by_id(id)
            .ok_or(EcsError::StaleEntity { entity: id })?
            .components
            .len();

        for slot in 0..component_count {
            self.run_hook(ComponentRef { entity: id, slot }, |component, ctx| {
                component.dispose(ctx)
            });
        }

        let unsubscribed = self.messaging.unsubscribe_entity(id);
        let grid_clients = self.grid.as_mut().map_or(0, |grid| grid.remove_entity(id));
        let entity = self.slots.get_mut(id.index() as usize).and_then(Option::take);
        if let Some(name) = entity.as_ref().and_then(|e| e.name.as_deref()) {
            if self.by_name.get(name) == Some(&id) {
                self.by_name.remove(name);
            }
        }
        self.order.retain(|&other| other != id);
        self.pending_removals.retain(|&other| other != id);
        self.queue
            .retain(|envelope| !matches!(envelope, Envelope::Entity { target, .. } if *target == id));
        self.allocator.deallocate(id);

        tracing::debug!(%id, unsubscribed, grid_clients, "entity removed");
        self.settle();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// The entity most recently registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.by_name.get(name).and_then(|&id| self.get_by_id(id))
    }

    /// The entity with this id, if it is alive.
    pub fn get_by_id(&self, id: EntityId) -> Option<&Entity> {
        if !self.allocator.is_alive(id) {
            return None;
        }
        self.slots.get(id.index() as usize)?.as_ref()
    }

    /// Id of the entity registered under `name`.
    pub fn id_of(&self, name: &str) -> Option<EntityId> {
        self.by_name
            .get(name)
            .copied()
            .filter(|&id| self.allocator.is_alive(id))
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.allocator.is_alive(id)
    }

    pub fn entity_count(&self) -> usize {
        self.order.len()
    }

    /// Live entity ids in registration order.
    pub fn entity_ids(&self) -> &[EntityId] {
        &self.order
    }

    /// Every attached component of type `T`, across all entities, in
    /// registration order (and addition order within an entity).
    pub fn filter_components<T: Component>(&self) -> Vec<(EntityId, &T)> {
        self.live_entities()
            .flat_map(|(id, entity)| {
                entity
                    .components
                    .iter()
                    .filter_map(|slot| slot.component.as_deref())
                    .filter_map(|c| c.downcast_ref::<T>())
                    .map(move |c| (id, c))
            })
            .collect()
    }

    /// Like [`filter_components`](Self::filter_components), keyed by
    /// [`Component::name`].
    pub fn filter_components_by_name(&self, name: &str) -> Vec<(EntityId, &dyn Component)> {
        self.live_entities()
            .flat_map(|(id, entity)| {
                entity
                    .components
                    .iter()
                    .filter(move |slot| slot.name == name)
                    .filter_map(|slot| slot.component.as_deref())
                    .map(move |c| (id, c))
            })
            .collect()
    }

    /// First component of type `T` on entity `id`.
    pub fn component<T: Component>(&self, id: EntityId) -> Option<&T> {
        self.get_by_id(id)?.get_component::<T>()
    }

    /// Mutable variant of [`component`](Self::component).
    pub fn component_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        self.entity_mut(id)?.get_component_mut::<T>()
    }

    /// Move an entity from the host side.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` is not alive.
    pub fn set_position(&mut self, id: EntityId, position: Vec3) -> Result<(), EcsError> {
        self.entity_mut(id)
            .ok_or(EcsError::StaleEntity { entity: id })?
            .set_position(position);
        Ok(())
    }

    /// Rotate an entity from the host side.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` is not alive.
    pub fn set_rotation(&mut self, id: EntityId, rotation: Quat) -> Result<(), EcsError> {
        self.entity_mut(id)
            .ok_or(EcsError::StaleEntity { entity: id })?
            .set_rotation(rotation);
        Ok(())
    }

    pub(crate) fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        if !self.allocator.is_alive(id) {
            return None;
        }
        self.slots.get_mut(id.index() as usize)?.as_mut()
    }

    fn live_entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> + '_ {
        self.order
            .iter()
            .filter_map(|&id| self.get_by_id(id).map(|entity| (id, entity)))
    }

    // -----------------------------------------------------------------------
    // Frame
    // -----------------------------------------------------------------------

    /// Run one frame: every live entity in registration order, every
    /// component in addition order.
    ///
    /// `dt` is passed through unchanged; clamping is the caller's job.
    pub fn update(&mut self, dt: f32) -> FrameReport {
        let mut report = FrameReport::default();
        self.updating = true;

        let order = self.order.clone();
        for id in order {
            if !self.allocator.is_alive(id) || self.pending_removals.contains(&id) {
                continue;
            }
            report.entities_updated += 1;
            let component_count = self.get_by_id(id).map_or(0, |e| e.components.len());
            for slot in 0..component_count {
                let target = ComponentRef { entity: id, slot };
                let outcome = self.run_hook(target, |component, ctx| component.update(ctx, dt));
                self.drain_queue();
                match outcome {
                    Some(Ok(())) => report.components_updated += 1,
                    Some(Err(error)) => {
                        self.record_failure(target, error);
                        break;
                    }
                    None => {}
                }
            }
        }

        self.updating = false;
        self.apply_removals();
        report.failures = std::mem::take(&mut self.failures);
        report
    }

    /// Failures recorded by hooks run outside [`update`](Self::update)
    /// (registration, host publishes, removal).
    pub fn take_failures(&mut self) -> Vec<UpdateFailure> {
        std::mem::take(&mut self.failures)
    }

    // -----------------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------------

    /// Publish on a topic from the host. Callbacks and component subscribers
    /// run before this returns, in subscription order.
    pub fn publish(&mut self, topic: &str, payload: serde_json::Value) {
        self.enqueue(Envelope::Topic(Message::new(topic, payload)));
        self.settle();
    }

    /// Deliver an entity-local message to `target`'s registered handlers.
    pub fn broadcast(&mut self, target: EntityId, topic: &str, payload: serde_json::Value) {
        self.enqueue(Envelope::Entity {
            target,
            message: Message::new(topic, payload),
        });
        self.settle();
    }

    /// Subscribe a host callback to `topic`.
    pub fn subscribe_callback<F>(&mut self, topic: &str, callback: F) -> SubscriptionId
    where
        F: FnMut(&Message) + 'static,
    {
        self.messaging.subscribe_callback(topic, callback)
    }

    /// Drop a subscription made with
    /// [`subscribe_callback`](Self::subscribe_callback) or by a component.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownTopic`] if `topic` was never subscribed to.
    pub fn unsubscribe(&mut self, topic: &str, id: SubscriptionId) -> Result<bool, EcsError> {
        self.messaging.unsubscribe(topic, id)
    }

    pub fn messaging(&self) -> &MessagingManager {
        &self.messaging
    }

    pub(crate) fn messaging_mut(&mut self) -> &mut MessagingManager {
        &mut self.messaging
    }

    pub(crate) fn enqueue(&mut self, envelope: Envelope) {
        self.queue.push_back(envelope);
    }

    // -----------------------------------------------------------------------
    // Spatial grid
    // -----------------------------------------------------------------------

    pub fn grid(&self) -> Option<&SpatialHashGrid> {
        self.grid.as_ref()
    }

    pub fn grid_mut(&mut self) -> Option<&mut SpatialHashGrid> {
        self.grid.as_mut()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    pub(crate) fn defer_removal(&mut self, id: EntityId) {
        if self.allocator.is_alive(id) && !self.pending_removals.contains(&id) {
            self.pending_removals.push(id);
        }
    }

    fn slot_mut(&mut self, target: ComponentRef) -> Option<&mut ComponentSlot> {
        self.entity_mut(target.entity)?
            .components
            .get_mut(target.slot)
    }

    fn component_name(&self, target: ComponentRef) -> &'static str {
        self.get_by_id(target.entity)
            .and_then(|e| e.components.get(target.slot))
            .map_or("<detached>", |slot| slot.name)
    }

    /// Detach the target component, run `hook` with a context for it, then
    /// reattach it. `None` if the component is missing or already running.
    fn run_hook<R, F>(&mut self, target: ComponentRef, hook: F) -> Option<R>
    where
        F: FnOnce(&mut dyn Component, &mut Context<'_>) -> R,
    {
        let mut component = self.slot_mut(target)?.component.take()?;
        self.hook_depth += 1;
        let result = {
            let mut ctx = Context::new(self, target);
            hook(&mut *component, &mut ctx)
        };
        self.hook_depth -= 1;
        // The entity cannot be removed while one of its hooks runs; removal
        // requested from the hook is deferred.
        if let Some(slot) = self.slot_mut(target) {
            slot.component = Some(component);
        }
        Some(result)
    }

    fn init_slot(&mut self, target: ComponentRef) {
        if let Some(Err(error)) = self.run_hook(target, |c, ctx| c.init_component(ctx)) {
            self.record_failure(target, error);
        }
    }

    fn record_failure(&mut self, target: ComponentRef, error: EcsError) {
        let component = self.component_name(target);
        tracing::warn!(entity = %target.entity, component, %error, "component hook failed");
        self.failures.push(UpdateFailure {
            entity: target.entity,
            component,
            error,
        });
    }

    /// Deliver queued messages and, outside the frame pass, apply deferred
    /// removals. Does nothing while a hook is on the stack.
    fn settle(&mut self) {
        self.drain_queue();
        if !self.updating {
            self.apply_removals();
        }
    }

    fn apply_removals(&mut self) {
        if self.hook_depth > 0 {
            return;
        }
        while let Some(id) = self.pending_removals.first().copied() {
            self.pending_removals.remove(0);
            if self.allocator.is_alive(id) {
                // Liveness was just checked.
                let _ = self.remove(id);
            }
        }
    }

    fn drain_queue(&mut self) {
        if self.hook_depth > 0 {
            return;
        }
        let mut delivered = 0usize;
        while let Some(envelope) = self.queue.pop_front() {
            let (message, targets) = match envelope {
                Envelope::Topic(message) => {
                    let targets = self.messaging.publish(&message);
                    (message, targets)
                }
                Envelope::Entity { target, message } => {
                    let targets = self.handler_targets(target, &message.topic);
                    (message, targets)
                }
            };
            for target in targets {
                if delivered >= self.delivery_cap {
                    tracing::warn!(
                        cap = self.delivery_cap,
                        topic = %message.topic,
                        dropped = self.queue.len() + 1,
                        "message delivery cap reached, dropping queued messages"
                    );
                    self.queue.clear();
                    return;
                }
                delivered += 1;
                let outcome = self.run_hook(target, |c, ctx| c.on_message(ctx, &message));
                if let Some(Err(error)) = outcome {
                    self.record_failure(target, error);
                }
            }
        }
    }

    fn handler_targets(&self, entity: EntityId, topic: &str) -> Vec<ComponentRef> {
        self.get_by_id(entity)
            .and_then(|e| e.handlers.get(topic))
            .map(|slots| {
                slots
                    .iter()
                    .map(|&slot| ComponentRef { entity, slot })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager")
            .field("entities", &self.order.len())
            .field("named", &self.by_name.len())
            .field("topics", &self.messaging.topics())
            .field("grid", &self.grid.as_ref().map(SpatialHashGrid::len))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    /// Records every hook call.
    struct Probe {
        tag: &'static str,
        log: Log,
        topic: Option<&'static str>,
    }

    impl Probe {
        fn new(tag: &'static str, log: &Log) -> Self {
            Self {
                tag,
                log: Rc::clone(log),
                topic: None,
            }
        }

        fn listening(mut self, topic: &'static str) -> Self {
            self.topic = Some(topic);
            self
        }
    }

    impl Component for Probe {
        fn name(&self) -> &'static str {
            "Probe"
        }

        fn init_component(&mut self, ctx: &mut Context<'_>) -> Result<(), EcsError> {
            self.log.borrow_mut().push(format!("init {}", self.tag));
            if let Some(topic) = self.topic {
                ctx.subscribe(topic);
            }
            Ok(())
        }

        fn on_message(&mut self, _ctx: &mut Context<'_>, message: &Message) -> Result<(), EcsError> {
            self.log
                .borrow_mut()
                .push(format!("{} got {}", self.tag, message.topic));
            Ok(())
        }

        fn dispose(&mut self, _ctx: &mut Context<'_>) {
            self.log.borrow_mut().push(format!("dispose {}", self.tag));
        }
    }

    /// Fails every update.
    struct Faulty;

    impl Component for Faulty {
        fn name(&self) -> &'static str {
            "Faulty"
        }

        fn update(&mut self, _ctx: &mut Context<'_>, _dt: f32) -> Result<(), EcsError> {
            Err(EcsError::ComponentFailure {
                component: "Faulty".to_owned(),
                details: "always".to_owned(),
            })
        }
    }

    /// Counts updates.
    #[derive(Default)]
    struct Counter(u32);

    impl Component for Counter {
        fn name(&self) -> &'static str {
            "Counter"
        }

        fn update(&mut self, _ctx: &mut Context<'_>, _dt: f32) -> Result<(), EcsError> {
            self.0 += 1;
            Ok(())
        }
    }

    /// Re-publishes whatever it receives on the same topic.
    struct Echo;

    impl Component for Echo {
        fn name(&self) -> &'static str {
            "Echo"
        }

        fn init_component(&mut self, ctx: &mut Context<'_>) -> Result<(), EcsError> {
            ctx.subscribe("ping");
            Ok(())
        }

        fn on_message(&mut self, ctx: &mut Context<'_>, message: &Message) -> Result<(), EcsError> {
            ctx.publish(&message.topic, message.payload.clone());
            Ok(())
        }
    }

    /// Despawns its own entity on the first update.
    struct SelfDestruct;

    impl Component for SelfDestruct {
        fn name(&self) -> &'static str {
            "SelfDestruct"
        }

        fn update(&mut self, ctx: &mut Context<'_>, _dt: f32) -> Result<(), EcsError> {
            let id = ctx.entity_id();
            ctx.despawn(id);
            Ok(())
        }
    }

    #[test]
    fn init_runs_in_addition_order_at_registration() {
        let log = Log::default();
        let mut manager = EntityManager::new();
        manager.add(
            Entity::new()
                .with_component(Probe::new("a", &log))
                .with_component(Probe::new("b", &log)),
            "pair",
        );
        assert_eq!(*log.borrow(), vec!["init a", "init b"]);
    }

    #[test]
    fn get_and_filter_components() {
        let mut manager = EntityManager::new();
        let first = manager.add(Entity::new().with_component(Counter::default()), "first");
        manager.add(Entity::new().with_component(Faulty), "");
        let third = manager.add(
            Entity::new()
                .with_component(Counter(5))
                .with_component(Counter(7)),
            "third",
        );

        assert_eq!(manager.get("first").and_then(Entity::id), Some(first));
        assert!(manager.get("missing").is_none());
        assert!(manager.get("").is_none());

        let counters: Vec<(EntityId, u32)> = manager
            .filter_components::<Counter>()
            .into_iter()
            .map(|(id, c)| (id, c.0))
            .collect();
        assert_eq!(counters, vec![(first, 0), (third, 5), (third, 7)]);
        assert_eq!(manager.filter_components_by_name("Faulty").len(), 1);
        assert!(manager.filter_components_by_name("Nope").is_empty());
    }

    #[test]
    fn last_registration_wins_name_lookup() {
        let mut manager = EntityManager::new();
        let old = manager.add(Entity::new(), "dup");
        let new = manager.add(Entity::new(), "dup");
        assert_eq!(manager.id_of("dup"), Some(new));

        // Removing the shadowed entity keeps the newer binding.
        manager.remove(old).unwrap();
        assert_eq!(manager.id_of("dup"), Some(new));
    }

    #[test]
    fn failing_component_skips_rest_of_its_entity_only() {
        let mut manager = EntityManager::new();
        let broken = manager.add(
            Entity::new()
                .with_component(Faulty)
                .with_component(Counter::default()),
            "broken",
        );
        let healthy = manager.add(Entity::new().with_component(Counter::default()), "healthy");

        let report = manager.update(0.016);

        assert_eq!(report.entities_updated, 2);
        assert_eq!(report.components_updated, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entity, broken);
        assert_eq!(report.failures[0].component, "Faulty");
        assert_eq!(manager.component::<Counter>(broken).map(|c| c.0), Some(0));
        assert_eq!(manager.component::<Counter>(healthy).map(|c| c.0), Some(1));
    }

    #[test]
    fn host_publish_reaches_callbacks_then_components() {
        let log = Log::default();
        let mut manager = EntityManager::new();
        manager.add(Entity::new().with_component(Probe::new("c", &log).listening("click")), "");
        let seen = Rc::clone(&log);
        manager.subscribe_callback("click", move |m| {
            seen.borrow_mut().push(format!("host got {}", m.topic));
        });

        manager.publish("click", json!({}));
        manager.publish("nobody-listens", json!({}));

        assert_eq!(*log.borrow(), vec!["init c", "host got click", "c got click"]);
    }

    #[test]
    fn broadcast_reaches_only_registered_handlers_of_target() {
        struct Handler(Log);

        impl Component for Handler {
            fn name(&self) -> &'static str {
                "Handler"
            }

            fn init_component(&mut self, ctx: &mut Context<'_>) -> Result<(), EcsError> {
                ctx.register_handler("health.death");
                ctx.register_handler("health.death");
                Ok(())
            }

            fn on_message(&mut self, ctx: &mut Context<'_>, m: &Message) -> Result<(), EcsError> {
                self.0
                    .borrow_mut()
                    .push(format!("{} {}", ctx.entity_id(), m.topic));
                Ok(())
            }
        }

        let log = Log::default();
        let mut manager = EntityManager::new();
        let a = manager.add(Entity::new().with_component(Handler(Rc::clone(&log))), "a");
        manager.add(Entity::new().with_component(Handler(Rc::clone(&log))), "b");

        manager.broadcast(a, "health.death", json!({}));
        manager.broadcast(a, "unhandled", json!({}));

        assert_eq!(*log.borrow(), vec![format!("{a} health.death")]);
    }

    #[test]
    fn publish_cycle_is_capped() {
        let mut manager = EntityManager::new();
        manager.set_delivery_cap(10);
        manager.add(Entity::new().with_component(Echo), "echo");
        let count = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&count);
        manager.subscribe_callback("ping", move |_| *seen.borrow_mut() += 1);

        manager.publish("ping", json!(1));

        // The host publish and ten echoes reach the callback; the next
        // component delivery hits the cap.
        assert_eq!(*count.borrow(), 11);
        // The queue is empty again, so the next publish starts fresh.
        manager.publish("other", json!(null));
    }

    #[test]
    fn remove_disposes_and_unsubscribes() {
        let log = Log::default();
        let mut manager = EntityManager::new();
        let id = manager.add(
            Entity::new()
                .with_component(Probe::new("x", &log).listening("t"))
                .with_component(Probe::new("y", &log)),
            "gone",
        );
        assert_eq!(manager.messaging().subscriber_count("t"), 1);

        manager.remove(id).unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["init x", "init y", "dispose x", "dispose y"]
        );
        assert_eq!(manager.messaging().subscriber_count("t"), 0);
        assert_eq!(manager.remove(id), Err(EcsError::StaleEntity { entity: id }));
        assert!(manager.get_by_id(id).is_none());
    }

    #[test]
    fn despawn_is_applied_after_the_pass() {
        let mut manager = EntityManager::new();
        let doomed = manager.add(
            Entity::new()
                .with_component(SelfDestruct)
                .with_component(Counter::default()),
            "doomed",
        );
        let other = manager.add(Entity::new().with_component(Counter::default()), "other");

        let report = manager.update(0.016);

        assert_eq!(report.components_updated, 3);
        assert!(!manager.is_alive(doomed));
        assert_eq!(manager.entity_ids(), &[other]);
    }

    /// Despawns a partner entity when disposed.
    struct Tether(EntityId);

    impl Component for Tether {
        fn name(&self) -> &'static str {
            "Tether"
        }

        fn dispose(&mut self, ctx: &mut Context<'_>) {
            ctx.despawn(self.0);
        }
    }

    #[test]
    fn despawn_from_dispose_is_applied_by_host_remove() {
        let log = Log::default();
        let mut manager = EntityManager::new();
        let partner = manager.add(Entity::new().with_component(Probe::new("partner", &log)), "partner");
        let anchor = manager.add(Entity::new().with_component(Tether(partner)), "anchor");

        manager.remove(anchor).unwrap();

        assert!(!manager.is_alive(partner));
        assert!(manager.get("partner").is_none());
        assert_eq!(manager.entity_count(), 0);
        assert_eq!(*log.borrow(), vec!["init partner", "dispose partner"]);
    }

    /// Records which same-typed sibling it can see during its update.
    struct Twin {
        tag: u32,
        seen: Rc<RefCell<Vec<(u32, Option<u32>)>>>,
    }

    impl Component for Twin {
        fn name(&self) -> &'static str {
            "Twin"
        }

        fn update(&mut self, ctx: &mut Context<'_>, _dt: f32) -> Result<(), EcsError> {
            let visible = ctx.sibling::<Twin>().map(|t| t.tag);
            self.seen.borrow_mut().push((self.tag, visible));
            Ok(())
        }
    }

    #[test]
    fn running_component_hides_its_type_from_lookups() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut manager = EntityManager::new();
        manager.add(
            Entity::new()
                .with_component(Twin { tag: 1, seen: Rc::clone(&seen) })
                .with_component(Twin { tag: 2, seen: Rc::clone(&seen) }),
            "twins",
        );

        manager.update(0.016);

        // The first twin's slot is detached while it runs, so its type lookup
        // finds nothing rather than skipping ahead to the second twin.
        assert_eq!(*seen.borrow(), vec![(1, None), (2, Some(1))]);
    }

    #[test]
    fn add_component_after_registration_initialises_immediately() {
        let log = Log::default();
        let mut manager = EntityManager::new();
        let id = manager.add(Entity::new(), "late");
        let slot = manager.add_component(id, Probe::new("late", &log)).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(*log.borrow(), vec!["init late"]);

        manager.remove(id).unwrap();
        assert!(matches!(
            manager.add_component(id, Counter::default()),
            Err(EcsError::StaleEntity { .. })
        ));
    }

    #[test]
    fn host_transform_setters() {
        let mut manager = EntityManager::new();
        let id = manager.add(Entity::new(), "");
        manager.set_position(id, Vec3::new(1.0, 2.0, 3.0)).unwrap();
        manager
            .set_rotation(id, Quat::from_rotation_y(1.0))
            .unwrap();
        let entity = manager.get_by_id(id).unwrap();
        assert_eq!(entity.position(), Vec3::new(1.0, 2.0, 3.0));
        assert!(entity.rotation().abs_diff_eq(Quat::from_rotation_y(1.0), 1e-6));
    }
}
