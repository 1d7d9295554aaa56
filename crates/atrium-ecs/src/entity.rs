//! Entity handles, handle allocation, and the [`Entity`] container.
//!
//! An [`EntityId`] is a 64-bit handle that packs a *generation* counter in the
//! high 32 bits and an *index* in the low 32 bits. The generation is bumped
//! every time an entity is removed from its manager, so handles held by other
//! components go stale instead of silently pointing at a newcomer.

use std::any::TypeId;
use std::collections::{HashMap, VecDeque};
use std::fmt;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentSlot};

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A generational entity identifier.
///
/// Layout: `[generation: u32 | index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Construct an `EntityId` from an index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The index portion (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Allocates and recycles [`EntityId`]s with generational tracking.
///
/// Free indices are kept in a FIFO queue so that generations are spread out
/// over time rather than concentrated on a hot index.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    /// Current generation for each index slot.
    generations: Vec<u32>,
    /// Whether the slot is currently alive.
    alive: Vec<bool>,
    /// Free-list of recyclable indices (FIFO queue).
    free_indices: VecDeque<u32>,
}

impl EntityAllocator {
    /// Create a new, empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh [`EntityId`].
    ///
    /// If a recycled index is available it will be reused with an incremented
    /// generation; otherwise a brand-new index is created.
    pub fn allocate(&mut self) -> EntityId {
        if let Some(index) = self.free_indices.pop_front() {
            // Generation was already bumped on deallocation.
            self.alive[index as usize] = true;
            EntityId::new(index, self.generations[index as usize])
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            self.alive.push(true);
            EntityId::new(index, 0)
        }
    }

    /// Deallocate an entity, incrementing the generation for that index so
    /// that any outstanding handles become stale.
    ///
    /// Returns `true` if the entity was alive and is now released,
    /// `false` if it was already dead or had a stale generation.
    pub fn deallocate(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let idx = id.index() as usize;
        self.alive[idx] = false;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.free_indices.push_back(id.index());
        true
    }

    /// Returns `true` if `id` refers to a currently alive entity whose
    /// generation matches the allocator's current generation for that index.
    pub fn is_alive(&self, id: EntityId) -> bool {
        let idx = id.index() as usize;
        if idx >= self.generations.len() {
            return false;
        }
        self.alive[idx] && self.generations[idx] == id.generation()
    }

    /// Total number of currently alive entities.
    pub fn alive_count(&self) -> usize {
        self.alive.iter().filter(|&&a| a).count()
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A container of components plus the transform they share.
///
/// Entities are built empty, filled with [`with_component`](Self::with_component)
/// and then handed to an [`EntityManager`](crate::manager::EntityManager),
/// which assigns the id and runs every component's `init_component` hook in
/// addition order. Update order follows addition order as well, so a
/// component that reads the transform after movement must be added after the
/// component that moves the entity.
pub struct Entity {
    pub(crate) id: Option<EntityId>,
    pub(crate) name: Option<String>,
    position: Vec3,
    rotation: Quat,
    pub(crate) components: Vec<ComponentSlot>,
    /// Entity-local topic -> component slots that registered a handler.
    pub(crate) handlers: HashMap<String, Vec<usize>>,
}

impl Entity {
    /// Create an empty entity at the origin with identity rotation.
    pub fn new() -> Self {
        Self {
            id: None,
            name: None,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            components: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Builder-style [`add_component`](Self::add_component).
    pub fn with_component<C: Component>(mut self, component: C) -> Self {
        self.add_component(component);
        self
    }

    /// Builder-style [`set_position`](Self::set_position).
    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Append a component. Its slot index is its position in update order.
    ///
    /// Components added here are initialised when the entity is registered.
    /// Use [`EntityManager::add_component`](crate::manager::EntityManager::add_component)
    /// to attach to an entity that is already registered.
    pub fn add_component<C: Component>(&mut self, component: C) -> usize {
        self.push_boxed(Box::new(component))
    }

    pub(crate) fn push_boxed(&mut self, component: Box<dyn Component>) -> usize {
        self.components.push(ComponentSlot::new(component));
        self.components.len() - 1
    }

    /// The id assigned at registration, `None` before that.
    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    /// The name given at registration. Anonymous entities return `None`.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Current world position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Current world orientation.
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Overwrite the world position.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Overwrite the world orientation.
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
    }

    /// First attached component of type `T`.
    ///
    /// Absence is a normal outcome. A component whose hook is currently
    /// running is not visible to lookups made from inside that hook.
    pub fn get_component<T: Component>(&self) -> Option<&T> {
        let wanted = TypeId::of::<T>();
        self.components
            .iter()
            .find(|slot| slot.type_id == wanted)?
            .component
            .as_deref()?
            .downcast_ref::<T>()
    }

    /// Mutable variant of [`get_component`](Self::get_component).
    pub fn get_component_mut<T: Component>(&mut self) -> Option<&mut T> {
        let wanted = TypeId::of::<T>();
        self.components
            .iter_mut()
            .find(|slot| slot.type_id == wanted)?
            .component
            .as_deref_mut()?
            .downcast_mut::<T>()
    }

    /// First attached component whose [`Component::name`] equals `name`.
    pub fn get_component_by_name(&self, name: &str) -> Option<&dyn Component> {
        self.components
            .iter()
            .find(|slot| slot.name == name)?
            .component
            .as_deref()
    }

    /// Whether a component of type `T` is attached.
    pub fn has_component<T: Component>(&self) -> bool {
        let wanted = TypeId::of::<T>();
        self.components.iter().any(|slot| slot.type_id == wanted)
    }

    /// Names of attached components in update order.
    pub fn component_names(&self) -> Vec<&'static str> {
        self.components.iter().map(|slot| slot.name).collect()
    }

    /// Number of attached components.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub(crate) fn component_at(&self, slot: usize) -> Option<&dyn Component> {
        self.components.get(slot)?.component.as_deref()
    }

    pub(crate) fn component_at_mut(&mut self, slot: usize) -> Option<&mut dyn Component> {
        self.components.get_mut(slot)?.component.as_deref_mut()
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("position", &self.position)
            .field("rotation", &self.rotation)
            .field("components", &self.component_names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EcsError;
    use crate::context::Context;

    struct Lamp {
        lit: bool,
    }

    impl Component for Lamp {
        fn name(&self) -> &'static str {
            "Lamp"
        }
    }

    struct Switch;

    impl Component for Switch {
        fn name(&self) -> &'static str {
            "Switch"
        }

        fn update(&mut self, _ctx: &mut Context<'_>, _dt: f32) -> Result<(), EcsError> {
            Ok(())
        }
    }

    #[test]
    fn allocate_unique_ids() {
        let mut alloc = EntityAllocator::new();
        let ids: Vec<EntityId> = (0..100).map(|_| alloc.allocate()).collect();
        let mut indices: Vec<u32> = ids.iter().map(|id| id.index()).collect();
        indices.sort();
        indices.dedup();
        assert_eq!(indices.len(), 100);
    }

    #[test]
    fn generation_increments_on_recycle() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.allocate();
        assert_eq!(e0.generation(), 0);
        assert!(alloc.deallocate(e0));
        let e1 = alloc.allocate();
        assert_eq!(e1.index(), e0.index());
        assert_eq!(e1.generation(), 1);
        assert!(!alloc.is_alive(e0), "stale ID still not alive after recycle");
    }

    #[test]
    fn double_deallocate_returns_false() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        assert!(alloc.deallocate(e));
        assert!(!alloc.deallocate(e));
        assert_eq!(alloc.alive_count(), 0);
    }

    #[test]
    fn entity_id_roundtrip_and_display() {
        let id = EntityId::new(42, 7);
        assert_eq!(id.index(), 42);
        assert_eq!(id.generation(), 7);
        assert_eq!(EntityId::from_raw(id.to_raw()), id);
        assert_eq!(id.to_string(), "42v7");
        assert_eq!(format!("{id:?}"), "EntityId(42v7)");
    }

    #[test]
    fn typed_lookup_returns_first_match() {
        let entity = Entity::new()
            .with_component(Switch)
            .with_component(Lamp { lit: true })
            .with_component(Lamp { lit: false });

        let lamp = entity.get_component::<Lamp>().unwrap();
        assert!(lamp.lit);
        assert!(entity.has_component::<Switch>());
        assert_eq!(entity.component_names(), vec!["Switch", "Lamp", "Lamp"]);
    }

    #[test]
    fn lookup_by_name_and_absence() {
        let mut entity = Entity::new().with_component(Lamp { lit: false });
        assert!(entity.get_component_by_name("Lamp").is_some());
        assert!(entity.get_component_by_name("Switch").is_none());
        assert!(entity.get_component::<Switch>().is_none());

        entity.get_component_mut::<Lamp>().unwrap().lit = true;
        assert!(entity.get_component::<Lamp>().unwrap().lit);
    }

    #[test]
    fn unregistered_entity_has_no_id_or_name() {
        let entity = Entity::new().at(Vec3::new(1.0, 0.0, 2.0));
        assert_eq!(entity.id(), None);
        assert_eq!(entity.name(), None);
        assert_eq!(entity.position(), Vec3::new(1.0, 0.0, 2.0));
        assert_eq!(entity.rotation(), Quat::IDENTITY);
    }
}
