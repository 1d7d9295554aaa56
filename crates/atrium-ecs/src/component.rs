//! The [`Component`] trait and the bookkeeping an [`Entity`](crate::entity::Entity)
//! keeps for each attached component.
//!
//! Lookup is keyed by the concrete Rust type (`TypeId`) for typed access and
//! by [`Component::name`] for string discriminants coming from scene data.
//! Both return the first match in addition order.

use std::any::{Any, TypeId};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::entity::EntityId;
use crate::messaging::Message;
use crate::EcsError;

// ---------------------------------------------------------------------------
// AsAny
// ---------------------------------------------------------------------------

/// Upcast helper so `dyn Component` can be downcast to its concrete type.
///
/// Implemented for every `'static` type; never implement it by hand.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A unit of behaviour attached to exactly one entity.
///
/// Every hook except [`name`](Self::name) has a no-op default. Hooks receive
/// a [`Context`] naming the owning entity; a component never stores
/// references to its entity or manager.
///
/// Lifecycle:
///
/// 1. constructed by the caller (may start an asynchronous load),
/// 2. [`init_component`](Self::init_component) once, when the entity is
///    registered (or immediately, for components attached later),
/// 3. [`update`](Self::update) every frame while the entity is alive,
/// 4. [`on_message`](Self::on_message) for each topic or entity-local message
///    it subscribed to,
/// 5. [`dispose`](Self::dispose) when the entity is removed. Topic
///    subscriptions are dropped by the manager after `dispose` returns.
pub trait Component: AsAny {
    /// Discriminant used by name-based lookup (`"MonitorComponent"`, ...).
    fn name(&self) -> &'static str;

    /// Called once all sibling components are attached.
    fn init_component(&mut self, _ctx: &mut Context<'_>) -> Result<(), EcsError> {
        Ok(())
    }

    /// Called once per frame with the clamped frame time in seconds.
    fn update(&mut self, _ctx: &mut Context<'_>, _dt: f32) -> Result<(), EcsError> {
        Ok(())
    }

    /// Called for every message routed to this component.
    fn on_message(&mut self, _ctx: &mut Context<'_>, _message: &Message) -> Result<(), EcsError> {
        Ok(())
    }

    /// Called before the owning entity is dropped.
    fn dispose(&mut self, _ctx: &mut Context<'_>) {}
}

impl dyn Component {
    /// Downcast to the concrete component type.
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Mutable downcast to the concrete component type.
    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Whether the concrete type is `T`.
    pub fn is<T: Component>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

impl fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.name())
    }
}

// ---------------------------------------------------------------------------
// ComponentRef
// ---------------------------------------------------------------------------

/// Address of one attached component: the owning entity plus the slot index.
///
/// Slot indices never change while the entity lives, so a `ComponentRef` is
/// a stable delivery target for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentRef {
    pub entity: EntityId,
    pub slot: usize,
}

// ---------------------------------------------------------------------------
// ComponentSlot
// ---------------------------------------------------------------------------

/// One attached component plus its cached lookup keys.
///
/// `component` is `None` only while one of the component's own hooks runs.
pub(crate) struct ComponentSlot {
    pub(crate) name: &'static str,
    pub(crate) type_id: TypeId,
    pub(crate) component: Option<Box<dyn Component>>,
}

impl ComponentSlot {
    pub(crate) fn new(component: Box<dyn Component>) -> Self {
        Self {
            name: component.name(),
            type_id: component.as_ref().as_any().type_id(),
            component: Some(component),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Beacon(u8);

    impl Component for Beacon {
        fn name(&self) -> &'static str {
            "Beacon"
        }
    }

    struct Marker;

    impl Component for Marker {
        fn name(&self) -> &'static str {
            "Marker"
        }
    }

    #[test]
    fn slot_caches_concrete_type_and_name() {
        let slot = ComponentSlot::new(Box::new(Beacon(3)));
        assert_eq!(slot.name, "Beacon");
        assert_eq!(slot.type_id, TypeId::of::<Beacon>());
    }

    #[test]
    fn downcast_through_trait_object() {
        let mut boxed: Box<dyn Component> = Box::new(Beacon(1));
        assert!(boxed.is::<Beacon>());
        assert!(!boxed.is::<Marker>());
        boxed.downcast_mut::<Beacon>().unwrap().0 = 9;
        assert_eq!(boxed.downcast_ref::<Beacon>().map(|b| b.0), Some(9));
        assert!(boxed.downcast_ref::<Marker>().is_none());
    }

    #[test]
    fn debug_prints_name() {
        let boxed: Box<dyn Component> = Box::new(Marker);
        assert_eq!(format!("{:?}", boxed.as_ref()), "Component(Marker)");
    }
}
