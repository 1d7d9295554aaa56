//! Atrium ECS -- entity/component runtime with messaging, state machines and
//! a spatial hash grid.
//!
//! Entities are named (or anonymous) containers of behaviour objects called
//! components. An [`EntityManager`](manager::EntityManager) owns every entity
//! and drives one update pass per frame: entities in registration order, and
//! within an entity, components in the order they were added.
//!
//! Components never reach across the object graph through back-pointers.
//! Every lifecycle hook receives a [`Context`](context::Context) that names
//! the owning entity and gives access to the manager, the topic broker and
//! the spatial grid.
//!
//! # Quick Start
//!
//! ```
//! use atrium_ecs::prelude::*;
//!
//! struct Spin {
//!     turns: u32,
//! }
//!
//! impl Component for Spin {
//!     fn name(&self) -> &'static str {
//!         "Spin"
//!     }
//!
//!     fn update(&mut self, _ctx: &mut Context<'_>, _dt: f32) -> Result<(), EcsError> {
//!         self.turns += 1;
//!         Ok(())
//!     }
//! }
//!
//! let mut manager = EntityManager::new();
//! let id = manager.add(Entity::new().with_component(Spin { turns: 0 }), "spinner");
//!
//! manager.update(1.0 / 60.0);
//! manager.update(1.0 / 60.0);
//!
//! let spin = manager.get("spinner").and_then(|e| e.get_component::<Spin>());
//! assert_eq!(spin.map(|s| s.turns), Some(2));
//! assert_eq!(manager.id_of("spinner"), Some(id));
//! ```

#![deny(unsafe_code)]

pub mod asset;
pub mod component;
pub mod context;
pub mod entity;
pub mod fsm;
pub mod manager;
pub mod messaging;
pub mod spatial;
pub mod spatial_controller;

pub use glam;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by runtime operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist (stale generation or never allocated).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::EntityId },

    /// A state machine was asked to enter a state it does not know.
    #[error("unknown state '{state}'. Registered states: [{registered}]")]
    UnknownState { state: String, registered: String },

    /// A state with this name was already added to the machine.
    #[error("state '{state}' is already registered")]
    DuplicateState { state: String },

    /// The target state reported that its dependencies are not loaded yet.
    #[error("state '{state}' is not ready to be entered")]
    StateNotReady { state: String },

    /// `unsubscribe` named a topic nobody ever subscribed to.
    #[error("topic '{topic}' has no subscription list")]
    UnknownTopic { topic: String },

    /// The spatial grid was configured with unusable bounds or cell counts.
    #[error("invalid spatial grid: {details}")]
    InvalidGrid { details: String },

    /// An asynchronously loaded asset could not be produced.
    #[error(transparent)]
    Asset(#[from] asset::AssetError),

    /// A component reported a failure from one of its hooks.
    #[error("component '{component}' failed: {details}")]
    ComponentFailure { component: String, details: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::asset::{AssetError, AssetPoll, AssetSender, PendingAsset};
    pub use crate::component::{Component, ComponentRef};
    pub use crate::context::Context;
    pub use crate::entity::{Entity, EntityId};
    pub use crate::fsm::{FiniteStateMachine, State};
    pub use crate::manager::{EntityManager, FrameReport, UpdateFailure};
    pub use crate::messaging::{Message, MessagingManager, Subscriber, SubscriptionId};
    pub use crate::spatial::{planar, ClientHandle, GridBounds, SpatialHashGrid};
    pub use crate::spatial_controller::SpatialGridController;
    pub use crate::EcsError;
    pub use glam::{Quat, Vec2, Vec3};
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
