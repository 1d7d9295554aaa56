//! Component that keeps its entity registered in the manager's spatial grid.
//!
//! Add it *after* whatever component moves the entity: components update in
//! addition order, so the controller then sees this frame's position.

use glam::Vec2;

use crate::component::Component;
use crate::context::Context;
use crate::entity::EntityId;
use crate::spatial::{planar, ClientHandle};
use crate::EcsError;

/// Grid membership for one entity.
///
/// Without a grid on the manager the controller stays inert.
#[derive(Debug, Clone)]
pub struct SpatialGridController {
    handle: Option<ClientHandle>,
    dimensions: Vec2,
}

impl SpatialGridController {
    /// A controller registering a unit-sized client.
    pub fn new() -> Self {
        Self::with_dimensions(Vec2::ONE)
    }

    /// A controller registering a client with the given footprint.
    pub fn with_dimensions(dimensions: Vec2) -> Self {
        Self {
            handle: None,
            dimensions,
        }
    }

    /// Grid handle, once registered.
    pub fn handle(&self) -> Option<ClientHandle> {
        self.handle
    }

    /// Entities within `radius` of the owning entity, excluding the owner.
    pub fn find_nearby_entities(&self, ctx: &Context<'_>, radius: f32) -> Vec<EntityId> {
        let own = ctx.entity_id();
        ctx.grid()
            .map(|grid| {
                grid.find_nearby(planar(ctx.position()), radius)
                    .into_iter()
                    .filter(|&id| id != own)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for SpatialGridController {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for SpatialGridController {
    fn name(&self) -> &'static str {
        "SpatialGridController"
    }

    fn init_component(&mut self, ctx: &mut Context<'_>) -> Result<(), EcsError> {
        let entity = ctx.entity_id();
        let position = planar(ctx.position());
        let dimensions = self.dimensions;
        self.handle = ctx
            .grid_mut()
            .map(|grid| grid.new_client(entity, position, dimensions));
        Ok(())
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f32) -> Result<(), EcsError> {
        let position = planar(ctx.position());
        if let (Some(handle), Some(grid)) = (self.handle, ctx.grid_mut()) {
            grid.update_position(handle, position);
        }
        Ok(())
    }

    fn dispose(&mut self, ctx: &mut Context<'_>) {
        if let (Some(handle), Some(grid)) = (self.handle.take(), ctx.grid_mut()) {
            grid.remove_client(handle);
        }
    }
}
