//! Hit points and the death notification.
//!
//! Damage arrives as an entity-local [`DAMAGE_TOPIC`] message with an
//! `{"amount": f}` payload, or directly through [`Health::damage`]. When
//! health first reaches zero the entity receives a [`DEATH_TOPIC`] message,
//! which the character controller turns into its terminal `death` state.

use atrium_ecs::prelude::*;
use serde_json::json;

/// Entity-local topic sent once when health reaches zero.
pub const DEATH_TOPIC: &str = "health.death";
/// Entity-local topic carrying `{"amount": f}` damage.
pub const DAMAGE_TOPIC: &str = "health.damage";

#[derive(Debug, Clone, PartialEq)]
pub struct Health {
    current: f32,
    max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn is_dead(&self) -> bool {
        self.current <= 0.0
    }

    /// Subtract `amount`, flooring at zero. Returns `true` only on the call
    /// that kills. Non-positive or non-finite amounts are ignored.
    pub fn apply_damage(&mut self, amount: f32) -> bool {
        if self.is_dead() || !amount.is_finite() || amount <= 0.0 {
            return false;
        }
        self.current = (self.current - amount).max(0.0);
        self.is_dead()
    }

    /// [`apply_damage`](Self::apply_damage), broadcasting [`DEATH_TOPIC`] to
    /// the owning entity on death.
    pub fn damage(&mut self, ctx: &mut Context<'_>, amount: f32) -> bool {
        let died = self.apply_damage(amount);
        if died {
            tracing::debug!(entity = %ctx.entity_id(), "entity died");
            ctx.broadcast(DEATH_TOPIC, json!({}));
        }
        died
    }
}

impl Component for Health {
    fn name(&self) -> &'static str {
        "HealthComponent"
    }

    fn init_component(&mut self, ctx: &mut Context<'_>) -> Result<(), EcsError> {
        ctx.register_handler(DAMAGE_TOPIC);
        Ok(())
    }

    fn on_message(&mut self, ctx: &mut Context<'_>, message: &Message) -> Result<(), EcsError> {
        if message.topic != DAMAGE_TOPIC {
            return Ok(());
        }
        let amount = message
            .payload
            .get("amount")
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| EcsError::ComponentFailure {
                component: "HealthComponent".to_owned(),
                details: format!("damage payload without numeric amount: {}", message.payload),
            })?;
        self.damage(ctx, amount as f32);
        Ok(())
    }
}

/// Whether `id` is a live entity that is not dead. Entities without a
/// [`Health`] component count as alive.
pub fn is_alive(manager: &EntityManager, id: EntityId) -> bool {
    manager
        .get_by_id(id)
        .is_some_and(|e| e.get_component::<Health>().map_or(true, |h| !h.is_dead()))
}
