//! Character locomotion: the animation-gated state machine and the
//! accept-or-reject movement integrator.
//!
//! A [`CharacterController`] starts without a current state. Its animation
//! clips arrive through a [`PendingAsset`]; until they do, `update` does
//! nothing. Once loaded it enters `idle` and from then on:
//!
//! - the input snapshot of the sibling [`CharacterInput`] drives the state
//!   machine (`idle`, `walk`, `run`, `attack`, `dance`),
//! - in `idle`, `walk` and `run` velocity is integrated and a candidate
//!   position computed,
//! - the candidate is rejected outright if another living entity is within
//!   `block_distance` of it, or a forward probe from it hits a
//!   [`Collidable`] within `ray_max_distance`.
//!
//! A [`DEATH_TOPIC`] message on the owning entity moves the controller to
//! `death`, which it never leaves.

use std::collections::HashMap;
use std::f32::consts::PI;

use atrium_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::LocomotionConfig;
use crate::geometry::Ray;
use crate::health::{self, DEATH_TOPIC};
use crate::input::{CharacterInput, InputState};
use crate::props::Collidable;

/// Entity-local topic carrying `{action, time}` for the current state.
pub const ACTION_TOPIC: &str = "player.action";

/// Height above the candidate position the forward probe starts from.
const PROBE_HEIGHT: f32 = 1.0;

pub const IDLE: &str = "idle";
pub const WALK: &str = "walk";
pub const RUN: &str = "run";
pub const ATTACK: &str = "attack";
pub const DANCE: &str = "dance";
pub const DEATH: &str = "death";

// ---------------------------------------------------------------------------
// Animation data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimationClip {
    /// Length in seconds.
    pub duration: f32,
}

/// Clips by state name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationLibrary {
    clips: HashMap<String, AnimationClip>,
}

impl AnimationLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clip for every locomotion state.
    pub fn standard() -> Self {
        Self::new()
            .with_clip(IDLE, 2.0)
            .with_clip(WALK, 1.0)
            .with_clip(RUN, 0.7)
            .with_clip(ATTACK, 1.2)
            .with_clip(DANCE, 4.0)
            .with_clip(DEATH, 2.5)
    }

    pub fn with_clip(mut self, name: &str, duration: f32) -> Self {
        self.insert(name, AnimationClip { duration });
        self
    }

    pub fn insert(&mut self, name: &str, clip: AnimationClip) {
        self.clips.insert(name.to_owned(), clip);
    }

    pub fn get(&self, name: &str) -> Option<&AnimationClip> {
        self.clips.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clips.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

/// Data the locomotion states share.
#[derive(Debug, Default)]
pub struct LocomotionProxy {
    pub animations: Option<AnimationLibrary>,
    pub input: InputState,
    /// Seconds spent in the current one-shot clip.
    pub clip_time: f32,
}

impl LocomotionProxy {
    fn has_clip(&self, name: &str) -> bool {
        self.animations.as_ref().is_some_and(|a| a.contains(name))
    }

    fn clip_duration(&self, name: &str) -> f32 {
        self.animations
            .as_ref()
            .and_then(|a| a.get(name))
            .map_or(0.0, |c| c.duration)
    }
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

struct IdleState;

impl State<LocomotionProxy> for IdleState {
    fn name(&self) -> &'static str {
        IDLE
    }

    fn is_ready(&self, proxy: &LocomotionProxy) -> bool {
        proxy.has_clip(IDLE)
    }

    fn update(&mut self, proxy: &mut LocomotionProxy, _dt: f32) -> Option<&'static str> {
        let input = proxy.input;
        if input.dance {
            Some(DANCE)
        } else if input.is_moving() {
            Some(if input.shift { RUN } else { WALK })
        } else if input.action {
            Some(ATTACK)
        } else {
            None
        }
    }
}

/// `walk` or `run`; the two differ only in which shift state keeps them.
/// The action key interrupts either with an attack.
struct MoveState {
    name: &'static str,
    running: bool,
}

impl State<LocomotionProxy> for MoveState {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_ready(&self, proxy: &LocomotionProxy) -> bool {
        proxy.has_clip(self.name)
    }

    fn update(&mut self, proxy: &mut LocomotionProxy, _dt: f32) -> Option<&'static str> {
        let input = proxy.input;
        if input.action {
            Some(ATTACK)
        } else if !input.is_moving() {
            Some(IDLE)
        } else if input.shift != self.running {
            Some(if input.shift { RUN } else { WALK })
        } else {
            None
        }
    }
}

/// Plays its clip once, then returns to `idle`.
struct OneShotState(&'static str);

impl State<LocomotionProxy> for OneShotState {
    fn name(&self) -> &'static str {
        self.0
    }

    fn is_ready(&self, proxy: &LocomotionProxy) -> bool {
        proxy.has_clip(self.0)
    }

    fn enter(&mut self, proxy: &mut LocomotionProxy, _previous: Option<&'static str>) {
        proxy.clip_time = 0.0;
    }

    fn update(&mut self, proxy: &mut LocomotionProxy, dt: f32) -> Option<&'static str> {
        proxy.clip_time += dt;
        (proxy.clip_time >= proxy.clip_duration(self.0)).then_some(IDLE)
    }
}

/// Terminal. Enterable as soon as any animations are loaded.
struct DeathState;

impl State<LocomotionProxy> for DeathState {
    fn name(&self) -> &'static str {
        DEATH
    }

    fn is_ready(&self, proxy: &LocomotionProxy) -> bool {
        proxy.animations.is_some()
    }

    fn enter(&mut self, proxy: &mut LocomotionProxy, _previous: Option<&'static str>) {
        proxy.clip_time = 0.0;
    }

    fn update(&mut self, proxy: &mut LocomotionProxy, dt: f32) -> Option<&'static str> {
        proxy.clip_time += dt;
        None
    }
}

// ---------------------------------------------------------------------------
// CharacterController
// ---------------------------------------------------------------------------

/// Moves its entity from the sibling [`CharacterInput`].
///
/// Add it before the entity's [`SpatialGridController`] so the grid sees
/// the position this controller wrote.
pub struct CharacterController {
    config: LocomotionConfig,
    fsm: FiniteStateMachine<LocomotionProxy>,
    proxy: LocomotionProxy,
    animations: PendingAsset<AnimationLibrary>,
    load_error: Option<AssetError>,
    velocity: Vec3,
    dead: bool,
}

impl CharacterController {
    pub fn new(
        config: LocomotionConfig,
        animations: PendingAsset<AnimationLibrary>,
    ) -> Result<Self, EcsError> {
        let fsm = FiniteStateMachine::new()
            .with_state(IdleState)?
            .with_state(MoveState {
                name: WALK,
                running: false,
            })?
            .with_state(MoveState {
                name: RUN,
                running: true,
            })?
            .with_state(OneShotState(ATTACK))?
            .with_state(OneShotState(DANCE))?
            .with_state(DeathState)?;
        Ok(Self {
            config,
            fsm,
            proxy: LocomotionProxy::default(),
            animations,
            load_error: None,
            velocity: Vec3::ZERO,
            dead: false,
        })
    }

    /// Current locomotion state; `None` until the animations are loaded.
    pub fn state(&self) -> Option<&'static str> {
        self.fsm.current_state()
    }

    pub fn is_ready(&self) -> bool {
        self.proxy.animations.is_some()
    }

    pub fn load_error(&self) -> Option<&AssetError> {
        self.load_error.as_ref()
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Move the state machine to `name`.
    ///
    /// Returns `Ok(false)` without transitioning once the character is dead:
    /// `death` is terminal.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownState`] or [`EcsError::StateNotReady`] from the
    /// state machine.
    pub fn request_state(&mut self, name: &str) -> Result<bool, EcsError> {
        if self.dead && name != DEATH {
            tracing::debug!(requested = name, "transition out of death refused");
            return Ok(false);
        }
        self.fsm.set_state(name, &mut self.proxy)?;
        Ok(true)
    }

    fn poll_animations(&mut self) -> Result<(), EcsError> {
        match self.animations.poll() {
            AssetPoll::Ready(library) => {
                tracing::debug!(asset = self.animations.asset(), clips = library.len(), "animations loaded");
                self.proxy.animations = Some(library);
                let first = if self.dead { DEATH } else { IDLE };
                self.fsm.set_state(first, &mut self.proxy)
            }
            AssetPoll::Failed(error) => {
                if self.load_error.is_none() {
                    tracing::warn!(%error, "character stays inert without animations");
                    self.load_error = Some(error);
                }
                Ok(())
            }
            AssetPoll::Pending | AssetPoll::Delivered => Ok(()),
        }
    }

    fn integrate(&mut self, ctx: &mut Context<'_>, input: InputState, dt: f32) {
        let config = &self.config;
        let mut velocity = self.velocity;

        let mut frame_deceleration = velocity * config.deceleration * dt;
        frame_deceleration.z =
            frame_deceleration.z.signum() * frame_deceleration.z.abs().min(velocity.z.abs());
        velocity += frame_deceleration;

        let acceleration = if input.shift {
            config.acceleration * config.run_multiplier
        } else {
            config.acceleration
        };
        if input.forward {
            velocity.z += acceleration.z * dt;
        }
        if input.backward {
            velocity.z -= acceleration.z * dt;
        }

        let turn = 4.0 * PI * dt * config.acceleration.y;
        let mut rotation = ctx.rotation();
        if input.left {
            rotation *= Quat::from_axis_angle(Vec3::Y, turn);
        }
        if input.right {
            rotation *= Quat::from_axis_angle(Vec3::Y, -turn);
        }
        let rotation = rotation.normalize();
        ctx.set_rotation(rotation);
        self.velocity = velocity;

        let forward = (rotation * Vec3::Z).normalize() * (velocity.z * dt);
        let sideways = (rotation * Vec3::X).normalize() * (velocity.x * dt);
        let candidate = ctx.position() + forward + sideways;

        if self.is_blocked(ctx, candidate, forward) {
            tracing::trace!(entity = %ctx.entity_id(), "movement blocked");
            return;
        }
        ctx.set_position(candidate);
    }

    /// Whether moving to `candidate` along `forward` collides with a living
    /// neighbour or a static collidable.
    fn is_blocked(&self, ctx: &Context<'_>, candidate: Vec3, forward: Vec3) -> bool {
        let manager = ctx.manager();
        let target = planar(candidate);
        let neighbour_blocks = ctx
            .sibling::<SpatialGridController>()
            .map(|grid| grid.find_nearby_entities(ctx, self.config.nearby_radius))
            .unwrap_or_default()
            .into_iter()
            .filter(|&id| health::is_alive(manager, id))
            .filter_map(|id| manager.get_by_id(id))
            .any(|e| planar(e.position()).distance(target) <= self.config.block_distance);
        if neighbour_blocks {
            return true;
        }

        let origin = candidate + Vec3::Y * PROBE_HEIGHT;
        let Some(probe) = Ray::new(origin, forward) else {
            return false;
        };
        manager
            .filter_components::<Collidable>()
            .iter()
            .any(|(_, c)| c.ray_hit(&probe, self.config.ray_max_distance).is_some())
    }
}

impl Component for CharacterController {
    fn name(&self) -> &'static str {
        "CharacterController"
    }

    fn init_component(&mut self, ctx: &mut Context<'_>) -> Result<(), EcsError> {
        ctx.register_handler(DEATH_TOPIC);
        Ok(())
    }

    fn on_message(&mut self, _ctx: &mut Context<'_>, message: &Message) -> Result<(), EcsError> {
        if message.topic != DEATH_TOPIC || self.dead {
            return Ok(());
        }
        self.dead = true;
        self.velocity = Vec3::ZERO;
        if self.is_ready() {
            self.fsm.set_state(DEATH, &mut self.proxy)?;
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut Context<'_>, dt: f32) -> Result<(), EcsError> {
        self.poll_animations()?;
        if self.fsm.current_state().is_none() {
            return Ok(());
        }
        let Some(input) = ctx.sibling::<CharacterInput>().map(|i| *i.state()) else {
            return Ok(());
        };
        self.proxy.input = input;

        match self.fsm.update(dt, &mut self.proxy) {
            Err(EcsError::StateNotReady { state }) => {
                tracing::debug!(state = %state, "missing clip; staying in current state");
            }
            other => other?,
        }

        let Some(state) = self.fsm.current_state() else {
            return Ok(());
        };
        ctx.broadcast(
            ACTION_TOPIC,
            json!({ "action": state, "time": self.proxy.clip_time }),
        );

        if matches!(state, IDLE | WALK | RUN) {
            self.integrate(ctx, input, dt);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy_with(library: AnimationLibrary, input: InputState) -> LocomotionProxy {
        LocomotionProxy {
            animations: Some(library),
            input,
            clip_time: 0.0,
        }
    }

    #[test]
    fn idle_prefers_dance_then_movement_then_action() {
        let mut proxy = proxy_with(
            AnimationLibrary::standard(),
            InputState {
                dance: true,
                forward: true,
                action: true,
                ..InputState::default()
            },
        );
        assert_eq!(IdleState.update(&mut proxy, 0.1), Some(DANCE));
        proxy.input.dance = false;
        assert_eq!(IdleState.update(&mut proxy, 0.1), Some(WALK));
        proxy.input.shift = true;
        assert_eq!(IdleState.update(&mut proxy, 0.1), Some(RUN));
        proxy.input.forward = false;
        assert_eq!(IdleState.update(&mut proxy, 0.1), Some(ATTACK));
    }

    #[test]
    fn walk_and_run_switch_on_shift() {
        let mut walk = MoveState {
            name: WALK,
            running: false,
        };
        let mut proxy = proxy_with(
            AnimationLibrary::standard(),
            InputState {
                forward: true,
                ..InputState::default()
            },
        );
        assert_eq!(walk.update(&mut proxy, 0.1), None);
        proxy.input.shift = true;
        assert_eq!(walk.update(&mut proxy, 0.1), Some(RUN));
        proxy.input.forward = false;
        assert_eq!(walk.update(&mut proxy, 0.1), Some(IDLE));
        proxy.input.action = true;
        assert_eq!(walk.update(&mut proxy, 0.1), Some(ATTACK));
    }

    #[test]
    fn one_shot_returns_to_idle_after_its_clip() {
        let mut attack = OneShotState(ATTACK);
        let mut proxy = proxy_with(AnimationLibrary::new().with_clip(ATTACK, 0.5), InputState::default());
        attack.enter(&mut proxy, Some(IDLE));
        assert_eq!(attack.update(&mut proxy, 0.3), None);
        assert_eq!(attack.update(&mut proxy, 0.3), Some(IDLE));
    }

    #[test]
    fn readiness_follows_loaded_clips() {
        let mut proxy = LocomotionProxy::default();
        assert!(!IdleState.is_ready(&proxy));
        assert!(!DeathState.is_ready(&proxy));
        proxy.animations = Some(AnimationLibrary::new().with_clip(IDLE, 1.0));
        assert!(IdleState.is_ready(&proxy));
        assert!(!OneShotState(ATTACK).is_ready(&proxy));
        assert!(DeathState.is_ready(&proxy));
    }

    #[test]
    fn dead_controller_refuses_every_other_state() {
        let pending = PendingAsset::ready("clips", AnimationLibrary::standard());
        let mut controller = CharacterController::new(LocomotionConfig::default(), pending).unwrap();
        controller.poll_animations().unwrap();
        assert_eq!(controller.state(), Some(IDLE));

        controller.dead = true;
        controller.request_state(DEATH).unwrap();
        assert_eq!(controller.request_state(WALK), Ok(false));
        assert_eq!(controller.state(), Some(DEATH));
    }
}
