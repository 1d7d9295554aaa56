//! Atrium Engine -- the virtual office built on `atrium-ecs`.
//!
//! This crate holds everything the demo scenes are made of:
//!
//! - [`frame`]: the clamped variable-step frame loop the host calls once
//!   per display refresh,
//! - [`scene`]: scene-description loading and shared scene-node handles,
//! - [`props`]: clickable props, monitors, lights, the scored exit and the
//!   static collidables,
//! - [`locomotion`], [`input`] and [`health`]: the player character,
//! - [`interaction`]: pointer picking and fingertip touch,
//! - [`snapshot`]: hashed transform snapshots,
//! - [`config`]: every tunable constant, loadable from JSON.
//!
//! Rendering, asset decoding and XR devices stay with the host; the engine
//! only sees their results (rays, key codes, loaded animation tables).

#![deny(unsafe_code)]

pub mod config;
pub mod frame;
pub mod geometry;
pub mod health;
pub mod input;
pub mod interaction;
pub mod locomotion;
pub mod props;
pub mod scene;
pub mod snapshot;

pub use atrium_ecs;

/// Convenience re-exports for the common engine API.
pub mod prelude {
    pub use atrium_ecs::prelude::*;

    pub use crate::config::{
        ConfigError, EngineConfig, FrameConfig, GridConfig, InteractionConfig, LocomotionConfig,
    };
    pub use crate::frame::{FrameDiagnostics, FrameLoop};
    pub use crate::geometry::{Aabb, Ray};
    pub use crate::health::{is_alive, Health, DAMAGE_TOPIC, DEATH_TOPIC};
    pub use crate::input::{CharacterInput, InputState, Key};
    pub use crate::interaction::{
        click_at, pick_clickables, touch_at, touching_clickables, Fingertip, PickHit,
    };
    pub use crate::locomotion::{AnimationClip, AnimationLibrary, CharacterController, ACTION_TOPIC};
    pub use crate::props::{
        exit_score, Clickable, Collidable, Exit, Led, Monitor, Neon, EXIT_RESULT_TOPIC, EXIT_TOPIC,
    };
    pub use crate::scene::{load_scene, LoadedScene, SceneDescription, SceneError, SceneObject};
    pub use crate::snapshot::{SnapshotError, TransformSnapshot};
}
