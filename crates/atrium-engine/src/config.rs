//! Engine configuration.
//!
//! Every tunable constant of the office demo lives here instead of in the
//! components that use it. All sections have `Default`s matching the demo,
//! and missing JSON fields fall back to them, so a config file only needs
//! to name what it changes:
//!
//! ```
//! use atrium_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "locomotion": { "block_distance": 2.5 } }"#).unwrap();
//! assert_eq!(config.locomotion.block_distance, 2.5);
//! assert_eq!(config.locomotion.nearby_radius, 5.0);
//! ```

use std::path::Path;

use atrium_ecs::prelude::{GridBounds, SpatialHashGrid};
use atrium_ecs::spatial::DEFAULT_DIMENSIONS;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Errors from loading or validating an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Frame-loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Upper bound on the per-frame step in seconds.
    pub max_dt: f32,
}

impl Default for FrameConfig {
    /// 1/30 s, so a stalled host never produces a large step.
    fn default() -> Self {
        Self { max_dt: 1.0 / 30.0 }
    }
}

/// Spatial grid settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub min: Vec2,
    pub max: Vec2,
    pub dimensions: [usize; 2],
}

impl Default for GridConfig {
    fn default() -> Self {
        let bounds = GridBounds::default();
        Self {
            min: bounds.min,
            max: bounds.max,
            dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

impl GridConfig {
    pub fn bounds(&self) -> GridBounds {
        GridBounds::new(self.min, self.max)
    }

    /// Build the grid this section describes.
    pub fn build(&self) -> Result<SpatialHashGrid, ConfigError> {
        SpatialHashGrid::new(self.bounds(), self.dimensions).map_err(|e| ConfigError::Invalid {
            field: "grid",
            reason: e.to_string(),
        })
    }
}

/// Character movement and collision settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocomotionConfig {
    /// Per-axis velocity gain per second; `y` scales turning.
    pub acceleration: Vec3,
    /// Per-axis velocity damping factor per second.
    pub deceleration: Vec3,
    /// Multiplier applied to `acceleration` while shift is held.
    pub run_multiplier: f32,
    /// Radius of the spatial grid query for blocking entities.
    pub nearby_radius: f32,
    /// Planar distance at which another living entity blocks movement.
    pub block_distance: f32,
    /// Length of the forward probe against static collidables.
    pub ray_max_distance: f32,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            acceleration: Vec3::new(1.0, 0.125, 50.0),
            deceleration: Vec3::new(-0.0005, -0.0001, -5.0),
            run_multiplier: 2.0,
            nearby_radius: 5.0,
            block_distance: 4.0,
            ray_max_distance: 3.0,
        }
    }
}

/// Pointer interaction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Clickables farther than this from the viewer ignore clicks.
    pub pick_distance: f32,
    /// How close a tracked fingertip must come to a clickable's bounds to
    /// press it.
    pub touch_radius: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            pick_distance: 9.0,
            touch_radius: 0.01,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub frame: FrameConfig,
    pub grid: GridConfig,
    pub locomotion: LocomotionConfig,
    pub interaction: InteractionConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Check every value the engine depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("frame.max_dt", self.frame.max_dt)?;
        self.grid.build()?;

        let loco = &self.locomotion;
        if !loco.acceleration.is_finite() || !loco.deceleration.is_finite() {
            return Err(ConfigError::Invalid {
                field: "locomotion.acceleration",
                reason: "acceleration and deceleration must be finite".to_owned(),
            });
        }
        positive("locomotion.run_multiplier", loco.run_multiplier)?;
        non_negative("locomotion.nearby_radius", loco.nearby_radius)?;
        non_negative("locomotion.block_distance", loco.block_distance)?;
        non_negative("locomotion.ray_max_distance", loco.ray_max_distance)?;
        if loco.block_distance > loco.nearby_radius {
            tracing::warn!(
                block_distance = loco.block_distance,
                nearby_radius = loco.nearby_radius,
                "block distance exceeds the grid query radius; distant blockers are never seen"
            );
        }
        non_negative("interaction.pick_distance", self.interaction.pick_distance)?;
        non_negative("interaction.touch_radius", self.interaction.touch_radius)?;
        Ok(())
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be positive and finite, got {value}"),
        })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be non-negative and finite, got {value}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_office_demo() {
        let config = EngineConfig::default();
        assert!((config.frame.max_dt - 1.0 / 30.0).abs() < f32::EPSILON);
        assert_eq!(config.grid.dimensions, [100, 100]);
        assert_eq!(config.grid.min, Vec2::splat(-1000.0));
        assert_eq!(config.locomotion.nearby_radius, 5.0);
        assert_eq!(config.locomotion.block_distance, 4.0);
        assert_eq!(config.locomotion.ray_max_distance, 3.0);
        assert_eq!(config.interaction.pick_distance, 9.0);
        assert_eq!(config.interaction.touch_radius, 0.01);
        config.validate().unwrap();
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{ "grid": { "dimensions": [10, 20] }, "frame": { "max_dt": 0.05 } }"#)
                .unwrap();
        assert_eq!(config.grid.dimensions, [10, 20]);
        assert_eq!(config.grid.max, Vec2::splat(1000.0));
        assert_eq!(config.frame.max_dt, 0.05);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "frame": { "max_dt": 0.0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "frame.max_dt", .. }));

        let err = EngineConfig::from_json_str(r#"{ "grid": { "dimensions": [0, 5] } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "grid", .. }));

        let err =
            EngineConfig::from_json_str(r#"{ "locomotion": { "ray_max_distance": -1.0 } }"#).unwrap_err();
        assert!(err.to_string().contains("locomotion.ray_max_distance"));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = EngineConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
