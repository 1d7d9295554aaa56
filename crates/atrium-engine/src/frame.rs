//! Variable-step frame loop.
//!
//! The host calls [`FrameLoop::step`] once per display refresh with the wall
//! time since the previous frame. Each step:
//!
//! 1. clamps the elapsed time to `[0, max_dt]` (non-finite input counts as
//!    zero), so a stalled host never produces one huge step,
//! 2. runs [`EntityManager::update`] with the clamped `dt`,
//! 3. advances the frame counter and simulated time and records
//!    [`FrameDiagnostics`].
//!
//! Component failures never escape a step; they are counted in the
//! diagnostics and kept in [`FrameLoop::last_report`].
//!
//! # Example
//!
//! ```
//! use atrium_engine::config::FrameConfig;
//! use atrium_engine::frame::FrameLoop;
//! use atrium_ecs::prelude::EntityManager;
//!
//! let mut frames = FrameLoop::new(EntityManager::new(), FrameConfig::default()).unwrap();
//! frames.run_frames(3, 0.5);
//!
//! assert_eq!(frames.frame_count(), 3);
//! // Each 0.5 s step was clamped to 1/30 s.
//! assert!((frames.sim_time() - 0.1).abs() < 1e-6);
//! ```

use std::time::{Duration, Instant};

use atrium_ecs::prelude::{EntityManager, FrameReport};

use crate::config::{ConfigError, EngineConfig, FrameConfig};

// ---------------------------------------------------------------------------
// FrameDiagnostics
// ---------------------------------------------------------------------------

/// Timing and outcome of the last frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDiagnostics {
    /// Wall-clock time spent in the update pass.
    pub frame_time: Duration,
    /// The clamped step actually simulated.
    pub dt: f32,
    pub entities_updated: usize,
    pub components_updated: usize,
    pub failures: usize,
}

// ---------------------------------------------------------------------------
// FrameLoop
// ---------------------------------------------------------------------------

/// Drives an [`EntityManager`] one frame at a time.
pub struct FrameLoop {
    manager: EntityManager,
    config: FrameConfig,
    frame_counter: u64,
    /// Accumulated clamped steps, in seconds.
    sim_time: f64,
    last_diagnostics: FrameDiagnostics,
    last_report: FrameReport,
}

impl FrameLoop {
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] unless `config.max_dt` is positive and
    /// finite.
    pub fn new(manager: EntityManager, config: FrameConfig) -> Result<Self, ConfigError> {
        if !(config.max_dt.is_finite() && config.max_dt > 0.0) {
            return Err(ConfigError::Invalid {
                field: "frame.max_dt",
                reason: format!("must be positive and finite, got {}", config.max_dt),
            });
        }
        Ok(Self {
            manager,
            config,
            frame_counter: 0,
            sim_time: 0.0,
            last_diagnostics: FrameDiagnostics::default(),
            last_report: FrameReport::default(),
        })
    }

    /// A loop over an empty manager with the configured spatial grid.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let manager = EntityManager::with_grid(config.grid.build()?);
        Self::new(manager, config.frame.clone())
    }

    /// The step [`step`](Self::step) would simulate for `elapsed` seconds.
    pub fn clamp_dt(&self, elapsed: f32) -> f32 {
        if elapsed.is_finite() {
            elapsed.clamp(0.0, self.config.max_dt)
        } else {
            0.0
        }
    }

    /// Run one frame.
    pub fn step(&mut self, elapsed: f32) -> &FrameDiagnostics {
        let dt = self.clamp_dt(elapsed);
        let start = Instant::now();
        let report = self.manager.update(dt);
        let frame_time = start.elapsed();

        self.frame_counter += 1;
        self.sim_time += f64::from(dt);
        if !report.is_clean() {
            tracing::debug!(
                frame = self.frame_counter,
                failures = report.failures.len(),
                "frame finished with component failures"
            );
        }
        self.last_diagnostics = FrameDiagnostics {
            frame_time,
            dt,
            entities_updated: report.entities_updated,
            components_updated: report.components_updated,
            failures: report.failures.len(),
        };
        self.last_report = report;
        &self.last_diagnostics
    }

    /// Run `frames` frames of `elapsed` seconds each.
    pub fn run_frames(&mut self, frames: u64, elapsed: f32) {
        for _ in 0..frames {
            self.step(elapsed);
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn manager(&self) -> &EntityManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut EntityManager {
        &mut self.manager
    }

    pub fn last_diagnostics(&self) -> &FrameDiagnostics {
        &self.last_diagnostics
    }

    /// Full report of the last frame, including the failures.
    pub fn last_report(&self) -> &FrameReport {
        &self.last_report
    }

    pub(crate) fn set_clock(&mut self, frame: u64, sim_time: f64) {
        self.frame_counter = frame;
        self.sim_time = sim_time;
    }
}
