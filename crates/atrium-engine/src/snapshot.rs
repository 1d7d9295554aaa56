//! Transform snapshots with BLAKE3 hashing.
//!
//! A [`TransformSnapshot`] records the frame clock and the position and
//! rotation of every live entity, together with a BLAKE3 digest over that
//! data. Two runs that reach the same hash at the same frame moved every
//! entity identically, which is what the determinism tests compare.
//!
//! ```
//! use atrium_ecs::prelude::*;
//! use atrium_engine::config::FrameConfig;
//! use atrium_engine::frame::FrameLoop;
//!
//! let mut manager = EntityManager::new();
//! let id = manager.add(Entity::new().at(Vec3::new(1.0, 0.0, 2.0)), "crate");
//! let mut frames = FrameLoop::new(manager, FrameConfig::default()).unwrap();
//! frames.run_frames(5, 1.0 / 60.0);
//!
//! let snapshot = frames.capture_snapshot();
//! assert_eq!(snapshot.hash.len(), 64);
//!
//! frames.manager_mut().set_position(id, Vec3::ZERO).unwrap();
//! frames.run_frames(5, 1.0 / 60.0);
//! frames.restore_snapshot(&snapshot).unwrap();
//!
//! assert_eq!(frames.frame_count(), 5);
//! assert_eq!(frames.state_hash(), snapshot.hash);
//! ```
//!
//! Only transforms and the clock are captured. Component state (state
//! machines, input, health) is not; restoring rewinds where things are,
//! not what they are doing.

use atrium_ecs::prelude::{EcsError, EntityId, EntityManager, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::frame::FrameLoop;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The recorded digest does not match the recorded data.
    #[error("snapshot hash mismatch: recorded {recorded}, recomputed {recomputed}")]
    HashMismatch { recorded: String, recomputed: String },

    #[error("snapshot serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Entity(#[from] EcsError),
}

// ---------------------------------------------------------------------------
// TransformSnapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTransform {
    pub entity: EntityId,
    pub name: Option<String>,
    pub position: Vec3,
    pub rotation: Quat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSnapshot {
    pub frame: u64,
    pub sim_time: f64,
    /// Live entities in registration order.
    pub entities: Vec<EntityTransform>,
    /// BLAKE3 hex digest (64 lowercase hex chars) of everything above.
    pub hash: String,
}

/// Digest over the little-endian encoding of the clock and each transform.
fn compute_hash(frame: u64, sim_time: f64, entities: &[EntityTransform]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&frame.to_le_bytes());
    hasher.update(&sim_time.to_le_bytes());
    for t in entities {
        hasher.update(&t.entity.to_raw().to_le_bytes());
        let name = t.name.as_deref().unwrap_or("");
        hasher.update(&(name.len() as u64).to_le_bytes());
        hasher.update(name.as_bytes());
        for v in t.position.to_array().into_iter().chain(t.rotation.to_array()) {
            hasher.update(&v.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

impl TransformSnapshot {
    /// Record every live entity of `manager`.
    pub fn capture(manager: &EntityManager, frame: u64, sim_time: f64) -> Self {
        let entities: Vec<EntityTransform> = manager
            .entity_ids()
            .iter()
            .filter_map(|&id| manager.get_by_id(id))
            .filter_map(|e| {
                Some(EntityTransform {
                    entity: e.id()?,
                    name: e.name().map(str::to_owned),
                    position: e.position(),
                    rotation: e.rotation(),
                })
            })
            .collect();
        let hash = compute_hash(frame, sim_time, &entities);
        Self {
            frame,
            sim_time,
            entities,
            hash,
        }
    }

    /// Recompute the digest and compare it with [`hash`](Self::hash).
    pub fn verify(&self) -> Result<(), SnapshotError> {
        let recomputed = compute_hash(self.frame, self.sim_time, &self.entities);
        if recomputed == self.hash {
            Ok(())
        } else {
            Err(SnapshotError::HashMismatch {
                recorded: self.hash.clone(),
                recomputed,
            })
        }
    }

    /// Write the recorded transforms back onto the entities that are still
    /// alive. Returns how many were restored; removed entities are skipped.
    ///
    /// The hash is verified first; on mismatch nothing is modified.
    pub fn restore(&self, manager: &mut EntityManager) -> Result<usize, SnapshotError> {
        self.verify()?;
        let mut restored = 0;
        for t in &self.entities {
            if !manager.is_alive(t.entity) {
                tracing::debug!(entity = %t.entity, "skipping removed entity on restore");
                continue;
            }
            manager.set_position(t.entity, t.position)?;
            manager.set_rotation(t.entity, t.rotation)?;
            restored += 1;
        }
        Ok(restored)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and verify.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.verify()?;
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// FrameLoop snapshot/restore methods
// ---------------------------------------------------------------------------

impl FrameLoop {
    pub fn capture_snapshot(&self) -> TransformSnapshot {
        TransformSnapshot::capture(self.manager(), self.frame_count(), self.sim_time())
    }

    /// Restore transforms and the frame clock from `snapshot`.
    pub fn restore_snapshot(&mut self, snapshot: &TransformSnapshot) -> Result<usize, SnapshotError> {
        let restored = snapshot.restore(self.manager_mut())?;
        self.set_clock(snapshot.frame, snapshot.sim_time);
        tracing::debug!(frame = snapshot.frame, restored, "snapshot restored");
        Ok(restored)
    }

    /// Digest of the current clock and transforms.
    pub fn state_hash(&self) -> String {
        self.capture_snapshot().hash
    }
}
