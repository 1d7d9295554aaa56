//! Pointer picking and fingertip touch against clickable props.
//!
//! The host turns a pointer (or XR controller) event into a [`Ray`] from the
//! viewer. Props whose bounds the ray hits are candidates; those whose
//! centre lies farther than `max_distance` from the viewer are out of reach
//! and ignored.
//!
//! Tracked hands press props directly: a [`Fingertip`] component follows the
//! index tip position the host reports and presses every clickable it
//! touches.

use atrium_ecs::prelude::*;
use serde_json::json;

use crate::geometry::Ray;
use crate::props::Clickable;

/// One clickable under the pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct PickHit {
    pub entity: EntityId,
    pub topic: String,
    /// Distance along the ray (or from the fingertip) to the prop's bounds.
    pub distance: f32,
}

/// Clickables hit by `ray` and within reach of `viewer`, nearest first.
pub fn pick_clickables(
    manager: &EntityManager,
    ray: &Ray,
    viewer: Vec3,
    max_distance: f32,
) -> Vec<PickHit> {
    let mut hits: Vec<PickHit> = manager
        .filter_components::<Clickable>()
        .into_iter()
        .filter_map(|(entity, clickable)| {
            let bounds = clickable.object().bounds()?;
            if bounds.center().distance(viewer) > max_distance {
                return None;
            }
            let distance = ray.intersect_aabb(&bounds, f32::INFINITY)?;
            Some(PickHit {
                entity,
                topic: clickable.topic().to_owned(),
                distance,
            })
        })
        .collect();
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits
}

/// Publish the topic of every clickable [`pick_clickables`] finds. Returns
/// how many were clicked.
pub fn click_at(manager: &mut EntityManager, ray: &Ray, viewer: Vec3, max_distance: f32) -> usize {
    let hits = pick_clickables(manager, ray, viewer, max_distance);
    for hit in &hits {
        tracing::debug!(entity = %hit.entity, topic = %hit.topic, "clicked");
        manager.publish(&hit.topic, json!({}));
    }
    hits.len()
}

// ---------------------------------------------------------------------------
// Touch
// ---------------------------------------------------------------------------

/// Clickables whose bounds lie within `radius` of `fingertip`, nearest first.
pub fn touching_clickables(manager: &EntityManager, fingertip: Vec3, radius: f32) -> Vec<PickHit> {
    if !fingertip.is_finite() || radius.is_nan() || radius < 0.0 {
        return Vec::new();
    }
    let mut hits: Vec<PickHit> = manager
        .filter_components::<Clickable>()
        .into_iter()
        .filter_map(|(entity, clickable)| {
            let distance = clickable.object().bounds()?.distance_to_point(fingertip);
            (distance <= radius).then(|| PickHit {
                entity,
                topic: clickable.topic().to_owned(),
                distance,
            })
        })
        .collect();
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits
}

/// Publish the topic of every clickable the fingertip touches. Returns how
/// many were pressed.
pub fn touch_at(manager: &mut EntityManager, fingertip: Vec3, radius: f32) -> usize {
    let hits = touching_clickables(manager, fingertip, radius);
    for hit in &hits {
        tracing::debug!(entity = %hit.entity, topic = %hit.topic, "touched");
        manager.publish(&hit.topic, json!({}));
    }
    hits.len()
}

/// Index fingertip of a tracked hand.
///
/// Presses a clickable once when the tip comes into contact with it. Holding
/// the tip inside the prop does not press it again until the tip has left.
#[derive(Debug, Clone)]
pub struct Fingertip {
    tip: Option<Vec3>,
    radius: f32,
    touching: Vec<EntityId>,
}

impl Fingertip {
    pub fn new(radius: f32) -> Self {
        Self {
            tip: None,
            radius,
            touching: Vec::new(),
        }
    }

    /// Latest tracked tip position, or `None` while the hand is not tracked.
    pub fn set_tip(&mut self, tip: Option<Vec3>) {
        self.tip = tip;
    }

    pub fn tip(&self) -> Option<Vec3> {
        self.tip
    }

    /// Clickables currently in contact.
    pub fn touching(&self) -> &[EntityId] {
        &self.touching
    }
}

impl Component for Fingertip {
    fn name(&self) -> &'static str {
        "FingertipComponent"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f32) -> Result<(), EcsError> {
        let Some(tip) = self.tip else {
            self.touching.clear();
            return Ok(());
        };
        let hits = touching_clickables(ctx.manager(), tip, self.radius);
        for hit in hits.iter().filter(|h| !self.touching.contains(&h.entity)) {
            tracing::debug!(entity = %hit.entity, topic = %hit.topic, "fingertip press");
            ctx.publish(&hit.topic, json!({}));
        }
        self.touching = hits.into_iter().map(|h| h.entity).collect();
        Ok(())
    }
}
