//! Interactive office props and the static collidable.
//!
//! Props are driven entirely by topics: a [`Clickable`] publishes its topic
//! when the pointer picks it, and the [`Monitor`], [`Neon`] and [`Led`]
//! listening on that topic react by changing the visibility of their scene
//! node. The [`Exit`] prop scores how many lights and screens the player
//! switched off before leaving.

use atrium_ecs::prelude::*;
use serde_json::json;

use crate::geometry::{Aabb, Ray};
use crate::scene::SceneObject;

/// Topic the [`Exit`] prop listens on.
pub const EXIT_TOPIC: &str = "exit";
/// Topic the [`Exit`] prop publishes its `{score, completed}` result on.
pub const EXIT_RESULT_TOPIC: &str = "exit.result";

// ---------------------------------------------------------------------------
// Clickable
// ---------------------------------------------------------------------------

/// A pickable node that publishes `topic` when clicked.
#[derive(Debug, Clone)]
pub struct Clickable {
    object: SceneObject,
    topic: String,
}

impl Clickable {
    pub fn new(object: SceneObject, topic: impl Into<String>) -> Self {
        Self {
            object,
            topic: topic.into(),
        }
    }

    pub fn object(&self) -> &SceneObject {
        &self.object
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Component for Clickable {
    fn name(&self) -> &'static str {
        "ClickableComponent"
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

struct OnState;

impl State<SceneObject> for OnState {
    fn name(&self) -> &'static str {
        "on"
    }

    fn enter(&mut self, object: &mut SceneObject, _previous: Option<&'static str>) {
        object.set_visible(true);
    }
}

struct OffState;

impl State<SceneObject> for OffState {
    fn name(&self) -> &'static str {
        "off"
    }

    fn enter(&mut self, object: &mut SceneObject, _previous: Option<&'static str>) {
        object.set_visible(false);
    }
}

/// A screen toggled between `on` and `off` by its topic.
///
/// Starts `on` unless built [`with_initial_state`](Self::with_initial_state).
pub struct Monitor {
    object: SceneObject,
    topic: String,
    fsm: FiniteStateMachine<SceneObject>,
    initial: &'static str,
}

impl Monitor {
    pub fn new(object: SceneObject, topic: impl Into<String>) -> Result<Self, EcsError> {
        let fsm = FiniteStateMachine::new()
            .with_state(OnState)?
            .with_state(OffState)?;
        Ok(Self {
            object,
            topic: topic.into(),
            fsm,
            initial: "on",
        })
    }

    /// Choose the state entered on registration.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownState`] unless `state` is `"on"` or `"off"`.
    pub fn with_initial_state(mut self, state: &'static str) -> Result<Self, EcsError> {
        if !self.fsm.has_state(state) {
            return Err(EcsError::UnknownState {
                state: state.to_owned(),
                registered: self.fsm.state_names().join(", "),
            });
        }
        self.initial = state;
        Ok(self)
    }

    pub fn state(&self) -> Option<&'static str> {
        self.fsm.current_state()
    }

    pub fn is_on(&self) -> bool {
        self.fsm.is_in("on")
    }

    pub fn object(&self) -> &SceneObject {
        &self.object
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Component for Monitor {
    fn name(&self) -> &'static str {
        "MonitorComponent"
    }

    fn init_component(&mut self, ctx: &mut Context<'_>) -> Result<(), EcsError> {
        ctx.subscribe(&self.topic);
        self.fsm.set_state(self.initial, &mut self.object)
    }

    fn update(&mut self, _ctx: &mut Context<'_>, dt: f32) -> Result<(), EcsError> {
        self.fsm.update(dt, &mut self.object)
    }

    fn on_message(&mut self, _ctx: &mut Context<'_>, message: &Message) -> Result<(), EcsError> {
        if message.topic != self.topic {
            return Ok(());
        }
        let next = if self.fsm.is_in("off") { "on" } else { "off" };
        self.fsm.set_state(next, &mut self.object)
    }
}

// ---------------------------------------------------------------------------
// Neon / Led
// ---------------------------------------------------------------------------

/// A ceiling light whose node has a lit child (0) and an unlit child (1);
/// its topic swaps which one is shown.
#[derive(Debug, Clone)]
pub struct Neon {
    object: SceneObject,
    topic: String,
}

impl Neon {
    pub fn new(object: SceneObject, topic: impl Into<String>) -> Self {
        Self {
            object,
            topic: topic.into(),
        }
    }

    /// Whether the lit child is hidden.
    pub fn is_off(&self) -> bool {
        self.object.child(0).is_some_and(|lit| !lit.is_visible())
    }

    pub fn object(&self) -> &SceneObject {
        &self.object
    }
}

impl Component for Neon {
    fn name(&self) -> &'static str {
        "NeonComponent"
    }

    fn init_component(&mut self, ctx: &mut Context<'_>) -> Result<(), EcsError> {
        if self.object.child_count() < 2 {
            tracing::warn!(
                node = %self.object.name(),
                children = self.object.child_count(),
                "neon node should have a lit and an unlit child"
            );
        }
        ctx.subscribe(&self.topic);
        Ok(())
    }

    fn on_message(&mut self, _ctx: &mut Context<'_>, message: &Message) -> Result<(), EcsError> {
        if message.topic == self.topic {
            for index in 0..2 {
                if let Some(child) = self.object.child(index) {
                    child.toggle_visible();
                }
            }
        }
        Ok(())
    }
}

/// A status light that shows or hides its own node.
#[derive(Debug, Clone)]
pub struct Led {
    object: SceneObject,
    topic: String,
}

impl Led {
    pub fn new(object: SceneObject, topic: impl Into<String>) -> Self {
        Self {
            object,
            topic: topic.into(),
        }
    }

    pub fn is_lit(&self) -> bool {
        self.object.is_visible()
    }
}

impl Component for Led {
    fn name(&self) -> &'static str {
        "LedComponent"
    }

    fn init_component(&mut self, ctx: &mut Context<'_>) -> Result<(), EcsError> {
        ctx.subscribe(&self.topic);
        Ok(())
    }

    fn on_message(&mut self, _ctx: &mut Context<'_>, message: &Message) -> Result<(), EcsError> {
        if message.topic == self.topic {
            self.object.toggle_visible();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Exit
// ---------------------------------------------------------------------------

/// Percentage of scored props (neons and monitors) that are switched off,
/// rounded to the nearest integer. A scene with nothing to switch off
/// scores 100.
pub fn exit_score(manager: &EntityManager) -> u32 {
    let neons = manager.filter_components::<Neon>();
    let monitors = manager.filter_components::<Monitor>();
    let total = neons.len() + monitors.len();
    if total == 0 {
        return 100;
    }
    let off = neons.iter().filter(|(_, n)| n.is_off()).count()
        + monitors.iter().filter(|(_, m)| m.fsm.is_in("off")).count();
    (off as f64 / total as f64 * 100.0).round() as u32
}

/// The office door. A message on [`EXIT_TOPIC`] scores the session and
/// publishes the result on [`EXIT_RESULT_TOPIC`].
#[derive(Debug, Clone, Default)]
pub struct Exit {
    last_score: Option<u32>,
}

impl Exit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score computed by the most recent exit request.
    pub fn last_score(&self) -> Option<u32> {
        self.last_score
    }
}

impl Component for Exit {
    fn name(&self) -> &'static str {
        "ExitComponent"
    }

    fn init_component(&mut self, ctx: &mut Context<'_>) -> Result<(), EcsError> {
        ctx.subscribe(EXIT_TOPIC);
        Ok(())
    }

    fn on_message(&mut self, ctx: &mut Context<'_>, message: &Message) -> Result<(), EcsError> {
        if message.topic != EXIT_TOPIC {
            return Ok(());
        }
        let score = exit_score(ctx.manager());
        let completed = score == 100;
        self.last_score = Some(score);
        tracing::info!(score, completed, "exit requested");
        ctx.publish(EXIT_RESULT_TOPIC, json!({ "score": score, "completed": completed }));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Collidable
// ---------------------------------------------------------------------------

/// Static geometry that blocks movement. Every box in the given subtrees
/// counts individually.
#[derive(Debug, Clone)]
pub struct Collidable {
    objects: Vec<SceneObject>,
}

impl Collidable {
    pub fn new(objects: Vec<SceneObject>) -> Self {
        Self { objects }
    }

    pub fn boxes(&self) -> Vec<Aabb> {
        let mut boxes = Vec::new();
        for object in &self.objects {
            object.collect_bounds(&mut boxes);
        }
        boxes
    }

    /// Distance to the nearest box the ray hits within `max_distance`.
    pub fn ray_hit(&self, ray: &Ray, max_distance: f32) -> Option<f32> {
        self.boxes()
            .iter()
            .filter_map(|b| ray.intersect_aabb(b, max_distance))
            .min_by(f32::total_cmp)
    }
}

impl Component for Collidable {
    fn name(&self) -> &'static str {
        "CollidableComponent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn neon_node() -> SceneObject {
        let unlit = SceneObject::new("unlit");
        unlit.set_visible(false);
        SceneObject::new("neon")
            .with_child(SceneObject::new("lit"))
            .with_child(unlit)
    }

    #[test]
    fn neon_swaps_its_children() {
        let node = neon_node();
        let mut manager = EntityManager::new();
        let id = manager.add(Entity::new().with_component(Neon::new(node.clone(), "neon.1")), "");

        manager.publish("neon.1", json!({}));

        assert!(manager.component::<Neon>(id).unwrap().is_off());
        assert!(node.child(1).unwrap().is_visible());
        manager.publish("neon.1", json!({}));
        assert!(!manager.component::<Neon>(id).unwrap().is_off());
    }

    #[test]
    fn led_flips_its_node() {
        let node = SceneObject::new("led");
        let mut manager = EntityManager::new();
        manager.add(Entity::new().with_component(Led::new(node.clone(), "led")), "");
        manager.publish("led", json!({}));
        assert!(!node.is_visible());
        manager.publish("other", json!({}));
        assert!(!node.is_visible());
    }

    #[test]
    fn monitor_starts_on_by_default() {
        let node = SceneObject::new("screen");
        node.set_visible(false);
        let mut manager = EntityManager::new();
        let id = manager.add(
            Entity::new().with_component(Monitor::new(node.clone(), "screen").unwrap()),
            "",
        );
        assert!(manager.component::<Monitor>(id).unwrap().is_on());
        assert!(node.is_visible());
    }

    #[test]
    fn monitor_rejects_unknown_initial_state() {
        let result = Monitor::new(SceneObject::new("m"), "m")
            .unwrap()
            .with_initial_state("standby");
        assert!(matches!(result, Err(EcsError::UnknownState { .. })));
    }

    #[test]
    fn empty_office_scores_full_marks() {
        assert_eq!(exit_score(&EntityManager::new()), 100);
    }

    #[test]
    fn exit_score_rounds_the_switched_off_share() {
        let mut manager = EntityManager::new();
        for i in 0..3 {
            manager.add(
                Entity::new().with_component(Neon::new(neon_node(), format!("n{i}"))),
                "",
            );
        }
        manager.publish("n0", json!({}));
        // 1 of 3 off.
        assert_eq!(exit_score(&manager), 33);
        manager.publish("n1", json!({}));
        assert_eq!(exit_score(&manager), 67);
    }

    #[test]
    fn collidable_reports_nearest_hit() {
        let near = SceneObject::new("near")
            .with_bounds(Aabb::from_center_size(Vec3::new(0.0, 0.0, 2.0), Vec3::ONE));
        let far = SceneObject::new("far")
            .with_bounds(Aabb::from_center_size(Vec3::new(0.0, 0.0, 5.0), Vec3::ONE));
        let collidable = Collidable::new(vec![far, near]);
        let ray = Ray::new(Vec3::ZERO, Vec3::Z).unwrap();

        assert_eq!(collidable.ray_hit(&ray, 10.0), Some(1.5));
        assert_eq!(collidable.boxes().len(), 2);
        assert!(collidable.ray_hit(&ray, 1.0).is_none());
    }
}
