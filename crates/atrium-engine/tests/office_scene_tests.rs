//! Integration tests for the office scene: loading, the prop toggles, and
//! the exit score.

use std::cell::RefCell;
use std::rc::Rc;

use atrium_engine::prelude::*;
use atrium_engine::scene::NodeDescription;
use serde_json::{json, Value};

fn fixture() -> SceneDescription {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/office_scene.json");
    SceneDescription::from_path(path).expect("fixture scene should parse")
}

fn viewer() -> Vec3 {
    Vec3::new(0.0, 1.6, 0.0)
}

/// Ray from the viewer through `target`.
fn look_at(target: Vec3) -> Ray {
    Ray::new(viewer(), target - viewer()).unwrap()
}

/// Collect every payload published on `topic`.
fn record(manager: &mut EntityManager, topic: &str) -> Rc<RefCell<Vec<Value>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    manager.subscribe_callback(topic, move |m| sink.borrow_mut().push(m.payload.clone()));
    log
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[test]
fn fixture_creates_one_entity_per_annotated_node() {
    let mut manager = EntityManager::new();
    let scene = load_scene(&mut manager, &fixture()).unwrap();

    assert_eq!(scene.entities.len(), 4);
    assert_eq!(manager.entity_count(), 5);
    assert_eq!(scene.environment, manager.id_of("environment"));
    assert_eq!(manager.filter_components::<Clickable>().len(), 4);
    assert_eq!(manager.filter_components::<Monitor>().len(), 1);
    assert_eq!(manager.filter_components::<Neon>().len(), 1);
    assert_eq!(manager.filter_components::<Led>().len(), 1);
    assert_eq!(manager.filter_components::<Exit>().len(), 1);
    assert_eq!(manager.filter_components_by_name("CollidableComponent").len(), 1);

    // Props are anonymous.
    for id in &scene.entities {
        assert_eq!(manager.get_by_id(*id).unwrap().name(), None);
    }
    // Nested nodes are reachable and share state with the props.
    let monitor = scene.object("Desk Monitor").unwrap();
    let (_, component) = manager.filter_components::<Monitor>()[0];
    assert!(component.object().ptr_eq(&monitor));
}

#[test]
fn environment_collects_nested_collidable_boxes() {
    let mut manager = EntityManager::new();
    let scene = load_scene(&mut manager, &fixture()).unwrap();
    let environment = scene.environment.unwrap();

    let collidable = manager.component::<Collidable>(environment).unwrap();
    // Wall, desk and the monitor nested under the desk.
    assert_eq!(collidable.boxes().len(), 3);
}

#[test]
fn unknown_component_type_is_rejected() {
    let description = SceneDescription::from_json_str(
        r#"{ "nodes": [ { "name": "Plant", "components": "[{\"type\": \"WaterComponent\", \"topic\": \"w\"}]" } ] }"#,
    )
    .unwrap();
    let mut manager = EntityManager::new();

    let err = load_scene(&mut manager, &description).unwrap_err();

    assert!(matches!(
        err,
        SceneError::UnknownComponent { ref node, ref kind } if node == "Plant" && kind == "WaterComponent"
    ));
    assert_eq!(manager.entity_count(), 0);
}

#[test]
fn malformed_descriptor_string_names_the_node() {
    let node = NodeDescription {
        name: "Broken".to_owned(),
        visible: true,
        bounds: None,
        components: Some("[{\"type\": ".to_owned()),
        collidable: false,
        children: Vec::new(),
    };
    let description = SceneDescription {
        name: "Scene".to_owned(),
        nodes: vec![node],
    };

    let err = load_scene(&mut EntityManager::new(), &description).unwrap_err();

    assert!(matches!(err, SceneError::Descriptor { ref node, .. } if node == "Broken"));
    assert!(err.to_string().contains("Broken"));
}

#[test]
fn scene_without_collidables_has_no_environment() {
    let description = SceneDescription::from_json_str(r#"{ "nodes": [ { "name": "Floor" } ] }"#).unwrap();
    let mut manager = EntityManager::new();
    let scene = load_scene(&mut manager, &description).unwrap();
    assert!(scene.environment.is_none());
    assert_eq!(manager.entity_count(), 0);
    assert!(scene.object("Floor").is_some());
}

// ---------------------------------------------------------------------------
// Props
// ---------------------------------------------------------------------------

#[test]
fn monitor_starting_off_toggles_on_its_topic() {
    let screen = SceneObject::new("screen");
    let mut manager = EntityManager::new();
    let id = manager.add(
        Entity::new().with_component(
            Monitor::new(screen.clone(), "monitor.1")
                .unwrap()
                .with_initial_state("off")
                .unwrap(),
        ),
        "",
    );
    assert_eq!(manager.component::<Monitor>(id).unwrap().state(), Some("off"));
    assert!(!screen.is_visible());

    manager.publish("monitor.1", json!({}));
    assert_eq!(manager.component::<Monitor>(id).unwrap().state(), Some("on"));
    assert!(screen.is_visible());

    manager.publish("monitor.1", json!({}));
    assert_eq!(manager.component::<Monitor>(id).unwrap().state(), Some("off"));
    assert!(!screen.is_visible());
}

#[test]
fn clicking_the_neon_swaps_its_children() {
    let mut manager = EntityManager::new();
    let scene = load_scene(&mut manager, &fixture()).unwrap();
    let neon = scene.object("Ceiling Neon").unwrap();

    let clicked = click_at(&mut manager, &look_at(Vec3::new(0.0, 3.0, 3.0)), viewer(), 9.0);

    assert_eq!(clicked, 1);
    assert!(!neon.child(0).unwrap().is_visible());
    assert!(neon.child(1).unwrap().is_visible());
}

#[test]
fn props_beyond_pick_distance_ignore_clicks() {
    let mut manager = EntityManager::new();
    let scene = load_scene(&mut manager, &fixture()).unwrap();
    let monitor = scene.object("Desk Monitor").unwrap();

    let far_viewer = Vec3::new(2.0, 1.3, -6.0);
    let ray = Ray::new(far_viewer, Vec3::Z).unwrap();
    assert_eq!(click_at(&mut manager, &ray, far_viewer, 9.0), 0);
    assert!(monitor.is_visible());
}

#[test]
fn fingertip_on_the_led_toggles_it_once() {
    let mut manager = EntityManager::new();
    let scene = load_scene(&mut manager, &fixture()).unwrap();
    let led = scene.object("Status Led").unwrap();
    let hand = manager.add(
        Entity::new().with_component(Fingertip::new(InteractionConfig::default().touch_radius)),
        "left hand",
    );

    manager.component_mut::<Fingertip>(hand).unwrap().set_tip(Some(Vec3::new(-2.0, 1.0, 3.905)));
    for _ in 0..3 {
        manager.update(1.0 / 60.0);
    }

    assert!(!led.is_visible());
    assert_eq!(manager.component::<Fingertip>(hand).unwrap().touching().len(), 1);
}

// ---------------------------------------------------------------------------
// Exit
// ---------------------------------------------------------------------------

#[test]
fn leaving_with_everything_on_scores_zero() {
    let mut manager = EntityManager::new();
    load_scene(&mut manager, &fixture()).unwrap();
    let results = record(&mut manager, EXIT_RESULT_TOPIC);

    let clicked = click_at(&mut manager, &look_at(Vec3::new(0.0, 1.25, -8.0)), viewer(), 9.0);

    assert_eq!(clicked, 1);
    assert_eq!(*results.borrow(), vec![json!({ "score": 0, "completed": false })]);
}

#[test]
fn switching_everything_off_completes_the_session() {
    let mut manager = EntityManager::new();
    let scene = load_scene(&mut manager, &fixture()).unwrap();
    let results = record(&mut manager, EXIT_RESULT_TOPIC);

    manager.publish("monitor.desk", json!({}));
    assert_eq!(exit_score(&manager), 50);
    manager.publish("neon.ceiling", json!({}));
    // The led is not scored.
    manager.publish("led.status", json!({}));
    manager.publish(EXIT_TOPIC, json!({}));

    assert_eq!(*results.borrow(), vec![json!({ "score": 100, "completed": true })]);
    let exit_entity = scene
        .entities
        .iter()
        .copied()
        .find(|id| manager.component::<Exit>(*id).is_some())
        .unwrap();
    assert_eq!(manager.component::<Exit>(exit_entity).unwrap().last_score(), Some(100));
}
