//! Headless walk through the office scene.
//!
//! Loads the office fixture, spawns a player whose animations arrive from a
//! loader thread, walks toward the desk, switches the monitor and the neon
//! off by clicking them, then leaves through the exit and prints the score.
//!
//! Run with: `cargo run -p atrium-engine --example office_headless`
//! Set `RUST_LOG=debug` to see the engine's tracing output.

use std::cell::RefCell;
use std::rc::Rc;

use atrium_ecs::asset;
use atrium_engine::prelude::*;
use serde_json::Value;

const FRAME: f32 = 1.0 / 60.0;

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let config = EngineConfig::default();
    let mut frames = FrameLoop::from_config(&config)?;

    let scene_path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/office_scene.json");
    let description = SceneDescription::from_path(scene_path)?;
    let scene = load_scene(frames.manager_mut(), &description)?;
    println!(
        "loaded '{}': {} props, environment {:?}",
        description.name,
        scene.entities.len(),
        scene.environment
    );

    // Animations load off the frame pass, as a model fetch would.
    let (sender, animations) = asset::channel::<AnimationLibrary>("guard.fbx");
    let loader = std::thread::spawn(move || sender.complete(AnimationLibrary::standard()));

    let player = frames.manager_mut().add(
        Entity::new()
            .with_component(CharacterInput::new())
            .with_component(CharacterController::new(config.locomotion.clone(), animations)?)
            .with_component(SpatialGridController::new())
            .with_component(Health::new(100.0)),
        "player",
    );
    loader
        .join()
        .map_err(|_| anyhow::anyhow!("animation loader panicked"))?;

    let results: Rc<RefCell<Vec<Value>>> = Rc::default();
    let sink = Rc::clone(&results);
    frames
        .manager_mut()
        .subscribe_callback(EXIT_RESULT_TOPIC, move |m| sink.borrow_mut().push(m.payload.clone()));

    // Walk forward for a second.
    press(&mut frames, player, Key::Forward, true)?;
    frames.run_frames(60, FRAME);
    press(&mut frames, player, Key::Forward, false)?;
    frames.run_frames(30, FRAME);
    let position = frames
        .manager()
        .get_by_id(player)
        .map(Entity::position)
        .unwrap_or_default();
    println!(
        "player at {position} after {} frames ({:.2}s simulated)",
        frames.frame_count(),
        frames.sim_time()
    );

    // Click the monitor and the neon from eye height.
    let eye = position + Vec3::new(0.0, 1.6, 0.0);
    for target in ["Desk Monitor", "Ceiling Neon"] {
        let Some(center) = scene.object(target).and_then(|o| o.bounds()).map(|b| b.center()) else {
            anyhow::bail!("scene has no node named '{target}'");
        };
        let Some(ray) = Ray::new(eye, center - eye) else {
            continue;
        };
        let clicked = click_at(frames.manager_mut(), &ray, eye, config.interaction.pick_distance);
        println!("clicked {target}: {clicked} prop(s) reacted");
        frames.step(FRAME);
    }

    frames.manager_mut().publish(EXIT_TOPIC, serde_json::json!({}));
    for result in results.borrow().iter() {
        println!("exit result: {result}");
    }
    println!("state hash: {}", frames.state_hash());
    Ok(())
}

fn press(frames: &mut FrameLoop, player: EntityId, key: Key, pressed: bool) -> Result<(), anyhow::Error> {
    let input = frames
        .manager_mut()
        .component_mut::<CharacterInput>(player)
        .ok_or_else(|| anyhow::anyhow!("player has no input component"))?;
    if pressed {
        input.press(key);
    } else {
        input.release(key);
    }
    Ok(())
}
