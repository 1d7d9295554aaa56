//! Scene graph handles and the scene-description loader.
//!
//! A scene arrives as JSON: a tree of named nodes with optional bounds and
//! visibility. Nodes may carry a `components` string, itself a JSON array of
//! `{ "type": ..., "topic": ... }` descriptors naming the props to attach.
//! [`load_scene`] builds the node tree, creates one anonymous entity per
//! annotated node and, when any node is marked `collidable`, one
//! `"environment"` entity holding a [`Collidable`] over those nodes.
//!
//! ```
//! use atrium_ecs::prelude::*;
//! use atrium_engine::scene::{load_scene, SceneDescription};
//!
//! let description = SceneDescription::from_json_str(r#"{
//!     "nodes": [{
//!         "name": "Desk Monitor",
//!         "bounds": { "center": [0, 1, 4], "size": [1, 1, 0.2] },
//!         "components": "[{\"type\": \"MonitorComponent\", \"topic\": \"monitor.desk\"}]"
//!     }]
//! }"#).unwrap();
//!
//! let mut manager = EntityManager::new();
//! let scene = load_scene(&mut manager, &description).unwrap();
//! assert_eq!(scene.entities.len(), 1);
//! assert!(scene.object("Desk Monitor").unwrap().is_visible());
//! ```

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use atrium_ecs::prelude::{EcsError, Entity, EntityId, EntityManager};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::geometry::Aabb;
use crate::props::{Clickable, Collidable, Exit, Led, Monitor, Neon};

/// Errors from parsing or instantiating a scene description.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("failed to read scene file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed scene description: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("node '{node}' has malformed component descriptors: {source}")]
    Descriptor {
        node: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("node '{node}' names unknown component type '{kind}'")]
    UnknownComponent { node: String, kind: String },

    #[error("node '{node}': {kind} requires a topic")]
    MissingTopic { node: String, kind: String },

    #[error(transparent)]
    Component(#[from] EcsError),
}

// ---------------------------------------------------------------------------
// SceneObject
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SceneNode {
    name: String,
    visible: bool,
    bounds: Option<Aabb>,
    children: Vec<SceneObject>,
}

/// Shared handle to one node of the scene tree.
///
/// Props and the loader hold clones of the same handle; visibility changes
/// made by one are seen by all.
#[derive(Debug, Clone)]
pub struct SceneObject(Rc<RefCell<SceneNode>>);

impl SceneObject {
    /// A visible node without bounds or children.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Rc::new(RefCell::new(SceneNode {
            name: name.into(),
            visible: true,
            bounds: None,
            children: Vec::new(),
        })))
    }

    pub fn with_bounds(self, bounds: Aabb) -> Self {
        self.0.borrow_mut().bounds = Some(bounds);
        self
    }

    pub fn with_child(self, child: SceneObject) -> Self {
        self.add_child(child);
        self
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn is_visible(&self) -> bool {
        self.0.borrow().visible
    }

    pub fn set_visible(&self, visible: bool) {
        self.0.borrow_mut().visible = visible;
    }

    /// Flip visibility and return the new value.
    pub fn toggle_visible(&self) -> bool {
        let mut node = self.0.borrow_mut();
        node.visible = !node.visible;
        node.visible
    }

    /// Bounds of this node alone.
    pub fn own_bounds(&self) -> Option<Aabb> {
        self.0.borrow().bounds
    }

    /// Bounds enclosing this node and all its descendants.
    pub fn bounds(&self) -> Option<Aabb> {
        let node = self.0.borrow();
        node.children
            .iter()
            .filter_map(SceneObject::bounds)
            .fold(node.bounds, |acc, b| Some(acc.map_or(b, |a| a.union(&b))))
    }

    /// Every individual box in this subtree, in pre-order.
    pub fn collect_bounds(&self, out: &mut Vec<Aabb>) {
        let node = self.0.borrow();
        out.extend(node.bounds);
        for child in &node.children {
            child.collect_bounds(out);
        }
    }

    pub fn child(&self, index: usize) -> Option<SceneObject> {
        self.0.borrow().children.get(index).cloned()
    }

    pub fn children(&self) -> Vec<SceneObject> {
        self.0.borrow().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.borrow().children.len()
    }

    pub fn add_child(&self, child: SceneObject) {
        self.0.borrow_mut().children.push(child);
    }

    /// First node named `name` in pre-order, including this one.
    pub fn find(&self, name: &str) -> Option<SceneObject> {
        if self.0.borrow().name == name {
            return Some(self.clone());
        }
        self.0.borrow().children.iter().find_map(|c| c.find(name))
    }

    /// Whether both handles point at the same node.
    pub fn ptr_eq(&self, other: &SceneObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// ---------------------------------------------------------------------------
// Description
// ---------------------------------------------------------------------------

/// Box given by centre and full size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsDescription {
    pub center: Vec3,
    pub size: Vec3,
}

/// One `{type, topic}` entry of a node's `components` string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub topic: Option<String>,
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub name: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub bounds: Option<BoundsDescription>,
    /// JSON-encoded array of [`ComponentDescriptor`]s, as exported by the
    /// modelling tool.
    #[serde(default)]
    pub components: Option<String>,
    /// Part of the static geometry that blocks movement.
    #[serde(default)]
    pub collidable: bool,
    #[serde(default)]
    pub children: Vec<NodeDescription>,
}

impl NodeDescription {
    /// Decode the `components` string. A node without one has none.
    pub fn descriptors(&self) -> Result<Vec<ComponentDescriptor>, SceneError> {
        match &self.components {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(raw).map_err(|source| SceneError::Descriptor {
                node: self.name.clone(),
                source,
            }),
        }
    }
}

fn default_root_name() -> String {
    "Scene".to_owned()
}

/// A complete scene: an implicit root named `name` over `nodes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    #[serde(default = "default_root_name")]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeDescription>,
}

impl SceneDescription {
    pub fn from_json_str(json: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// What [`load_scene`] created.
#[derive(Debug)]
pub struct LoadedScene {
    pub root: SceneObject,
    /// Prop entities, in scene pre-order.
    pub entities: Vec<EntityId>,
    /// The entity holding the static collidables, if any node is collidable.
    pub environment: Option<EntityId>,
}

impl LoadedScene {
    /// Node lookup by name.
    pub fn object(&self, name: &str) -> Option<SceneObject> {
        self.root.find(name)
    }
}

/// Build the node tree and register one entity per annotated node.
///
/// Every entity is built before any is registered, so a descriptor error
/// leaves `manager` untouched.
pub fn load_scene(
    manager: &mut EntityManager,
    description: &SceneDescription,
) -> Result<LoadedScene, SceneError> {
    let root = SceneObject::new(description.name.clone());
    let mut props = Vec::new();
    let mut collidables = Vec::new();

    for node in &description.nodes {
        let object = build_node(node, &mut props, &mut collidables)?;
        root.add_child(object);
    }

    let entities: Vec<EntityId> = props
        .into_iter()
        .map(|entity| manager.add(entity, ""))
        .collect();
    let environment = (!collidables.is_empty()).then(|| {
        manager.add(
            Entity::new().with_component(Collidable::new(collidables)),
            "environment",
        )
    });

    tracing::debug!(
        scene = %description.name,
        props = entities.len(),
        collidable = environment.is_some(),
        "scene loaded"
    );
    Ok(LoadedScene {
        root,
        entities,
        environment,
    })
}

fn build_node(
    node: &NodeDescription,
    props: &mut Vec<Entity>,
    collidables: &mut Vec<SceneObject>,
) -> Result<SceneObject, SceneError> {
    let object = SceneObject::new(node.name.clone());
    object.set_visible(node.visible);
    if let Some(b) = node.bounds {
        object.0.borrow_mut().bounds = Some(Aabb::from_center_size(b.center, b.size));
    }

    let descriptors = node.descriptors()?;
    if !descriptors.is_empty() {
        let mut entity = Entity::new();
        for descriptor in &descriptors {
            attach(&mut entity, node, descriptor, &object)?;
        }
        if let Some(b) = node.bounds {
            entity = entity.at(b.center);
        }
        props.push(entity);
    }
    if node.collidable {
        collidables.push(object.clone());
    }

    for child in &node.children {
        object.add_child(build_node(child, props, collidables)?);
    }
    Ok(object)
}

fn attach(
    entity: &mut Entity,
    node: &NodeDescription,
    descriptor: &ComponentDescriptor,
    object: &SceneObject,
) -> Result<(), SceneError> {
    let topic = || {
        descriptor
            .topic
            .clone()
            .ok_or_else(|| SceneError::MissingTopic {
                node: node.name.clone(),
                kind: descriptor.kind.clone(),
            })
    };

    match descriptor.kind.as_str() {
        "ClickableComponent" => {
            entity.add_component(Clickable::new(object.clone(), topic()?));
        }
        "MonitorComponent" => {
            entity.add_component(Monitor::new(object.clone(), topic()?)?);
        }
        "NeonComponent" => {
            entity.add_component(Neon::new(object.clone(), topic()?));
        }
        "LedComponent" => {
            entity.add_component(Led::new(object.clone(), topic()?));
        }
        "ExitComponent" => {
            entity.add_component(Exit::new());
        }
        other => {
            return Err(SceneError::UnknownComponent {
                node: node.name.clone(),
                kind: other.to_owned(),
            })
        }
    }
    Ok(())
}
