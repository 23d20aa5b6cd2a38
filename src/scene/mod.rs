//! Scene graph of component-carrying game objects.

pub mod components;
mod object;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glam::{Mat4, Vec3};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::input::InputState;
pub use components::{
    euler_degrees, quat_from_euler_degrees, Camera, Component, ComponentType, Light,
    RenderComponent, RotatingBehaviour, SimpleCameraControl, TriggerVolume,
};
pub use object::{GameObject, ObjectId};

pub const MAIN_CAMERA_NAME: &str = "Main Camera";

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("object `{object}` already has a {component} component")]
    DuplicateComponent {
        object: String,
        component: &'static str,
    },
    #[error("no object with id {0}")]
    UnknownObject(ObjectId),
    #[error("object id {0} is used more than once")]
    DuplicateObject(ObjectId),
    #[error("cannot parent {child} under {parent}: it would create a cycle")]
    InvalidParent { parent: ObjectId, child: ObjectId },
    #[error("invalid scene JSON")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to access scene file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// View and projection of the main camera, plus the camera basis used for
/// billboards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMatrices {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_proj: Mat4,
    pub position: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl CameraMatrices {
    pub fn from_view_projection(view: Mat4, projection: Mat4) -> Self {
        let camera_to_world = view.inverse();
        Self {
            view,
            projection,
            view_proj: projection * view,
            position: camera_to_world.w_axis.truncate(),
            right: camera_to_world.x_axis.truncate().normalize_or_zero(),
            up: camera_to_world.y_axis.truncate().normalize_or_zero(),
        }
    }
}

/// A light resolved to world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldLight {
    pub position: Vec3,
    pub color: Vec3,
    pub radius: f32,
    pub intensity: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    Entered { trigger: ObjectId, other: ObjectId },
    Left { trigger: ObjectId, other: ObjectId },
}

#[derive(Debug, Clone)]
pub struct Scene {
    objects: Vec<GameObject>,
    main_camera: Option<ObjectId>,
    pub ambient_light: Vec3,
    pub gravity: Vec3,
    pub is_playing: bool,
    awake: bool,
    next_id: u64,
    pending_removal: Vec<ObjectId>,
    overlaps: HashSet<(ObjectId, ObjectId)>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize)]
struct SceneFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    main_camera: Option<ObjectId>,
    #[serde(default = "default_ambient")]
    ambient_light: Vec3,
    #[serde(default = "default_gravity")]
    gravity: Vec3,
    #[serde(default)]
    objects: Vec<GameObject>,
}

fn default_ambient() -> Vec3 {
    Vec3::splat(0.1)
}

fn default_gravity() -> Vec3 {
    Vec3::new(0.0, 0.0, -9.81)
}

impl Scene {
    /// Empty scene holding only the main camera.
    pub fn new() -> Self {
        let mut scene = Self::empty();
        let camera = scene.create_game_object(MAIN_CAMERA_NAME);
        if let Some(object) = scene.get_mut(camera) {
            object.components.push(Camera::default().into());
        }
        scene.main_camera = Some(camera);
        scene
    }

    fn empty() -> Self {
        Self {
            objects: Vec::new(),
            main_camera: None,
            ambient_light: default_ambient(),
            gravity: default_gravity(),
            is_playing: false,
            awake: false,
            next_id: 1,
            pending_removal: Vec::new(),
            overlaps: HashSet::new(),
        }
    }

    pub fn create_game_object(&mut self, name: impl Into<String>) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.push(GameObject::new(id, name));
        id
    }

    pub fn objects(&self) -> impl Iterator<Item = &GameObject> {
        self.objects.iter()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn get(&self, id: ObjectId) -> Option<&GameObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    /// First object called `name`, in creation order.
    pub fn find_object_by_name(&self, name: &str) -> Option<&GameObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn find_object_by_name_mut(&mut self, name: &str) -> Option<&mut GameObject> {
        self.objects.iter_mut().find(|o| o.name == name)
    }

    pub fn find_id_by_name(&self, name: &str) -> Option<ObjectId> {
        self.find_object_by_name(name).map(|o| o.id)
    }

    pub fn main_camera(&self) -> Option<ObjectId> {
        self.main_camera
    }

    pub fn set_main_camera(&mut self, id: ObjectId) -> Result<(), SceneError> {
        let object = self.get(id).ok_or(SceneError::UnknownObject(id))?;
        if !object.has::<Camera>() {
            warn!("Main camera `{}` has no camera component", object.name);
        }
        self.main_camera = Some(id);
        Ok(())
    }

    /// Queues `id` and its descendants for removal at the next flush.
    pub fn remove_game_object(&mut self, id: ObjectId) {
        if !self.pending_removal.contains(&id) {
            self.pending_removal.push(id);
        }
    }

    fn flush_removals(&mut self) {
        if self.pending_removal.is_empty() {
            return;
        }
        let mut doomed = Vec::new();
        let mut stack = std::mem::take(&mut self.pending_removal);
        while let Some(id) = stack.pop() {
            if doomed.contains(&id) {
                continue;
            }
            if let Some(object) = self.get(id) {
                stack.extend_from_slice(&object.children);
                doomed.push(id);
            }
        }
        for id in &doomed {
            if let Some(parent) = self.get(*id).and_then(GameObject::parent) {
                if let Some(parent) = self.get_mut(parent) {
                    parent.children.retain(|child| child != id);
                }
            }
        }
        self.objects.retain(|o| !doomed.contains(&o.id));
        self.overlaps
            .retain(|(a, b)| !doomed.contains(a) && !doomed.contains(b));
        if self.main_camera.is_some_and(|id| doomed.contains(&id)) {
            warn!("Main camera was removed from the scene");
            self.main_camera = None;
        }
    }

    /// Attaches `child` under `parent`, detaching it from any previous parent.
    pub fn add_child(&mut self, parent: ObjectId, child: ObjectId) -> Result<(), SceneError> {
        if self.get(parent).is_none() {
            return Err(SceneError::UnknownObject(parent));
        }
        let current = self
            .get(child)
            .ok_or(SceneError::UnknownObject(child))?
            .parent;
        if current == Some(parent) {
            warn!("{child} is already a child of {parent}");
            return Ok(());
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(SceneError::InvalidParent { parent, child });
        }
        if let Some(old) = current {
            self.remove_child(old, child);
        }
        if let Some(object) = self.get_mut(parent) {
            object.children.push(child);
        }
        if let Some(object) = self.get_mut(child) {
            object.parent = Some(parent);
        }
        Ok(())
    }

    /// Detaches `child` from `parent`. Returns false if it was not a child.
    pub fn remove_child(&mut self, parent: ObjectId, child: ObjectId) -> bool {
        let Some(object) = self.get_mut(parent) else {
            return false;
        };
        let before = object.children.len();
        object.children.retain(|c| *c != child);
        if object.children.len() == before {
            return false;
        }
        if let Some(object) = self.get_mut(child) {
            object.parent = None;
        }
        true
    }

    pub fn children(&self, id: ObjectId) -> &[ObjectId] {
        self.get(id).map(GameObject::children).unwrap_or(&[])
    }

    fn is_ancestor(&self, ancestor: ObjectId, mut id: ObjectId) -> bool {
        while let Some(parent) = self.get(id).and_then(GameObject::parent) {
            if parent == ancestor {
                return true;
            }
            id = parent;
        }
        false
    }

    /// Parent world transform times the local transform.
    pub fn world_transform(&self, id: ObjectId) -> Mat4 {
        let Some(object) = self.get(id) else {
            return Mat4::IDENTITY;
        };
        let local = object.local_transform();
        match object.parent {
            Some(parent) => self.world_transform(parent) * local,
            None => local,
        }
    }

    pub fn world_position(&self, id: ObjectId) -> Vec3 {
        self.world_transform(id).w_axis.truncate()
    }

    pub fn awake(&mut self) {
        self.awake = true;
        info!("Scene awake with {} objects", self.objects.len());
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Runs one frame of component behaviours (only while playing).
    pub fn update(&mut self, dt: f32, input: &InputState) {
        self.flush_removals();
        if self.is_playing {
            for object in &mut self.objects {
                let (position, rotation, components) = object.transform_and_components_mut();
                for component in components.iter_mut() {
                    match component {
                        Component::RotatingBehaviour(rotating) => rotating.apply(rotation, dt),
                        Component::SimpleCameraControl(control) => {
                            control.apply(position, rotation, input, dt)
                        }
                        _ => {}
                    }
                }
            }
        }
        self.flush_removals();
    }

    /// Recomputes trigger overlaps and reports changes since the last call.
    pub fn update_triggers(&mut self) -> Vec<TriggerEvent> {
        let volumes: Vec<(ObjectId, Vec3, Vec3)> = self
            .objects
            .iter()
            .filter_map(|object| {
                let trigger = object.get::<TriggerVolume>()?;
                let (scale, _, center) = self.world_transform(object.id).to_scale_rotation_translation();
                Some((object.id, center, trigger.half_extents * scale.abs()))
            })
            .collect();

        let mut current = HashSet::new();
        for (i, (a, a_center, a_half)) in volumes.iter().enumerate() {
            for (b, b_center, b_half) in &volumes[i + 1..] {
                let gap = (*a_center - *b_center).abs();
                if gap.cmple(*a_half + *b_half).all() {
                    current.insert((*a, *b));
                }
            }
        }

        let mut events = Vec::new();
        for pair in current.difference(&self.overlaps) {
            self.log_trigger("entered", *pair);
            events.push(TriggerEvent::Entered {
                trigger: pair.0,
                other: pair.1,
            });
        }
        for pair in self.overlaps.difference(&current) {
            self.log_trigger("left", *pair);
            events.push(TriggerEvent::Left {
                trigger: pair.0,
                other: pair.1,
            });
        }
        self.overlaps = current;
        events
    }

    fn log_trigger(&self, verb: &str, (a, b): (ObjectId, ObjectId)) {
        let name = |id| self.get(id).map(|o| o.name.as_str()).unwrap_or("<removed>");
        info!("{} {verb} trigger volume {}", name(b), name(a));
    }

    pub fn camera_matrices(&self, aspect: f32) -> Option<CameraMatrices> {
        let id = self.main_camera?;
        let camera = self.get(id)?.get::<Camera>()?;
        let (_, rotation, translation) = self.world_transform(id).to_scale_rotation_translation();
        let view = Mat4::from_rotation_translation(rotation, translation).inverse();
        let projection = Mat4::perspective_rh(
            camera.fov_degrees.to_radians(),
            aspect.max(0.01),
            camera.near,
            camera.far,
        );
        Some(CameraMatrices::from_view_projection(view, projection))
    }

    pub fn lights(&self) -> Vec<WorldLight> {
        self.objects
            .iter()
            .filter_map(|object| {
                let light = object.get::<Light>()?;
                Some(WorldLight {
                    position: self.world_position(object.id),
                    color: light.color,
                    radius: light.radius,
                    intensity: light.intensity,
                })
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String, SceneError> {
        let file = SceneFile {
            main_camera: self.main_camera,
            ambient_light: self.ambient_light,
            gravity: self.gravity,
            objects: self.objects.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        let file: SceneFile = serde_json::from_str(json)?;
        let mut scene = Self::empty();
        scene.ambient_light = file.ambient_light;
        scene.gravity = file.gravity;
        scene.objects = file.objects;
        let mut seen = HashSet::new();
        for object in &scene.objects {
            if !seen.insert(object.id) {
                return Err(SceneError::DuplicateObject(object.id));
            }
            object.check_components()?;
        }
        scene.next_id = scene.objects.iter().map(|o| o.id.0).max().unwrap_or(0) + 1;

        let links: Vec<(ObjectId, ObjectId)> = scene
            .objects
            .iter()
            .filter_map(|o| o.parent.map(|parent| (parent, o.id)))
            .collect();
        for object in &mut scene.objects {
            object.parent = None;
            object.children.clear();
        }
        for (parent, child) in links {
            if let Err(err) = scene.add_child(parent, child) {
                warn!("Dropping parent link of {child}: {err}");
            }
        }

        scene.main_camera = file
            .main_camera
            .filter(|id| scene.get(*id).is_some_and(GameObject::has::<Camera>))
            .or_else(|| {
                scene
                    .objects
                    .iter()
                    .find(|o| o.has::<Camera>())
                    .map(|o| o.id)
            });
        Ok(scene)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SceneError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Saved scene to {}", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::ParticleSystem;
    use glam::{Vec4, Quat};

    #[test]
    fn new_scene_has_main_camera() {
        let scene = Scene::new();
        let camera = scene.main_camera().unwrap();
        assert_eq!(scene.get(camera).unwrap().name, MAIN_CAMERA_NAME);
        assert!(scene.camera_matrices(16.0 / 9.0).is_some());
    }

    #[test]
    fn reparenting_moves_child() {
        let mut scene = Scene::new();
        let a = scene.create_game_object("a");
        let b = scene.create_game_object("b");
        let c = scene.create_game_object("c");
        scene.add_child(a, c).unwrap();
        scene.add_child(a, c).unwrap();
        assert_eq!(scene.children(a), &[c]);
        scene.add_child(b, c).unwrap();
        assert!(scene.children(a).is_empty());
        assert_eq!(scene.get(c).unwrap().parent(), Some(b));
        assert!(matches!(
            scene.add_child(c, b),
            Err(SceneError::InvalidParent { .. })
        ));
        assert!(scene.remove_child(b, c));
        assert!(!scene.remove_child(b, c));
    }

    #[test]
    fn world_transform_composes_parents() {
        let mut scene = Scene::new();
        let parent = scene.create_game_object("parent");
        let child = scene.create_game_object("child");
        scene.get_mut(parent).unwrap().set_position(Vec3::new(10.0, 0.0, 0.0));
        scene.get_mut(parent).unwrap().set_scale(Vec3::splat(2.0));
        scene.get_mut(child).unwrap().set_position(Vec3::new(1.0, 0.0, 0.0));
        scene.add_child(parent, child).unwrap();
        assert!((scene.world_position(child) - Vec3::new(12.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn removal_is_deferred_and_recursive() {
        let mut scene = Scene::new();
        let parent = scene.create_game_object("parent");
        let child = scene.create_game_object("child");
        scene.add_child(parent, child).unwrap();
        scene.remove_game_object(parent);
        assert!(scene.get(child).is_some());
        scene.update(0.0, &InputState::new());
        assert!(scene.get(parent).is_none());
        assert!(scene.get(child).is_none());
        assert_eq!(scene.object_count(), 1);
    }

    #[test]
    fn behaviours_only_run_while_playing() {
        let mut scene = Scene::new();
        let spinner = scene.create_game_object("spinner");
        scene
            .get_mut(spinner)
            .unwrap()
            .add_component(RotatingBehaviour {
                degrees_per_second: Vec3::new(0.0, 0.0, 90.0),
            })
            .unwrap();
        scene.update(1.0, &InputState::new());
        assert_eq!(scene.get(spinner).unwrap().rotation, Quat::IDENTITY);
        scene.is_playing = true;
        scene.update(1.0, &InputState::new());
        let z = scene.get(spinner).unwrap().rotation_euler().z;
        assert!((z - 90.0).abs() < 1e-3);
    }

    #[test]
    fn triggers_report_enter_and_leave() {
        let mut scene = Scene::new();
        let a = scene.create_game_object("a");
        let b = scene.create_game_object("b");
        for id in [a, b] {
            scene
                .get_mut(id)
                .unwrap()
                .add_component(TriggerVolume::default())
                .unwrap();
        }
        scene.get_mut(b).unwrap().set_position(Vec3::new(0.8, 0.0, 0.0));
        assert_eq!(
            scene.update_triggers(),
            vec![TriggerEvent::Entered { trigger: a, other: b }]
        );
        assert!(scene.update_triggers().is_empty());
        scene.get_mut(b).unwrap().set_position(Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(
            scene.update_triggers(),
            vec![TriggerEvent::Left { trigger: a, other: b }]
        );
    }

    #[test]
    fn camera_looks_down_negative_z() {
        let mut scene = Scene::new();
        let camera = scene.main_camera().unwrap();
        scene.get_mut(camera).unwrap().set_position(Vec3::new(0.0, 0.0, 5.0));
        let matrices = scene.camera_matrices(1.0).unwrap();
        let clip = matrices.view_proj * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
        assert!((matrices.position - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-4);
    }

    #[test]
    fn json_round_trip_restores_hierarchy() {
        let mut scene = Scene::new();
        let lights = scene.create_game_object("Lights");
        let lamp = scene.create_game_object("Light");
        scene
            .get_mut(lamp)
            .unwrap()
            .add_component(Light::new(Vec3::ONE, 5.0, 250.0))
            .unwrap();
        scene.add_child(lights, lamp).unwrap();
        let particles = scene.create_game_object("Particles");
        let mut system = ParticleSystem::new();
        system
            .add_emitter(Vec3::ZERO, Vec3::Z, 10.0, Vec4::ONE, 0.5)
            .unwrap();
        scene.get_mut(particles).unwrap().add_component(system).unwrap();

        let loaded = Scene::from_json(&scene.to_json().unwrap()).unwrap();
        assert_eq!(loaded.object_count(), 4);
        assert_eq!(loaded.children(lights), &[lamp]);
        assert_eq!(loaded.main_camera(), scene.main_camera());
        assert_eq!(loaded.lights().len(), 1);
        let emitters = loaded
            .find_object_by_name("Particles")
            .and_then(|o| o.get::<ParticleSystem>())
            .map(|p| p.emitters().len());
        assert_eq!(emitters, Some(1));
        let next = loaded.clone().create_game_object("new");
        assert_eq!(next, ObjectId(5));
    }

    #[test]
    fn unknown_parents_are_dropped() {
        let json = r#"{"objects": [
            {"id": 1, "name": "cam", "components": [{"type": "Camera"}]},
            {"id": 2, "name": "orphan", "parent": 99}
        ]}"#;
        let scene = Scene::from_json(json).unwrap();
        assert_eq!(scene.get(ObjectId(2)).unwrap().parent(), None);
        assert_eq!(scene.main_camera(), Some(ObjectId(1)));
    }

    #[test]
    fn duplicate_components_in_json_are_errors() {
        let json = r#"{"objects": [
            {"id": 1, "name": "x", "components": [{"type": "Light"}, {"type": "Light"}]}
        ]}"#;
        assert!(matches!(
            Scene::from_json(json),
            Err(SceneError::DuplicateComponent { .. })
        ));
    }

    #[test]
    fn duplicate_object_ids_in_json_are_errors() {
        let json = r#"{"objects": [
            {"id": 3, "name": "a"},
            {"id": 3, "name": "b"}
        ]}"#;
        assert!(matches!(
            Scene::from_json(json),
            Err(SceneError::DuplicateObject(ObjectId(3)))
        ));
    }

    #[test]
    fn new_scene_camera_carries_camera_component() {
        let scene = Scene::new();
        let camera = scene.main_camera().unwrap();
        assert!(scene.get(camera).unwrap().has::<Camera>());
    }
}
