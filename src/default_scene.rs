//! The demo course used when no scene file is given.

use anyhow::Result;
use glam::{Vec3, Vec4};

use crate::gameplay::{DEAD_PLAYER, LIGHTS, PARTICLES, PLAYER, SHADOW_LIGHT};
use crate::mesh::MeshSource;
use crate::particles::ParticleSystem;
use crate::scene::{
    Light, ObjectId, RenderComponent, Scene, SceneError, SimpleCameraControl, TriggerVolume,
};

const RED: Vec4 = Vec4::new(0.85, 0.1, 0.1, 1.0);
const GROUND: Vec4 = Vec4::new(0.35, 0.55, 0.25, 1.0);

/// `(x, scale)` of each mushroom, in course order.
const MUSHROOMS: [(f32, f32); 8] = [
    (-50.0, 0.5),
    (-100.0, 0.5),
    (-150.0, 1.0),
    (-200.0, 1.0),
    (-250.0, 0.5),
    (-280.0, 0.5),
    (-310.0, 0.5),
    (-350.0, 1.0),
];

const PLANES: [f32; 4] = [350.0, 0.0, -370.0, -700.0];

pub fn build_default_scene() -> Result<Scene> {
    let mut scene = Scene::new();

    add_lights(&mut scene)?;

    if let Some(camera) = scene.main_camera().and_then(|id| scene.get_mut(id)) {
        camera.set_position(Vec3::new(0.0, 6.8, 2.0));
        camera.set_rotation_euler(Vec3::new(90.0, 0.0, -180.0));
        camera.look_at(Vec3::ZERO);
        camera.set_scale(Vec3::splat(0.8));
        camera.add_component(SimpleCameraControl::default())?;
    }

    for (index, (x, scale)) in MUSHROOMS.into_iter().enumerate() {
        let id = spawn(
            &mut scene,
            &format!("Mushroom{}", index + 1),
            Vec3::new(x, 0.0, -0.66),
            Vec3::new(90.0, 0.0, 0.0),
            Vec3::splat(scale),
        );
        add(&mut scene, id, RenderComponent::new(MeshSource::Cube, RED))?;
    }

    for (index, x) in PLANES.into_iter().enumerate() {
        let name = match index {
            0 => "Plane".to_string(),
            n => format!("Plane{}", n + 1),
        };
        let id = spawn(
            &mut scene,
            &name,
            Vec3::new(x, -130.0, 62.0),
            Vec3::new(90.0, 0.0, -180.0),
            Vec3::new(375.0, 125.0, 250.0),
        );
        add(
            &mut scene,
            id,
            RenderComponent::new(MeshSource::Plane { size: 1.0 }, GROUND),
        )?;
    }

    let exit = spawn(
        &mut scene,
        "Exit",
        Vec3::new(-409.5, -3.38, -0.34),
        Vec3::new(90.0, 0.0, 140.0),
        Vec3::splat(3.0),
    );
    add(
        &mut scene,
        exit,
        RenderComponent::new(MeshSource::Cube, Vec4::new(0.9, 0.8, 0.2, 1.0)),
    )?;
    add(&mut scene, exit, TriggerVolume::default())?;

    let player = spawn(
        &mut scene,
        PLAYER,
        Vec3::new(6.0, 0.0, 1.0),
        Vec3::new(90.0, 0.0, 90.0),
        Vec3::splat(0.5),
    );
    add(&mut scene, player, RenderComponent::new(MeshSource::Cube, RED))?;
    add(&mut scene, player, TriggerVolume::default())?;

    // Parked below the ground until the player dies.
    let dead = spawn(
        &mut scene,
        DEAD_PLAYER,
        Vec3::new(0.0, 0.0, -20.0),
        Vec3::new(-90.0, 0.0, 90.0),
        Vec3::splat(0.5),
    );
    add(
        &mut scene,
        dead,
        RenderComponent::new(MeshSource::Cube, Vec4::new(0.3, 0.3, 0.3, 1.0)),
    )?;

    let shadow = scene.create_game_object(SHADOW_LIGHT);
    if let Some(object) = scene.get_mut(shadow) {
        object.set_position(Vec3::new(3.0, 3.0, 5.0));
        object.look_at(Vec3::ZERO);
        object.add_component(Light::default())?;
    }

    let particles = scene.create_game_object(PARTICLES);
    let mut system = ParticleSystem::new();
    system.add_emitter(
        Vec3::ZERO,
        Vec3::new(0.0, -1.0, 10.0),
        10.0,
        Vec4::new(0.0, 1.0, 0.0, 1.0),
        0.5,
    )?;
    add(&mut scene, particles, system)?;

    Ok(scene)
}

/// Two rows of eleven lights along the course, grouped under one parent.
fn add_lights(scene: &mut Scene) -> Result<(), SceneError> {
    let group = scene.create_game_object(LIGHTS);
    for ix in 0..22 {
        let (position, light) = if ix <= 10 {
            (
                Vec3::new(-50.0 * ix as f32, 1.0, 40.0),
                Light::new(Vec3::new(0.49, 1.0, 0.32), 5.0, 250.0),
            )
        } else {
            (
                Vec3::new(-50.0 * (ix - 11) as f32, -90.0, 100.0),
                Light::new(Vec3::new(0.45, 0.678, 0.1872), 30.0, 500.0),
            )
        };
        let id = scene.create_game_object(format!("Light{ix}"));
        if let Some(object) = scene.get_mut(id) {
            object.set_position(position);
        }
        add(scene, id, light)?;
        scene.add_child(group, id)?;
    }
    Ok(())
}

fn spawn(scene: &mut Scene, name: &str, position: Vec3, euler: Vec3, scale: Vec3) -> ObjectId {
    let id = scene.create_game_object(name);
    if let Some(object) = scene.get_mut(id) {
        object.set_position(position);
        object.set_rotation_euler(euler);
        object.set_scale(scale);
    }
    id
}

fn add<T: crate::scene::ComponentType>(
    scene: &mut Scene,
    id: ObjectId,
    component: T,
) -> Result<(), SceneError> {
    scene
        .get_mut(id)
        .ok_or(SceneError::UnknownObject(id))?
        .add_component(component)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Camera;

    #[test]
    fn course_has_every_object() {
        let scene = build_default_scene().unwrap();
        assert_eq!(scene.object_count(), 41);
        assert_eq!(scene.lights().len(), 23);
        for name in [PLAYER, DEAD_PLAYER, SHADOW_LIGHT, PARTICLES, "Exit", "Plane4", "Mushroom8"] {
            assert!(scene.find_object_by_name(name).is_some(), "{name} missing");
        }
    }

    #[test]
    fn lights_are_grouped() {
        let scene = build_default_scene().unwrap();
        let group = scene.find_id_by_name(LIGHTS).unwrap();
        let children = scene.children(group);
        assert_eq!(children.len(), 22);
        let back_row = scene.get(children[11]).unwrap();
        assert_eq!(back_row.position, Vec3::new(0.0, -90.0, 100.0));
        assert_eq!(back_row.get::<Light>().unwrap().radius, 30.0);
    }

    #[test]
    fn camera_faces_the_origin() {
        let scene = build_default_scene().unwrap();
        let camera = scene.get(scene.main_camera().unwrap()).unwrap();
        assert!(camera.has::<Camera>() && camera.has::<SimpleCameraControl>());
        let forward = camera.rotation * Vec3::NEG_Z;
        let expected = (Vec3::ZERO - camera.position).normalize();
        assert!(forward.dot(expected) > 0.999);
    }

    #[test]
    fn particles_have_one_emitter() {
        let scene = build_default_scene().unwrap();
        let system = scene
            .find_object_by_name(PARTICLES)
            .unwrap()
            .get::<ParticleSystem>()
            .unwrap();
        assert_eq!(system.emitters().len(), 1);
        assert_eq!(system.emitters()[0].spawn_rate, 10.0);
        system.validate().unwrap();
    }

    #[test]
    fn survives_a_json_round_trip() {
        let scene = build_default_scene().unwrap();
        let loaded = Scene::from_json(&scene.to_json().unwrap()).unwrap();
        assert_eq!(loaded.object_count(), 41);
        assert_eq!(loaded.main_camera(), scene.main_camera());
    }
}
