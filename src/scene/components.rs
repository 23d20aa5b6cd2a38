use glam::{EulerRot, Quat, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::input::{InputState, KeyCode, MouseButton, NamedKey};
use crate::mesh::MeshSource;
use crate::particles::ParticleSystem;

/// Perspective camera. Looks down its object's local -Z axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Camera {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov_degrees: 90.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Point light with inverse-square falloff scaled by `radius`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Light {
    pub color: Vec3,
    pub radius: f32,
    pub intensity: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            radius: 1.0,
            intensity: 10.0,
        }
    }
}

impl Light {
    pub fn new(color: Vec3, radius: f32, intensity: f32) -> Self {
        Self {
            color,
            radius,
            intensity,
        }
    }

    /// Light reaching a point `distance` units away, relative to `intensity`.
    pub fn attenuation(&self, distance: f32) -> f32 {
        let radius = self.radius.max(f32::EPSILON);
        radius / (radius + distance * distance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderComponent {
    pub mesh: MeshSource,
    pub color: Vec4,
}

impl Default for RenderComponent {
    fn default() -> Self {
        Self {
            mesh: MeshSource::Cube,
            color: Vec4::ONE,
        }
    }
}

impl RenderComponent {
    pub fn new(mesh: MeshSource, color: Vec4) -> Self {
        Self { mesh, color }
    }
}

/// Axis aligned box around the object's world position, scaled with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerVolume {
    pub half_extents: Vec3,
}

impl Default for TriggerVolume {
    fn default() -> Self {
        Self {
            half_extents: Vec3::splat(0.5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RotatingBehaviour {
    /// Euler rates around X, Y and Z.
    pub degrees_per_second: Vec3,
}

impl RotatingBehaviour {
    pub fn apply(&self, rotation: &mut Quat, dt: f32) {
        let euler = euler_degrees(*rotation) + self.degrees_per_second * dt;
        *rotation = quat_from_euler_degrees(euler);
    }
}

/// Fly camera: drag with the left mouse button to look around, WASD to move,
/// Space/LeftCtrl for up/down and LeftShift to speed up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleCameraControl {
    pub mouse_sensitivity: Vec2,
    pub move_speeds: Vec3,
    pub shift_multiplier: f32,
    /// Accumulated (yaw, pitch) in degrees; seeded from the object on first use.
    #[serde(skip)]
    current_rotation: Option<Vec2>,
}

impl Default for SimpleCameraControl {
    fn default() -> Self {
        Self {
            mouse_sensitivity: Vec2::new(0.5, 0.3),
            move_speeds: Vec3::ONE,
            shift_multiplier: 2.0,
            current_rotation: None,
        }
    }
}

impl SimpleCameraControl {
    pub fn apply(&mut self, position: &mut Vec3, rotation: &mut Quat, input: &InputState, dt: f32) {
        if !input.is_mouse_button_down(MouseButton::LEFT) {
            return;
        }
        let current = self.current_rotation.get_or_insert_with(|| {
            let euler = euler_degrees(*rotation);
            Vec2::new(euler.z, euler.x)
        });
        *current += input.mouse_delta() * self.mouse_sensitivity;
        let look = Quat::from_axis_angle(Vec3::Z, current.x.to_radians())
            * Quat::from_axis_angle(Vec3::X, current.y.to_radians());
        *rotation = look;

        let mut movement = Vec3::ZERO;
        let held = |c: char| input.is_key_down(KeyCode::Character(c));
        if held('W') {
            movement.z -= self.move_speeds.x;
        }
        if held('S') {
            movement.z += self.move_speeds.x;
        }
        if held('A') {
            movement.x -= self.move_speeds.y;
        }
        if held('D') {
            movement.x += self.move_speeds.y;
        }
        if input.is_key_down(KeyCode::Named(NamedKey::LeftCtrl)) {
            movement.y -= self.move_speeds.z;
        }
        if input.is_key_down(KeyCode::SPACE) {
            movement.y += self.move_speeds.z;
        }
        if input.is_key_down(KeyCode::Named(NamedKey::LeftShift)) {
            movement *= self.shift_multiplier;
        }
        *position += look * (movement * dt);
    }
}

/// Every component kind an object can carry, at most one of each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Component {
    Camera(Camera),
    Light(Light),
    RenderComponent(RenderComponent),
    ParticleSystem(ParticleSystem),
    TriggerVolume(TriggerVolume),
    RotatingBehaviour(RotatingBehaviour),
    SimpleCameraControl(SimpleCameraControl),
}

impl Component {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Camera(_) => Camera::NAME,
            Self::Light(_) => Light::NAME,
            Self::RenderComponent(_) => RenderComponent::NAME,
            Self::ParticleSystem(_) => ParticleSystem::NAME,
            Self::TriggerVolume(_) => TriggerVolume::NAME,
            Self::RotatingBehaviour(_) => RotatingBehaviour::NAME,
            Self::SimpleCameraControl(_) => SimpleCameraControl::NAME,
        }
    }
}

/// Typed access to one variant of [`Component`].
pub trait ComponentType: Sized + Into<Component> {
    const NAME: &'static str;

    fn from_component(component: &Component) -> Option<&Self>;
    fn from_component_mut(component: &mut Component) -> Option<&mut Self>;
}

macro_rules! component_type {
    ($ty:ident) => {
        impl ComponentType for $ty {
            const NAME: &'static str = stringify!($ty);

            fn from_component(component: &Component) -> Option<&Self> {
                match component {
                    Component::$ty(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_component_mut(component: &mut Component) -> Option<&mut Self> {
                match component {
                    Component::$ty(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Component {
            fn from(value: $ty) -> Self {
                Component::$ty(value)
            }
        }
    };
}

component_type!(Camera);
component_type!(Light);
component_type!(RenderComponent);
component_type!(ParticleSystem);
component_type!(TriggerVolume);
component_type!(RotatingBehaviour);
component_type!(SimpleCameraControl);

/// Rotation from XYZ Euler angles in degrees, applied X first, then Y, then Z.
pub fn quat_from_euler_degrees(degrees: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::ZYX,
        degrees.z.to_radians(),
        degrees.y.to_radians(),
        degrees.x.to_radians(),
    )
}

/// Inverse of [`quat_from_euler_degrees`].
pub fn euler_degrees(rotation: Quat) -> Vec3 {
    let (z, y, x) = rotation.to_euler(EulerRot::ZYX);
    Vec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euler_round_trip() {
        let euler = Vec3::new(84.0, 10.0, -120.0);
        let back = euler_degrees(quat_from_euler_degrees(euler));
        assert!((back - euler).length() < 1e-3, "{back:?}");
    }

    #[test]
    fn components_serialize_with_type_tag() {
        let component: Component = Light::new(Vec3::X, 5.0, 250.0).into();
        let json = serde_json::to_value(&component).unwrap();
        assert_eq!(json["type"], "Light");
        assert_eq!(json["radius"], 5.0);
        let back: Component = serde_json::from_value(json).unwrap();
        assert_eq!(back, component);
        assert_eq!(back.type_name(), "Light");
    }

    #[test]
    fn light_attenuation_falls_off() {
        let light = Light::new(Vec3::ONE, 5.0, 250.0);
        assert_eq!(light.attenuation(0.0), 1.0);
        assert!(light.attenuation(10.0) < light.attenuation(1.0));
    }

    #[test]
    fn rotating_behaviour_accumulates() {
        let rotating = RotatingBehaviour {
            degrees_per_second: Vec3::new(0.0, 0.0, 90.0),
        };
        let mut rotation = Quat::IDENTITY;
        rotating.apply(&mut rotation, 0.5);
        assert!((euler_degrees(rotation).z - 45.0).abs() < 1e-3);
    }

    #[test]
    fn camera_control_needs_mouse_drag() {
        let mut control = SimpleCameraControl::default();
        let mut input = InputState::new();
        input.key_pressed(KeyCode::Character('W'));
        let mut position = Vec3::ZERO;
        let mut rotation = Quat::IDENTITY;
        control.apply(&mut position, &mut rotation, &input, 1.0);
        assert_eq!(position, Vec3::ZERO);

        input.mouse_pressed(MouseButton::LEFT);
        control.apply(&mut position, &mut rotation, &input, 1.0);
        assert!((position - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }
}
