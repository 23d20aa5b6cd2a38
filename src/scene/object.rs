use std::fmt;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::components::{euler_degrees, quat_from_euler_degrees, Component, ComponentType};
use super::SceneError;

/// Unique identifier of a game object within its scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node of the scene graph: a named transform carrying components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameObject {
    pub id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Quat,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) parent: Option<ObjectId>,
    #[serde(skip)]
    pub(crate) children: Vec<ObjectId>,
    #[serde(default)]
    pub(crate) components: Vec<Component>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hide_in_hierarchy: bool,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

impl GameObject {
    pub(crate) fn new(id: ObjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            parent: None,
            children: Vec::new(),
            components: Vec::new(),
            hide_in_hierarchy: false,
        }
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.normalize();
    }

    pub fn set_rotation_euler(&mut self, degrees: Vec3) {
        self.rotation = quat_from_euler_degrees(degrees);
    }

    pub fn rotation_euler(&self) -> Vec3 {
        euler_degrees(self.rotation)
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    /// Transform relative to the parent: translation * rotation * scale.
    pub fn local_transform(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Turns the object so its local -Z axis points at `target`, keeping +Z up.
    pub fn look_at(&mut self, target: Vec3) {
        let forward = target - self.position;
        if forward.length_squared() <= f32::EPSILON {
            return;
        }
        let up = if forward.normalize().cross(Vec3::Z).length_squared() <= 1e-6 {
            Vec3::Y
        } else {
            Vec3::Z
        };
        let view = Mat4::look_at_rh(self.position, target, up);
        self.rotation = Quat::from_mat4(&view).conjugate().normalize();
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn has<T: ComponentType>(&self) -> bool {
        self.get::<T>().is_some()
    }

    pub fn get<T: ComponentType>(&self) -> Option<&T> {
        self.components.iter().find_map(T::from_component)
    }

    pub fn get_mut<T: ComponentType>(&mut self) -> Option<&mut T> {
        self.components.iter_mut().find_map(T::from_component_mut)
    }

    pub fn add_component<T: ComponentType>(&mut self, component: T) -> Result<(), SceneError> {
        if self.has::<T>() {
            return Err(SceneError::DuplicateComponent {
                object: self.name.clone(),
                component: T::NAME,
            });
        }
        self.components.push(component.into());
        Ok(())
    }

    pub fn remove_component<T: ComponentType>(&mut self) -> Option<Component> {
        let index = self
            .components
            .iter()
            .position(|c| T::from_component(c).is_some())?;
        Some(self.components.remove(index))
    }

    /// Split borrow used by behaviours that move their own object.
    pub(crate) fn transform_and_components_mut(
        &mut self,
    ) -> (&mut Vec3, &mut Quat, &mut [Component]) {
        (&mut self.position, &mut self.rotation, &mut self.components)
    }

    /// Rejects duplicated component kinds, which deserialization cannot.
    pub(crate) fn check_components(&self) -> Result<(), SceneError> {
        for (index, component) in self.components.iter().enumerate() {
            let name = component.type_name();
            if self.components[..index]
                .iter()
                .any(|other| other.type_name() == name)
            {
                return Err(SceneError::DuplicateComponent {
                    object: self.name.clone(),
                    component: name,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::components::{Camera, Light};

    #[test]
    fn duplicate_components_are_rejected() {
        let mut object = GameObject::new(ObjectId(1), "lamp");
        object.add_component(Light::default()).unwrap();
        let err = object.add_component(Light::default()).unwrap_err();
        assert!(matches!(err, SceneError::DuplicateComponent { component: "Light", .. }));
        object.add_component(Camera::default()).unwrap();
        assert!(object.has::<Camera>());
        assert!(object.remove_component::<Light>().is_some());
        assert!(!object.has::<Light>());
    }

    #[test]
    fn local_transform_is_translate_rotate_scale() {
        let mut object = GameObject::new(ObjectId(1), "box");
        object.set_position(Vec3::new(1.0, 2.0, 3.0));
        object.set_rotation_euler(Vec3::new(0.0, 0.0, 90.0));
        object.set_scale(Vec3::splat(2.0));
        let point = object.local_transform().transform_point3(Vec3::X);
        assert!((point - Vec3::new(1.0, 4.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn look_at_points_negative_z_at_target() {
        let mut object = GameObject::new(ObjectId(1), "camera");
        object.set_position(Vec3::new(3.0, 3.0, 5.0));
        object.look_at(Vec3::ZERO);
        let forward = object.rotation * Vec3::NEG_Z;
        let expected = (Vec3::ZERO - object.position).normalize();
        assert!((forward - expected).length() < 1e-4);

        // Looking straight down must not produce NaNs.
        object.set_position(Vec3::new(0.0, 0.0, 10.0));
        object.look_at(Vec3::ZERO);
        assert!(object.rotation.is_finite());
        let down = object.rotation * Vec3::NEG_Z;
        assert!((down - Vec3::NEG_Z).length() < 1e-4);
    }
}
