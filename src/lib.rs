//! Otter: a small layered game engine.
//!
//! An [`Application`] drives a stack of [`ApplicationLayer`]s through the
//! frame lifecycle. Layers share an [`AppContext`] holding the active
//! [`Scene`], input and timing. Rendering goes through wgpu and is optional,
//! so scenes, gameplay and particle simulation also run headless.

pub mod app;
pub mod default_scene;
pub mod gameplay;
pub mod input;
pub mod layer;
pub mod layers;
pub mod mesh;
pub mod particles;
pub mod render;
pub mod scene;
pub mod settings;
pub mod timing;

pub use app::{AppContext, Application};
pub use input::{InputState, KeyCode, MouseButton, NamedKey};
pub use layer::{ApplicationLayer, LayerFunctions, RenderFrame};
pub use mesh::{load_obj_from_str, MeshData, MeshSource};
pub use particles::ParticleSystem;
pub use scene::{GameObject, Light, ObjectId, Scene};
pub use settings::AppSettings;
pub use timing::Timing;
