//! wgpu rendering: device bootstrap, the forward scene pass and the
//! post-processing chain.

mod context;
pub mod post;
mod scene_renderer;
mod shaders;

pub use context::{Gpu, SceneTargets, WindowSurface};
pub use post::{PostProcessingConfig, PostProcessor};
pub use scene_renderer::{SceneRenderer, MAX_LIGHTS};
