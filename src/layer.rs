use anyhow::Result;
use bitflags::bitflags;
use serde_json::Value;

use crate::app::AppContext;

bitflags! {
    /// Hooks a layer wants to be called for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LayerFunctions: u32 {
        const ON_APP_LOAD = 1 << 0;
        const ON_APP_UNLOAD = 1 << 1;
        const ON_SCENE_LOAD = 1 << 2;
        const ON_SCENE_UNLOAD = 1 << 3;
        const ON_UPDATE = 1 << 4;
        const ON_LATE_UPDATE = 1 << 5;
        const ON_PRE_RENDER = 1 << 6;
        const ON_RENDER = 1 << 7;
        const ON_POST_RENDER = 1 << 8;
        const ON_WINDOW_RESIZE = 1 << 9;
        const ALL = (1 << 10) - 1;
    }
}

/// Command encoder and swap chain view of the frame being drawn.
pub struct RenderFrame<'a> {
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub surface_view: &'a wgpu::TextureView,
}

/// A slice of application behaviour. The application calls each hook on
/// every enabled layer whose [`overrides`](Self::overrides) include it.
#[allow(unused_variables)]
pub trait ApplicationLayer {
    fn name(&self) -> &str;

    fn overrides(&self) -> LayerFunctions;

    fn enabled(&self) -> bool {
        true
    }

    /// Settings written under the layer's name when no settings file exists.
    fn default_config(&self) -> Value {
        Value::Null
    }

    fn on_app_load(&mut self, ctx: &mut AppContext, config: &Value) -> Result<()> {
        Ok(())
    }

    fn on_app_unload(&mut self, ctx: &mut AppContext) -> Result<()> {
        Ok(())
    }

    fn on_scene_load(&mut self, ctx: &mut AppContext) -> Result<()> {
        Ok(())
    }

    fn on_scene_unload(&mut self, ctx: &mut AppContext) -> Result<()> {
        Ok(())
    }

    fn on_update(&mut self, ctx: &mut AppContext) -> Result<()> {
        Ok(())
    }

    fn on_late_update(&mut self, ctx: &mut AppContext) -> Result<()> {
        Ok(())
    }

    fn on_pre_render(&mut self, ctx: &mut AppContext, frame: &mut RenderFrame<'_>) -> Result<()> {
        Ok(())
    }

    fn on_render(&mut self, ctx: &mut AppContext, frame: &mut RenderFrame<'_>) -> Result<()> {
        Ok(())
    }

    fn on_post_render(&mut self, ctx: &mut AppContext, frame: &mut RenderFrame<'_>) -> Result<()> {
        Ok(())
    }

    fn on_window_resize(
        &mut self,
        ctx: &mut AppContext,
        old_size: (u32, u32),
        new_size: (u32, u32),
    ) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_covers_every_hook() {
        let every = LayerFunctions::ON_APP_LOAD
            | LayerFunctions::ON_APP_UNLOAD
            | LayerFunctions::ON_SCENE_LOAD
            | LayerFunctions::ON_SCENE_UNLOAD
            | LayerFunctions::ON_UPDATE
            | LayerFunctions::ON_LATE_UPDATE
            | LayerFunctions::ON_PRE_RENDER
            | LayerFunctions::ON_RENDER
            | LayerFunctions::ON_POST_RENDER
            | LayerFunctions::ON_WINDOW_RESIZE;
        assert_eq!(every, LayerFunctions::ALL);
    }
}
