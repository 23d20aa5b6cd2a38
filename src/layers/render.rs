use anyhow::Result;
use log::{info, warn};
use serde_json::Value;

use crate::app::AppContext;
use crate::layer::{ApplicationLayer, LayerFunctions, RenderFrame};
use crate::render::SceneRenderer;

/// Draws the scene from the main camera into the offscreen targets.
#[derive(Default)]
pub struct RenderLayer {
    renderer: Option<SceneRenderer>,
    warned_no_camera: bool,
}

impl ApplicationLayer for RenderLayer {
    fn name(&self) -> &str {
        "render"
    }

    fn overrides(&self) -> LayerFunctions {
        LayerFunctions::ON_APP_LOAD | LayerFunctions::ON_APP_UNLOAD | LayerFunctions::ON_RENDER
    }

    fn on_app_load(&mut self, ctx: &mut AppContext, _config: &Value) -> Result<()> {
        match ctx.gpu.as_ref() {
            Some(gpu) => self.renderer = Some(SceneRenderer::new(gpu)),
            None => info!("No GPU available, scene rendering disabled"),
        }
        Ok(())
    }

    fn on_app_unload(&mut self, _ctx: &mut AppContext) -> Result<()> {
        self.renderer = None;
        Ok(())
    }

    fn on_render(&mut self, ctx: &mut AppContext, frame: &mut RenderFrame<'_>) -> Result<()> {
        let aspect = ctx.aspect_ratio();
        let (Some(renderer), Some(gpu), Some(targets), Some(scene)) = (
            self.renderer.as_mut(),
            ctx.gpu.as_ref(),
            ctx.targets.as_ref(),
            ctx.scene.as_ref(),
        ) else {
            return Ok(());
        };
        let Some(camera) = scene.camera_matrices(aspect) else {
            if !self.warned_no_camera {
                warn!("Scene has no main camera, nothing to draw");
                self.warned_no_camera = true;
            }
            return Ok(());
        };
        renderer.render(gpu, frame.encoder, targets, scene, &camera);
        Ok(())
    }
}
