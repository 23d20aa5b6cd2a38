//! Layered application loop.

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::Value;

use crate::input::InputState;
use crate::layer::{ApplicationLayer, LayerFunctions, RenderFrame};
use crate::render::{Gpu, SceneTargets};
use crate::scene::Scene;
use crate::settings::{default_document, AppSettings};
use crate::timing::Timing;

/// State every layer can reach during a hook.
pub struct AppContext {
    pub scene: Option<Scene>,
    target_scene: Option<Scene>,
    pub input: InputState,
    pub timing: Timing,
    pub gpu: Option<Gpu>,
    pub targets: Option<SceneTargets>,
    window_size: (u32, u32),
    primary_viewport: [u32; 4],
    editor: bool,
    quit: bool,
}

impl AppContext {
    pub fn new(window_size: (u32, u32), editor: bool) -> Self {
        Self {
            scene: None,
            target_scene: None,
            input: InputState::new(),
            timing: Timing::new(),
            gpu: None,
            targets: None,
            window_size,
            primary_viewport: [0, 0, window_size.0, window_size.1],
            editor,
            quit: false,
        }
    }

    /// Requests a scene change at the start of the next frame.
    pub fn load_scene(&mut self, scene: Scene) {
        self.target_scene = Some(scene);
    }

    pub fn has_pending_scene(&self) -> bool {
        self.target_scene.is_some()
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    pub fn aspect_ratio(&self) -> f32 {
        let (width, height) = self.window_size;
        if height == 0 {
            1.0
        } else {
            width as f32 / height as f32
        }
    }

    /// Viewport as `[x, y, width, height]`.
    pub fn primary_viewport(&self) -> [u32; 4] {
        self.primary_viewport
    }

    pub fn is_editor(&self) -> bool {
        self.editor
    }

    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }
}

/// Owns the layers and drives them through the frame lifecycle.
pub struct Application {
    layers: Vec<Box<dyn ApplicationLayer>>,
    context: AppContext,
    settings: AppSettings,
}

impl Application {
    pub fn new(context: AppContext) -> Self {
        Self {
            layers: Vec::new(),
            context,
            settings: AppSettings::in_memory(Value::Null),
        }
    }

    pub fn add_layer(&mut self, layer: impl ApplicationLayer + 'static) {
        self.layers.push(Box::new(layer));
    }

    pub fn layers(&self) -> impl Iterator<Item = &dyn ApplicationLayer> {
        self.layers.iter().map(|layer| layer.as_ref())
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut AppContext {
        &mut self.context
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Defaults of every layer, keyed by layer name.
    pub fn default_settings(&self) -> Value {
        default_document(
            self.layers
                .iter()
                .map(|layer| (layer.name(), layer.default_config())),
        )
    }

    /// Loads settings from `path` (created from the defaults when missing), or
    /// keeps the defaults in memory when no path is given.
    pub fn load_settings(&mut self, path: Option<PathBuf>) -> Result<()> {
        let defaults = self.default_settings();
        self.settings = match path {
            Some(path) => AppSettings::load_or_create(path, defaults)?,
            None => AppSettings::in_memory(defaults),
        };
        Ok(())
    }

    /// Hands the GPU to the layers; must happen before [`load`](Self::load).
    pub fn attach_gpu(&mut self, gpu: Gpu) {
        self.context.targets = Some(SceneTargets::new(&gpu.device, self.context.window_size));
        self.context.gpu = Some(gpu);
    }

    pub fn load(&mut self) -> Result<()> {
        let Self {
            layers,
            context,
            settings,
        } = self;
        for layer in layers.iter_mut() {
            if !wants(&**layer, LayerFunctions::ON_APP_LOAD) {
                continue;
            }
            let config = settings.section(layer.name());
            layer
                .on_app_load(context, &config)
                .with_context(|| format!("layer `{}` failed to load", layer.name()))?;
        }
        info!("Application loaded with {} layers", layers.len());
        Ok(())
    }

    /// Runs one frame. Render hooks only run when `render` is supplied.
    pub fn frame(&mut self, dt: f32, render: Option<&mut RenderFrame<'_>>) -> Result<()> {
        self.apply_pending_scene()?;
        self.context.timing.advance(dt);

        if self.context.scene.is_some() {
            self.dispatch(LayerFunctions::ON_UPDATE, false, |layer, ctx| {
                layer.on_update(ctx)
            })?;
            self.dispatch(LayerFunctions::ON_LATE_UPDATE, false, |layer, ctx| {
                layer.on_late_update(ctx)
            })?;
            if let Some(frame) = render {
                self.dispatch(LayerFunctions::ON_PRE_RENDER, false, |layer, ctx| {
                    layer.on_pre_render(ctx, frame)
                })?;
                self.dispatch(LayerFunctions::ON_RENDER, false, |layer, ctx| {
                    layer.on_render(ctx, frame)
                })?;
                self.dispatch(LayerFunctions::ON_POST_RENDER, false, |layer, ctx| {
                    layer.on_post_render(ctx, frame)
                })?;
            }
        }

        self.context.input.end_frame();
        Ok(())
    }

    /// Swaps in the scene requested with [`AppContext::load_scene`], if any.
    pub fn apply_pending_scene(&mut self) -> Result<()> {
        let Some(next) = self.context.target_scene.take() else {
            return Ok(());
        };
        if self.context.scene.is_some() {
            self.dispatch(LayerFunctions::ON_SCENE_UNLOAD, true, |layer, ctx| {
                layer.on_scene_unload(ctx)
            })?;
        }

        self.context.scene = Some(next);
        self.context.timing.reset_scene_clock();
        self.dispatch(LayerFunctions::ON_SCENE_LOAD, false, |layer, ctx| {
            layer.on_scene_load(ctx)
        })?;

        let editor = self.context.editor;
        if let Some(scene) = self.context.scene.as_mut() {
            scene.awake();
            scene.is_playing = !editor;
        }
        debug!("Scene change complete");
        Ok(())
    }

    pub fn resize(&mut self, new_size: (u32, u32)) -> Result<()> {
        let old_size = self.context.window_size;
        if let Some(gpu) = self.context.gpu.as_ref() {
            self.context.targets = Some(SceneTargets::new(&gpu.device, new_size));
        }
        self.context.window_size = new_size;
        self.context.primary_viewport = [0, 0, new_size.0, new_size.1];
        self.dispatch(LayerFunctions::ON_WINDOW_RESIZE, false, |layer, ctx| {
            layer.on_window_resize(ctx, old_size, new_size)
        })
    }

    pub fn unload(&mut self) -> Result<()> {
        self.dispatch(LayerFunctions::ON_APP_UNLOAD, true, |layer, ctx| {
            layer.on_app_unload(ctx)
        })
    }

    fn dispatch(
        &mut self,
        hook: LayerFunctions,
        reverse: bool,
        mut call: impl FnMut(&mut dyn ApplicationLayer, &mut AppContext) -> Result<()>,
    ) -> Result<()> {
        let order: Vec<usize> = if reverse {
            (0..self.layers.len()).rev().collect()
        } else {
            (0..self.layers.len()).collect()
        };
        for index in order {
            let layer = self.layers[index].as_mut();
            if !wants(layer, hook) {
                continue;
            }
            call(&mut *layer, &mut self.context)
                .with_context(|| format!("layer `{}` failed in {hook:?}", layer.name()))?;
        }
        Ok(())
    }
}

fn wants(layer: &dyn ApplicationLayer, hook: LayerFunctions) -> bool {
    layer.enabled() && layer.overrides().contains(hook)
}
