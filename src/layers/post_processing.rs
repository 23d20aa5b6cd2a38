use anyhow::Result;
use log::debug;
use serde_json::Value;

use super::parse_config;
use crate::app::AppContext;
use crate::layer::{ApplicationLayer, LayerFunctions, RenderFrame};
use crate::render::{PostProcessingConfig, PostProcessor};

/// Runs the configured effect chain and presents the result to the window.
#[derive(Default)]
pub struct PostProcessingLayer {
    config: PostProcessingConfig,
    processor: Option<PostProcessor>,
}

impl PostProcessingLayer {
    pub fn config(&self) -> &PostProcessingConfig {
        &self.config
    }
}

impl ApplicationLayer for PostProcessingLayer {
    fn name(&self) -> &str {
        "post_processing"
    }

    fn overrides(&self) -> LayerFunctions {
        LayerFunctions::ON_APP_LOAD
            | LayerFunctions::ON_APP_UNLOAD
            | LayerFunctions::ON_POST_RENDER
            | LayerFunctions::ON_WINDOW_RESIZE
    }

    fn default_config(&self) -> Value {
        serde_json::to_value(PostProcessingConfig::default()).unwrap_or(Value::Null)
    }

    fn on_app_load(&mut self, ctx: &mut AppContext, config: &Value) -> Result<()> {
        self.config = parse_config(self.name(), config)?;
        let enabled = self.config.chain(ctx.window_size(), 0.0).len();
        debug!("Post-processing with {enabled} enabled effects");
        self.processor = ctx
            .gpu
            .as_ref()
            .map(|gpu| PostProcessor::new(gpu, ctx.window_size()));
        Ok(())
    }

    fn on_app_unload(&mut self, _ctx: &mut AppContext) -> Result<()> {
        self.processor = None;
        Ok(())
    }

    fn on_post_render(&mut self, ctx: &mut AppContext, frame: &mut RenderFrame<'_>) -> Result<()> {
        let (Some(processor), Some(gpu), Some(targets)) =
            (self.processor.as_ref(), ctx.gpu.as_ref(), ctx.targets.as_ref())
        else {
            return Ok(());
        };
        processor.apply(
            gpu,
            frame.encoder,
            targets,
            frame.surface_view,
            &self.config,
            ctx.timing.unscaled_time_since_app_load(),
        );
        Ok(())
    }

    fn on_window_resize(
        &mut self,
        ctx: &mut AppContext,
        _old_size: (u32, u32),
        new_size: (u32, u32),
    ) -> Result<()> {
        if let (Some(processor), Some(gpu)) = (self.processor.as_mut(), ctx.gpu.as_ref()) {
            processor.resize(gpu, new_size);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn settings_section_configures_effects() {
        let mut ctx = AppContext::new((320, 240), false);
        let mut layer = PostProcessingLayer::default();
        let config = json!({
            "outline": { "enabled": true, "threshold": 0.25 },
            "color_correction": { "enabled": false }
        });
        layer.on_app_load(&mut ctx, &config).unwrap();
        assert!(layer.config().outline.enabled);
        assert_eq!(layer.config().outline.threshold, 0.25);
        assert!(!layer.config().color_correction.enabled);
        assert!(layer.processor.is_none());
    }

    #[test]
    fn default_config_round_trips() {
        let layer = PostProcessingLayer::default();
        let mut ctx = AppContext::new((320, 240), false);
        let mut loaded = PostProcessingLayer::default();
        loaded.on_app_load(&mut ctx, &layer.default_config()).unwrap();
        assert_eq!(loaded.config(), &PostProcessingConfig::default());
    }
}
