//! The stock layers an [`Application`](crate::app::Application) runs with.

mod gameplay;
mod logic;
mod particles;
mod post_processing;
mod render;
mod scene_loader;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::app::Application;

pub use gameplay::GameplayLayer;
pub use logic::LogicLayer;
pub use particles::ParticleLayer;
pub use post_processing::PostProcessingLayer;
pub use render::RenderLayer;
pub use scene_loader::{SceneLoaderLayer, SceneSource};

/// Adds every stock layer in execution order.
pub fn install_default_layers(app: &mut Application, loader: SceneLoaderLayer) {
    app.add_layer(LogicLayer::default());
    app.add_layer(GameplayLayer::default());
    app.add_layer(RenderLayer::default());
    app.add_layer(ParticleLayer::default());
    app.add_layer(PostProcessingLayer::default());
    app.add_layer(loader);
}

/// Reads a layer's settings section; a missing section yields the defaults.
fn parse_config<T: DeserializeOwned + Default>(layer: &str, value: &Value) -> Result<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.clone())
        .with_context(|| format!("invalid settings for layer `{layer}`"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::app::AppContext;
    use crate::gameplay::RunnerConfig;

    #[test]
    fn null_section_uses_defaults() {
        let config: RunnerConfig = parse_config("gameplay", &Value::Null).unwrap();
        assert_eq!(config, RunnerConfig::default());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: RunnerConfig =
            parse_config("gameplay", &json!({ "run_speed": 1.0 })).unwrap();
        assert_eq!(config.run_speed, 1.0);
        assert_eq!(config.finish_x, -406.0);
        assert!(parse_config::<RunnerConfig>("gameplay", &json!({ "run_speed": "fast" })).is_err());
    }

    #[test]
    fn default_layers_are_ordered() {
        let mut app = Application::new(AppContext::new((640, 480), false));
        install_default_layers(&mut app, SceneLoaderLayer::new(SceneSource::Default));
        let names: Vec<_> = app.layers().map(|layer| layer.name().to_string()).collect();
        assert_eq!(
            names,
            ["logic", "gameplay", "render", "particles", "post_processing", "scene_loader"]
        );
    }
}
