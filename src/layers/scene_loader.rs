use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::app::AppContext;
use crate::default_scene::build_default_scene;
use crate::layer::{ApplicationLayer, LayerFunctions};
use crate::scene::Scene;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneSource {
    /// The built-in demo course.
    Default,
    File(PathBuf),
}

/// Queues the startup scene, optionally writing it back out first.
#[derive(Debug)]
pub struct SceneLoaderLayer {
    source: SceneSource,
    save_path: Option<PathBuf>,
}

impl SceneLoaderLayer {
    pub fn new(source: SceneSource) -> Self {
        Self {
            source,
            save_path: None,
        }
    }

    pub fn with_save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<Scene> {
        match &self.source {
            SceneSource::Default => build_default_scene(),
            SceneSource::File(path) => Scene::load(path)
                .with_context(|| format!("could not load scene {}", path.display())),
        }
    }
}

impl ApplicationLayer for SceneLoaderLayer {
    fn name(&self) -> &str {
        "scene_loader"
    }

    fn overrides(&self) -> LayerFunctions {
        LayerFunctions::ON_APP_LOAD
    }

    fn on_app_load(&mut self, ctx: &mut AppContext, _config: &Value) -> Result<()> {
        if ctx.has_pending_scene() {
            return Ok(());
        }
        let scene = self.load()?;
        if let Some(path) = &self.save_path {
            scene.save(path)?;
        }
        ctx.load_scene(scene);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_source_queues_the_course() {
        let mut ctx = AppContext::new((100, 100), false);
        let mut layer = SceneLoaderLayer::new(SceneSource::Default);
        layer.on_app_load(&mut ctx, &Value::Null).unwrap();
        assert!(ctx.has_pending_scene());
    }

    #[test]
    fn saved_scene_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("course.json");
        let mut ctx = AppContext::new((100, 100), false);
        let mut layer = SceneLoaderLayer::new(SceneSource::Default).with_save_path(&path);
        layer.on_app_load(&mut ctx, &Value::Null).unwrap();

        let loaded = SceneLoaderLayer::new(SceneSource::File(path)).load().unwrap();
        assert_eq!(loaded.object_count(), 41);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let layer = SceneLoaderLayer::new(SceneSource::File(dir.path().join("nope.json")));
        let err = layer.load().unwrap_err();
        assert!(err.to_string().contains("could not load scene"));
    }

    #[test]
    fn pending_scene_wins() {
        let mut ctx = AppContext::new((100, 100), false);
        ctx.load_scene(Scene::new());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unused.json");
        let mut layer = SceneLoaderLayer::new(SceneSource::Default).with_save_path(&path);
        layer.on_app_load(&mut ctx, &Value::Null).unwrap();
        assert!(!path.exists());
    }
}
