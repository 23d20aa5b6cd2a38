use anyhow::Result;

use crate::app::AppContext;
use crate::layer::{ApplicationLayer, LayerFunctions};

/// Runs per-object behaviours, then resolves trigger overlaps.
#[derive(Debug, Default)]
pub struct LogicLayer;

impl ApplicationLayer for LogicLayer {
    fn name(&self) -> &str {
        "logic"
    }

    fn overrides(&self) -> LayerFunctions {
        LayerFunctions::ON_UPDATE | LayerFunctions::ON_LATE_UPDATE
    }

    fn on_update(&mut self, ctx: &mut AppContext) -> Result<()> {
        let dt = ctx.timing.delta_time();
        if let Some(scene) = ctx.scene.as_mut() {
            scene.update(dt, &ctx.input);
        }
        Ok(())
    }

    fn on_late_update(&mut self, ctx: &mut AppContext) -> Result<()> {
        if let Some(scene) = ctx.scene.as_mut().filter(|scene| scene.is_playing) {
            scene.update_triggers();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::scene::{RotatingBehaviour, Scene};

    #[test]
    fn behaviours_run_only_while_playing() {
        let mut scene = Scene::new();
        let id = scene.create_game_object("spinner");
        scene
            .get_mut(id)
            .unwrap()
            .add_component(RotatingBehaviour {
                degrees_per_second: Vec3::new(0.0, 0.0, 90.0),
            })
            .unwrap();

        let mut ctx = AppContext::new((100, 100), false);
        ctx.scene = Some(scene);
        ctx.timing.advance(0.5);

        let mut layer = LogicLayer;
        layer.on_update(&mut ctx).unwrap();
        let object = ctx.scene.as_ref().unwrap().get(id).unwrap();
        assert!(object.rotation_euler().z.abs() < 1e-4);

        ctx.scene.as_mut().unwrap().is_playing = true;
        layer.on_update(&mut ctx).unwrap();
        let object = ctx.scene.as_ref().unwrap().get(id).unwrap();
        assert!((object.rotation_euler().z - 45.0).abs() < 1e-3);
    }
}
