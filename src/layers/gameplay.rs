use anyhow::Result;
use log::debug;
use serde_json::Value;

use super::parse_config;
use crate::app::AppContext;
use crate::gameplay::{Controls, Runner, RunnerConfig, TICK};
use crate::layer::{ApplicationLayer, LayerFunctions};

/// Caps catch-up after a long frame.
const MAX_TICKS_PER_FRAME: u32 = 5;

/// Drives the ladybug runner at a fixed tick rate.
#[derive(Debug, Default)]
pub struct GameplayLayer {
    config: RunnerConfig,
    runner: Option<Runner>,
    accumulator: f32,
}

impl GameplayLayer {
    pub fn runner(&self) -> Option<&Runner> {
        self.runner.as_ref()
    }
}

impl ApplicationLayer for GameplayLayer {
    fn name(&self) -> &str {
        "gameplay"
    }

    fn overrides(&self) -> LayerFunctions {
        LayerFunctions::ON_APP_LOAD
            | LayerFunctions::ON_SCENE_LOAD
            | LayerFunctions::ON_SCENE_UNLOAD
            | LayerFunctions::ON_UPDATE
    }

    fn default_config(&self) -> Value {
        serde_json::to_value(RunnerConfig::default()).unwrap_or(Value::Null)
    }

    fn on_app_load(&mut self, _ctx: &mut AppContext, config: &Value) -> Result<()> {
        self.config = parse_config(self.name(), config)?;
        Ok(())
    }

    fn on_scene_load(&mut self, _ctx: &mut AppContext) -> Result<()> {
        self.runner = Some(Runner::new(self.config.clone()));
        self.accumulator = 0.0;
        Ok(())
    }

    fn on_scene_unload(&mut self, _ctx: &mut AppContext) -> Result<()> {
        self.runner = None;
        Ok(())
    }

    fn on_update(&mut self, ctx: &mut AppContext) -> Result<()> {
        let (Some(runner), Some(scene)) = (self.runner.as_mut(), ctx.scene.as_mut()) else {
            return Ok(());
        };
        if !scene.is_playing {
            return Ok(());
        }

        self.accumulator += ctx.timing.delta_time();
        let mut controls = Controls::from_input(&ctx.input);
        let mut ticks = 0;
        while self.accumulator + 1e-6 >= TICK {
            if ticks == MAX_TICKS_PER_FRAME {
                debug!("Dropping {:.3}s of gameplay time", self.accumulator);
                self.accumulator = 0.0;
                break;
            }
            runner.tick(scene, controls);
            controls = controls.held();
            self.accumulator -= TICK;
            ticks += 1;
        }
        self.accumulator = self.accumulator.max(0.0);
        Ok(())
    }
}
