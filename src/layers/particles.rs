use std::collections::{HashMap, HashSet};

use anyhow::Result;
use log::{debug, warn};
use serde_json::Value;

use crate::app::AppContext;
use crate::layer::{ApplicationLayer, LayerFunctions, RenderFrame};
use crate::particles::{
    max_gpu_capacity, CpuParticleSimulator, GpuParticleSystem, ParticlePipelines, ParticleSystem,
    MAX_CPU_CAPACITY,
};
use crate::scene::{ObjectId, Scene};

enum Simulation {
    Gpu(GpuParticleSystem),
    Cpu(CpuParticleSimulator),
}

impl Simulation {
    fn live_count(&self) -> u32 {
        match self {
            Self::Gpu(system) => system.live_count(),
            Self::Cpu(system) => system.live_count(),
        }
    }
}

/// Owns the simulation state of every particle system in the scene. Systems
/// run on the GPU when one is attached and on the CPU otherwise.
#[derive(Default)]
pub struct ParticleLayer {
    pipelines: Option<ParticlePipelines>,
    simulations: HashMap<ObjectId, Simulation>,
    rejected: HashSet<ObjectId>,
}

impl ParticleLayer {
    pub fn simulation_count(&self) -> usize {
        self.simulations.len()
    }

    fn start_simulation(&mut self, ctx: &AppContext, scene: &mut Scene, id: ObjectId) -> bool {
        let Some(object) = scene.get_mut(id) else {
            return false;
        };
        let Some(system) = object.get_mut::<ParticleSystem>() else {
            return false;
        };
        let backend = ctx.gpu.as_ref().zip(self.pipelines.as_ref());
        let limit = backend.map_or(MAX_CPU_CAPACITY, |(gpu, _)| {
            max_gpu_capacity(&gpu.device.limits())
        });
        if let Err(err) = system.validate_within(limit) {
            if self.rejected.insert(id) {
                warn!("Particle system on `{}` is invalid: {err}", object.name);
            }
            return false;
        }
        let simulation = match backend {
            Some((gpu, pipelines)) => {
                Simulation::Gpu(GpuParticleSystem::new(&gpu.device, pipelines, system))
            }
            None => Simulation::Cpu(CpuParticleSimulator::new(system)),
        };
        system.mark_initialized();
        debug!("Started particle simulation for {id}");
        self.simulations.insert(id, simulation);
        true
    }
}

impl ApplicationLayer for ParticleLayer {
    fn name(&self) -> &str {
        "particles"
    }

    fn overrides(&self) -> LayerFunctions {
        LayerFunctions::ON_APP_LOAD
            | LayerFunctions::ON_SCENE_UNLOAD
            | LayerFunctions::ON_UPDATE
            | LayerFunctions::ON_POST_RENDER
    }

    fn on_app_load(&mut self, ctx: &mut AppContext, _config: &Value) -> Result<()> {
        self.pipelines = ctx.gpu.as_ref().map(|gpu| ParticlePipelines::new(&gpu.device));
        Ok(())
    }

    fn on_scene_unload(&mut self, _ctx: &mut AppContext) -> Result<()> {
        self.simulations.clear();
        self.rejected.clear();
        Ok(())
    }

    fn on_update(&mut self, ctx: &mut AppContext) -> Result<()> {
        let Some(mut scene) = ctx.scene.take() else {
            return Ok(());
        };
        if scene.is_playing {
            self.step(ctx, &mut scene);
        }
        ctx.scene = Some(scene);
        Ok(())
    }

    fn on_post_render(&mut self, ctx: &mut AppContext, frame: &mut RenderFrame<'_>) -> Result<()> {
        let aspect = ctx.aspect_ratio();
        let (Some(pipelines), Some(gpu), Some(targets), Some(scene)) = (
            self.pipelines.as_ref(),
            ctx.gpu.as_ref(),
            ctx.targets.as_ref(),
            ctx.scene.as_ref(),
        ) else {
            return Ok(());
        };
        let Some(camera) = scene.camera_matrices(aspect) else {
            return Ok(());
        };

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("particle-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: targets.color_view(),
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: targets.depth_view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        for simulation in self.simulations.values() {
            if let Simulation::Gpu(system) = simulation {
                system.render(&gpu.queue, pipelines, &mut pass, &camera);
            }
        }
        Ok(())
    }
}

impl ParticleLayer {
    fn step(&mut self, ctx: &AppContext, scene: &mut Scene) {
        let dt = ctx.timing.delta_time();
        let ids: Vec<ObjectId> = scene
            .objects()
            .filter(|object| object.has::<ParticleSystem>())
            .map(|object| object.id)
            .collect();
        self.simulations.retain(|id, _| ids.contains(id));

        for id in ids {
            if !self.simulations.contains_key(&id) && !self.start_simulation(ctx, scene, id) {
                continue;
            }
            let model = scene.world_transform(id);
            let Some(system) = scene.get_mut(id).and_then(|o| o.get_mut::<ParticleSystem>()) else {
                continue;
            };
            let gravity = system.gravity;
            let Some(simulation) = self.simulations.get_mut(&id) else {
                continue;
            };
            match simulation {
                Simulation::Gpu(gpu_system) => {
                    if let (Some(gpu), Some(pipelines)) = (ctx.gpu.as_ref(), self.pipelines.as_ref()) {
                        gpu_system.update(&gpu.device, &gpu.queue, pipelines, dt, model, gravity);
                    }
                }
                Simulation::Cpu(cpu_system) => cpu_system.update(dt, model, gravity),
            }
            system.set_particle_count(simulation.live_count());
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec3, Vec4};

    use super::*;

    fn scene_with_fountain(rate: f32) -> (Scene, ObjectId) {
        let mut scene = Scene::new();
        let id = scene.create_game_object("fountain");
        let mut system = ParticleSystem::new();
        system
            .add_emitter(Vec3::ZERO, Vec3::Z, rate, Vec4::ONE, 0.2)
            .unwrap();
        scene.get_mut(id).unwrap().add_component(system).unwrap();
        scene.is_playing = true;
        (scene, id)
    }

    fn count(ctx: &AppContext, id: ObjectId) -> u32 {
        ctx.scene
            .as_ref()
            .unwrap()
            .get(id)
            .unwrap()
            .get::<ParticleSystem>()
            .unwrap()
            .particle_count()
    }

    #[test]
    fn headless_systems_run_on_the_cpu() {
        let (scene, id) = scene_with_fountain(10.0);
        let mut ctx = AppContext::new((100, 100), false);
        ctx.scene = Some(scene);
        let mut layer = ParticleLayer::default();
        layer.on_app_load(&mut ctx, &Value::Null).unwrap();

        for _ in 0..60 {
            ctx.timing.advance(1.0 / 60.0);
            layer.on_update(&mut ctx).unwrap();
        }
        assert_eq!(layer.simulation_count(), 1);
        let live = count(&ctx, id);
        assert!((8..=11).contains(&live), "{live}");

        let system = ctx.scene.as_ref().unwrap().get(id).unwrap();
        assert!(system.get::<ParticleSystem>().unwrap().is_initialized());
    }

    #[test]
    fn paused_scenes_do_not_simulate() {
        let (mut scene, id) = scene_with_fountain(10.0);
        scene.is_playing = false;
        let mut ctx = AppContext::new((100, 100), false);
        ctx.scene = Some(scene);
        let mut layer = ParticleLayer::default();
        ctx.timing.advance(1.0);
        layer.on_update(&mut ctx).unwrap();
        assert_eq!(layer.simulation_count(), 0);
        assert_eq!(count(&ctx, id), 0);
    }

    #[test]
    fn invalid_systems_are_skipped() {
        let (mut scene, id) = scene_with_fountain(10.0);
        let object = scene.get_mut(id).unwrap();
        object.get_mut::<ParticleSystem>().unwrap().emitter_mut(0).unwrap().spawn_rate = 0.0;
        let mut ctx = AppContext::new((100, 100), false);
        ctx.scene = Some(scene);
        let mut layer = ParticleLayer::default();
        for _ in 0..2 {
            ctx.timing.advance(0.1);
            layer.on_update(&mut ctx).unwrap();
        }
        assert_eq!(layer.simulation_count(), 0);
        assert_eq!(layer.rejected.len(), 1);
    }

    #[test]
    fn oversized_systems_are_rejected_without_allocating() {
        let json = r#"{"max_particles": 4294967295, "emitters": [{"spawn_rate": 1.0}]}"#;
        let system: ParticleSystem = serde_json::from_str(json).unwrap();
        let mut scene = Scene::new();
        let id = scene.create_game_object("flood");
        scene.get_mut(id).unwrap().add_component(system).unwrap();
        scene.is_playing = true;

        let mut ctx = AppContext::new((100, 100), false);
        ctx.scene = Some(scene);
        let mut layer = ParticleLayer::default();
        ctx.timing.advance(0.1);
        layer.on_update(&mut ctx).unwrap();
        assert_eq!(layer.simulation_count(), 0);
        assert!(layer.rejected.contains(&id));
        assert_eq!(count(&ctx, id), 0);
    }

    #[test]
    fn scene_unload_drops_state() {
        let (scene, _) = scene_with_fountain(5.0);
        let mut ctx = AppContext::new((100, 100), false);
        ctx.scene = Some(scene);
        let mut layer = ParticleLayer::default();
        ctx.timing.advance(0.1);
        layer.on_update(&mut ctx).unwrap();
        assert_eq!(layer.simulation_count(), 1);
        layer.on_scene_unload(&mut ctx).unwrap();
        assert_eq!(layer.simulation_count(), 0);
    }
}
