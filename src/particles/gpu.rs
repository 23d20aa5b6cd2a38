use std::sync::Arc;

use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat4, Vec3};
use log::{debug, warn};
use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use super::buffers::{initial_contents, live_count, DrawArgs, PingPong};
use super::{pcg_hash, shaders, ParticleData, ParticleSystem};
use crate::render::SceneTargets;
use crate::scene::CameraMatrices;

const WORKGROUP_SIZE: u32 = 64;

// Velocity is skipped; the renderer only needs where a particle is and how old.
const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 5] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: std::mem::offset_of!(ParticleData, position) as u64,
        shader_location: 0,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Uint32,
        offset: std::mem::offset_of!(ParticleData, kind) as u64,
        shader_location: 1,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32,
        offset: std::mem::offset_of!(ParticleData, lifetime) as u64,
        shader_location: 2,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x4,
        offset: std::mem::offset_of!(ParticleData, color) as u64,
        shader_location: 3,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x4,
        offset: std::mem::offset_of!(ParticleData, metadata) as u64,
        shader_location: 4,
    },
];

/// Uniform block of the simulation kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SimParams {
    pub model: [[f32; 4]; 4],
    pub gravity_dt: [f32; 4],
    pub counts: [u32; 4],
}

impl SimParams {
    pub fn new(model: Mat4, gravity: Vec3, dt: f32, emitters: u32, capacity: u32, seed: u32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            gravity_dt: gravity.extend(dt).to_array(),
            counts: [emitters, capacity, seed, 0],
        }
    }
}

/// Uniform block of the particle render pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RenderParams {
    pub view_proj: [[f32; 4]; 4],
    pub camera_right: [f32; 4],
    pub camera_up: [f32; 4],
}

impl RenderParams {
    pub fn new(camera: &CameraMatrices, particle_size: f32) -> Self {
        Self {
            view_proj: camera.view_proj.to_cols_array_2d(),
            camera_right: camera.right.extend(particle_size).to_array(),
            camera_up: camera.up.extend(0.0).to_array(),
        }
    }
}

/// Pipelines shared by every particle system on a device.
pub struct ParticlePipelines {
    simulate: wgpu::ComputePipeline,
    simulate_layout: wgpu::BindGroupLayout,
    render: wgpu::RenderPipeline,
    render_layout: wgpu::BindGroupLayout,
}

impl ParticlePipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let sim_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("particle-sim-shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::SIMULATE.into()),
        });
        let render_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("particle-render-shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::RENDER.into()),
        });

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let simulate_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("particle-sim-layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                storage(1, true),
                storage(2, true),
                storage(3, false),
                storage(4, false),
            ],
        });
        let sim_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("particle-sim-pipeline-layout"),
            bind_group_layouts: &[&simulate_layout],
            push_constant_ranges: &[],
        });
        let simulate = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("particle-sim-pipeline"),
            layout: Some(&sim_pipeline_layout),
            module: &sim_shader,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let render_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("particle-render-layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
        });
        let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("particle-render-pipeline-layout"),
            bind_group_layouts: &[&render_layout],
            push_constant_ranges: &[],
        });
        let render = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("particle-render-pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &render_shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<ParticleData>() as u64,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &INSTANCE_ATTRIBUTES,
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: SceneTargets::DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &render_shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: SceneTargets::COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        Self {
            simulate,
            simulate_layout,
            render,
            render_layout,
        }
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Largest particle buffer, in elements, the device can bind and dispatch.
pub fn max_gpu_capacity(limits: &wgpu::Limits) -> u32 {
    let element = std::mem::size_of::<ParticleData>() as u64;
    let bytes = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    let dispatch = u64::from(limits.max_compute_workgroups_per_dimension) * u64::from(WORKGROUP_SIZE);
    u32::try_from((bytes / element).min(dispatch)).unwrap_or(u32::MAX)
}

/// Progress of the asynchronous particle count readback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readback {
    Idle,
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collected {
    Nothing,
    Mapped,
    Retry,
}

impl Readback {
    /// Starts a readback unless one is in flight.
    fn request(&mut self) -> bool {
        if *self == Readback::Idle {
            *self = Readback::Pending;
            true
        } else {
            false
        }
    }

    fn complete(&mut self, ok: bool) {
        *self = if ok { Readback::Ready } else { Readback::Failed };
    }

    /// Hands a finished readback to the caller and returns to `Idle`.
    fn collect(&mut self) -> Collected {
        match *self {
            Readback::Ready => {
                *self = Readback::Idle;
                Collected::Mapped
            }
            Readback::Failed => {
                *self = Readback::Idle;
                Collected::Retry
            }
            Readback::Idle | Readback::Pending => Collected::Nothing,
        }
    }
}

/// Simulation state of one particle system, resident on the GPU.
pub struct GpuParticleSystem {
    particles: [wgpu::Buffer; 2],
    args: [wgpu::Buffer; 2],
    staging: wgpu::Buffer,
    sim_params: wgpu::Buffer,
    render_params: wgpu::Buffer,
    // Indexed by the buffer being read.
    sim_bind_groups: [wgpu::BindGroup; 2],
    render_bind_group: wgpu::BindGroup,
    readback: Arc<Mutex<Readback>>,
    ping_pong: PingPong,
    emitter_count: u32,
    capacity: u32,
    particle_size: f32,
    live_count: u32,
    frame: u32,
}

impl GpuParticleSystem {
    /// Uploads the emitters once; no CPU copy is kept afterwards.
    pub fn new(device: &wgpu::Device, pipelines: &ParticlePipelines, system: &ParticleSystem) -> Self {
        let emitters = system.emitter_particles();
        let emitter_count = emitters.len() as u32;
        let contents = initial_contents(&emitters, system.max_particles());
        let initial_args = DrawArgs::with_written(emitter_count);

        let particles = [0, 1].map(|ix| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("particles-{ix}")),
                contents: bytemuck::cast_slice(&contents),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX,
            })
        });
        let args = [0, 1].map(|ix| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("particle-args-{ix}")),
                contents: bytes_of(&initial_args),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::INDIRECT
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            })
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("particle-count-staging"),
            size: DrawArgs::SIZE,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let sim_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("particle-sim-params"),
            size: std::mem::size_of::<SimParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let render_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("particle-render-params"),
            size: std::mem::size_of::<RenderParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sim_bind_groups = [0usize, 1].map(|src| {
            let dst = 1 - src;
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("particle-sim-bind-group-{src}")),
                layout: &pipelines.simulate_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: sim_params.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: particles[src].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: args[src].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: particles[dst].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: args[dst].as_entire_binding(),
                    },
                ],
            })
        });
        let render_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("particle-render-bind-group"),
            layout: &pipelines.render_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: render_params.as_entire_binding(),
            }],
        });

        debug!(
            "Uploaded particle system with {} emitters, capacity {}",
            emitter_count,
            system.capacity()
        );

        Self {
            particles,
            args,
            staging,
            sim_params,
            render_params,
            sim_bind_groups,
            render_bind_group,
            readback: Arc::new(Mutex::new(Readback::Idle)),
            ping_pong: PingPong::default(),
            emitter_count,
            capacity: system.capacity(),
            particle_size: system.particle_size,
            live_count: 0,
            frame: 0,
        }
    }

    /// Runs one simulation step and swaps the buffers.
    pub fn update(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipelines: &ParticlePipelines,
        dt: f32,
        model: Mat4,
        gravity: Vec3,
    ) {
        self.collect_count();

        let src = self.ping_pong.current_vertex();
        let dst = self.ping_pong.current_feedback();
        let params = SimParams::new(
            model,
            gravity,
            dt,
            self.emitter_count,
            self.capacity,
            pcg_hash(self.frame),
        );
        self.frame = self.frame.wrapping_add(1);

        queue.write_buffer(&self.sim_params, 0, bytes_of(&params));
        queue.write_buffer(
            &self.args[dst],
            0,
            bytes_of(&DrawArgs::with_written(self.emitter_count)),
        );

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("particle-sim-encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("particle-sim-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipelines.simulate);
            pass.set_bind_group(0, &self.sim_bind_groups[src], &[]);
            pass.dispatch_workgroups(self.capacity.div_ceil(WORKGROUP_SIZE), 1, 1);
        }

        let request_count = self.readback.lock().request();
        if request_count {
            encoder.copy_buffer_to_buffer(&self.args[dst], 0, &self.staging, 0, DrawArgs::SIZE);
        }
        queue.submit(std::iter::once(encoder.finish()));

        if request_count {
            let state = Arc::clone(&self.readback);
            self.staging
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    state.lock().complete(result.is_ok());
                });
        }
        if let Err(err) = device.poll(wgpu::PollType::Poll) {
            warn!("Particle readback poll failed: {err}");
        }

        self.ping_pong.swap();
    }

    /// Picks up a finished count readback without waiting for one.
    fn collect_count(&mut self) {
        let collected = self.readback.lock().collect();
        match collected {
            Collected::Mapped => {
                {
                    let view = self.staging.slice(..).get_mapped_range();
                    if let Some(args) = DrawArgs::from_bytes(&view) {
                        self.live_count = live_count(args.written(), self.emitter_count);
                    }
                }
                self.staging.unmap();
            }
            Collected::Retry => warn!("Particle count readback failed, retrying"),
            Collected::Nothing => {}
        }
    }

    /// Live particles as of the last completed readback.
    pub fn live_count(&self) -> u32 {
        self.live_count
    }

    /// Draws the current buffer as camera-facing quads.
    pub fn render(
        &self,
        queue: &wgpu::Queue,
        pipelines: &ParticlePipelines,
        pass: &mut wgpu::RenderPass<'_>,
        camera: &CameraMatrices,
    ) {
        let params = RenderParams::new(camera, self.particle_size);
        queue.write_buffer(&self.render_params, 0, bytes_of(&params));

        let current = self.ping_pong.current_vertex();
        pass.set_pipeline(&pipelines.render);
        pass.set_bind_group(0, &self.render_bind_group, &[]);
        pass.set_vertex_buffer(0, self.particles[current].slice(..));
        pass.draw_indirect(&self.args[current], 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_params_pack_counts_and_dt() {
        let params = SimParams::new(
            Mat4::from_translation(Vec3::X),
            Vec3::new(0.0, 0.0, -9.81),
            0.5,
            2,
            1002,
            7,
        );
        assert_eq!(std::mem::size_of::<SimParams>(), 96);
        assert_eq!(params.gravity_dt, [0.0, 0.0, -9.81, 0.5]);
        assert_eq!(params.counts, [2, 1002, 7, 0]);
        assert_eq!(params.model[3], [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn readback_waits_while_pending() {
        let mut state = Readback::Idle;
        assert!(state.request());
        assert!(!state.request());
        assert_eq!(state.collect(), Collected::Nothing);
        assert_eq!(state, Readback::Pending);

        state.complete(true);
        assert!(!state.request());
        assert_eq!(state.collect(), Collected::Mapped);
        assert_eq!(state, Readback::Idle);
    }

    #[test]
    fn failed_readback_is_retried() {
        let mut state = Readback::Idle;
        assert!(state.request());
        state.complete(false);
        assert_eq!(state.collect(), Collected::Retry);
        assert!(state.request());
        assert_eq!(state, Readback::Pending);
    }

    #[test]
    fn gpu_capacity_follows_device_limits() {
        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: 64 * 1000,
            ..wgpu::Limits::default()
        };
        assert_eq!(max_gpu_capacity(&limits), 1000);

        let limits = wgpu::Limits {
            max_compute_workgroups_per_dimension: 2,
            ..wgpu::Limits::default()
        };
        assert_eq!(max_gpu_capacity(&limits), 2 * WORKGROUP_SIZE);
    }

    #[test]
    fn render_params_carry_particle_size() {
        let camera = CameraMatrices::from_view_projection(Mat4::IDENTITY, Mat4::IDENTITY);
        let params = RenderParams::new(&camera, 0.25);
        assert_eq!(params.camera_right[3], 0.25);
        assert_eq!(std::mem::size_of::<RenderParams>(), 96);
    }
}
