use std::collections::{HashMap, HashSet};

use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use log::error;
use wgpu::util::DeviceExt;

use super::context::{Gpu, SceneTargets};
use super::shaders;
use crate::mesh::{MeshData, MeshSource, Vertex};
use crate::scene::{CameraMatrices, RenderComponent, Scene, WorldLight};

pub const MAX_LIGHTS: usize = 32;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.03,
    g: 0.03,
    b: 0.05,
    a: 1.0,
};

/// Forward renderer drawing every [`RenderComponent`] of a scene.
pub struct SceneRenderer {
    pipeline: wgpu::RenderPipeline,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    object_layout: wgpu::BindGroupLayout,
    mesh_cache: HashMap<String, MeshBuffers>,
    missing_meshes: HashSet<String>,
    default_mesh: MeshBuffers,
}

impl SceneRenderer {
    pub fn new(gpu: &Gpu) -> Self {
        let device = &gpu.device;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mesh-shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::MESH.into()),
        });

        let frame_layout = uniform_layout(device, "frame-bind-layout");
        let object_layout = uniform_layout(device, "object-bind-layout");

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mesh-pipeline-layout"),
            bind_group_layouts: &[&frame_layout, &object_layout],
            push_constant_ranges: &[],
        });

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame-uniform"),
            size: std::mem::size_of::<FrameUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame-bind-group"),
            layout: &frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("mesh-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3],
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: SceneTargets::DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
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

        let default_mesh = MeshBuffers::from_mesh(device, &MeshData::cube(0.5), "default-cube");

        Self {
            pipeline,
            frame_buffer,
            frame_bind_group,
            object_layout,
            mesh_cache: HashMap::new(),
            missing_meshes: HashSet::new(),
            default_mesh,
        }
    }

    /// Clears the scene targets and draws all renderable objects into them.
    pub fn render(
        &mut self,
        gpu: &Gpu,
        encoder: &mut wgpu::CommandEncoder,
        targets: &SceneTargets,
        scene: &Scene,
        camera: &CameraMatrices,
    ) {
        let uniform = FrameUniform::new(camera, scene.ambient_light, &scene.lights());
        gpu.queue.write_buffer(&self.frame_buffer, 0, bytes_of(&uniform));

        let mut draws = Vec::new();
        for object in scene.objects() {
            let Some(render) = object.get::<RenderComponent>() else {
                continue;
            };
            let key = self.ensure_mesh_loaded(&gpu.device, &render.mesh);
            let constants = ObjectConstants::new(scene.world_transform(object.id), render);
            let buffer = gpu
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("object-uniform"),
                    contents: bytes_of(&constants),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("object-bind-group"),
                layout: &self.object_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            draws.push((key, bind_group));
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("scene-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: targets.color_view(),
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: targets.depth_view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.frame_bind_group, &[]);
        for (key, bind_group) in &draws {
            let mesh = key
                .as_ref()
                .and_then(|key| self.mesh_cache.get(key))
                .unwrap_or(&self.default_mesh);
            pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.set_bind_group(1, bind_group, &[]);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }

    /// Cache key of the uploaded mesh, or `None` to draw the fallback cube.
    fn ensure_mesh_loaded(&mut self, device: &wgpu::Device, source: &MeshSource) -> Option<String> {
        let key = source.cache_key();
        if self.mesh_cache.contains_key(&key) {
            return Some(key);
        }
        if self.missing_meshes.contains(&key) {
            return None;
        }
        match source.load() {
            Ok(mesh) => {
                self.mesh_cache
                    .insert(key.clone(), MeshBuffers::from_mesh(device, &mesh, &key));
                Some(key)
            }
            Err(err) => {
                error!("failed to load mesh {key}: {err:?}");
                self.missing_meshes.insert(key);
                None
            }
        }
    }
}

fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct LightUniform {
    position_radius: [f32; 4],
    color_intensity: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FrameUniform {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    ambient_count: [f32; 4],
    lights: [LightUniform; MAX_LIGHTS],
}

impl FrameUniform {
    /// Lights past [`MAX_LIGHTS`] are dropped.
    fn new(camera: &CameraMatrices, ambient: Vec3, lights: &[WorldLight]) -> Self {
        let mut uniform = Self::zeroed();
        uniform.view_proj = camera.view_proj.to_cols_array_2d();
        uniform.camera_position = camera.position.extend(1.0).to_array();
        let count = lights.len().min(MAX_LIGHTS);
        uniform.ambient_count = ambient.extend(count as f32).to_array();
        for (slot, light) in uniform.lights.iter_mut().zip(lights) {
            *slot = LightUniform {
                position_radius: light.position.extend(light.radius).to_array(),
                color_intensity: light.color.extend(light.intensity).to_array(),
            };
        }
        uniform
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ObjectConstants {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
    color: [f32; 4],
}

impl ObjectConstants {
    fn new(model: Mat4, render: &RenderComponent) -> Self {
        let normal = Mat3::from_mat4(model).inverse().transpose();
        Self {
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
            color: render.color.to_array(),
        }
    }
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light(x: f32) -> WorldLight {
        WorldLight {
            position: Vec3::new(x, 0.0, 0.0),
            color: Vec3::ONE,
            radius: 5.0,
            intensity: 250.0,
        }
    }

    #[test]
    fn frame_uniform_packs_lights() {
        let camera = CameraMatrices::from_view_projection(Mat4::IDENTITY, Mat4::IDENTITY);
        let uniform = FrameUniform::new(&camera, Vec3::splat(0.1), &[light(1.0), light(2.0)]);
        assert_eq!(uniform.ambient_count, [0.1, 0.1, 0.1, 2.0]);
        assert_eq!(uniform.lights[1].position_radius, [2.0, 0.0, 0.0, 5.0]);
        assert_eq!(uniform.lights[1].color_intensity[3], 250.0);
        assert_eq!(uniform.lights[2].position_radius, [0.0; 4]);
    }

    #[test]
    fn lights_beyond_limit_are_dropped() {
        let camera = CameraMatrices::from_view_projection(Mat4::IDENTITY, Mat4::IDENTITY);
        let lights: Vec<_> = (0..40).map(|ix| light(ix as f32)).collect();
        let uniform = FrameUniform::new(&camera, Vec3::ZERO, &lights);
        assert_eq!(uniform.ambient_count[3], MAX_LIGHTS as f32);
        assert_eq!(uniform.lights[MAX_LIGHTS - 1].position_radius[0], 31.0);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let constants = ObjectConstants::new(model, &RenderComponent::default());
        assert_eq!(constants.normal[0][0], 0.5);
        assert_eq!(constants.color, [1.0; 4]);
    }
}
