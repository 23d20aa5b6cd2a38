//! Fullscreen post-processing chain.
//!
//! Enabled effects run in a fixed order, ping-ponging between two
//! intermediate colour targets; the last result is blitted to the surface.

use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use super::context::{ColorTarget, Gpu, SceneTargets};
use super::shaders;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    ColorCorrection,
    BoxFilter3x3,
    BoxFilter5x5,
    Outline,
    FilmGrain,
}

impl EffectKind {
    pub const ALL: [EffectKind; 5] = [
        EffectKind::ColorCorrection,
        EffectKind::BoxFilter3x3,
        EffectKind::BoxFilter5x5,
        EffectKind::Outline,
        EffectKind::FilmGrain,
    ];

    fn entry_point(self) -> &'static str {
        match self {
            Self::ColorCorrection => "fs_color_correction",
            Self::BoxFilter3x3 => "fs_box_filter_3x3",
            Self::BoxFilter5x5 => "fs_box_filter_5x5",
            Self::Outline => "fs_outline",
            Self::FilmGrain => "fs_film_grain",
        }
    }
}

/// Colour grade applied by the colour correction effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorPreset {
    #[default]
    Warm,
    Cool,
    Noir,
}

impl ColorPreset {
    /// Linear colour transform, columns are the images of R, G and B.
    pub fn matrix(self) -> Mat3 {
        match self {
            Self::Warm => Mat3::from_cols(
                Vec3::new(1.10, 0.05, 0.0),
                Vec3::new(0.05, 1.00, 0.0),
                Vec3::new(0.0, 0.0, 0.85),
            ),
            Self::Cool => Mat3::from_cols(
                Vec3::new(0.90, 0.0, 0.05),
                Vec3::new(0.0, 1.0, 0.08),
                Vec3::new(0.0, 0.05, 1.15),
            ),
            Self::Noir => {
                let luma = Vec3::new(0.299, 0.587, 0.114);
                Mat3::from_cols(Vec3::splat(luma.x), Vec3::splat(luma.y), Vec3::splat(luma.z))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorCorrectionSettings {
    pub enabled: bool,
    pub preset: ColorPreset,
    pub strength: f32,
}

impl Default for ColorCorrectionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            preset: ColorPreset::Warm,
            strength: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub enabled: bool,
    pub strength: f32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            strength: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineSettings {
    pub enabled: bool,
    pub color: Vec4,
    pub threshold: f32,
    pub strength: f32,
}

impl Default for OutlineSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            threshold: 0.4,
            strength: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilmGrainSettings {
    pub enabled: bool,
    pub strength: f32,
}

impl Default for FilmGrainSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            strength: 0.08,
        }
    }
}

/// Settings of every effect, as stored in the post-processing layer's
/// section of `app-settings.json`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessingConfig {
    pub color_correction: ColorCorrectionSettings,
    pub box_filter_3x3: FilterSettings,
    pub box_filter_5x5: FilterSettings,
    pub outline: OutlineSettings,
    pub film_grain: FilmGrainSettings,
}

impl PostProcessingConfig {
    /// Uniforms of the enabled effects, in execution order.
    pub fn chain(&self, size: (u32, u32), time: f32) -> Vec<(EffectKind, EffectParams)> {
        let base = EffectParams::base(size);
        EffectKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let params = match kind {
                    EffectKind::ColorCorrection if self.color_correction.enabled => {
                        let tint = self.color_correction.preset.matrix();
                        EffectParams {
                            strength: self.color_correction.strength.clamp(0.0, 1.0),
                            tint0: tint.x_axis.extend(0.0).to_array(),
                            tint1: tint.y_axis.extend(0.0).to_array(),
                            tint2: tint.z_axis.extend(0.0).to_array(),
                            ..base
                        }
                    }
                    EffectKind::BoxFilter3x3 if self.box_filter_3x3.enabled => EffectParams {
                        strength: self.box_filter_3x3.strength.clamp(0.0, 1.0),
                        ..base
                    },
                    EffectKind::BoxFilter5x5 if self.box_filter_5x5.enabled => EffectParams {
                        strength: self.box_filter_5x5.strength.clamp(0.0, 1.0),
                        ..base
                    },
                    EffectKind::Outline if self.outline.enabled => EffectParams {
                        strength: self.outline.strength.clamp(0.0, 1.0),
                        param: self.outline.threshold,
                        color: self.outline.color.to_array(),
                        ..base
                    },
                    EffectKind::FilmGrain if self.film_grain.enabled => EffectParams {
                        strength: self.film_grain.strength,
                        param: time,
                        ..base
                    },
                    _ => return None,
                };
                Some((kind, params))
            })
            .collect()
    }
}

/// Uniform block shared by all fullscreen passes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EffectParams {
    pub texel_size: [f32; 2],
    pub strength: f32,
    pub param: f32,
    pub tint0: [f32; 4],
    pub tint1: [f32; 4],
    pub tint2: [f32; 4],
    pub color: [f32; 4],
}

impl EffectParams {
    fn base((width, height): (u32, u32)) -> Self {
        Self {
            texel_size: [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32],
            strength: 0.0,
            param: 0.0,
            tint0: [1.0, 0.0, 0.0, 0.0],
            tint1: [0.0, 1.0, 0.0, 0.0],
            tint2: [0.0, 0.0, 1.0, 0.0],
            color: [0.0; 4],
        }
    }
}

struct EffectPass {
    pipeline: wgpu::RenderPipeline,
    params: wgpu::Buffer,
}

/// GPU side of the effect chain.
pub struct PostProcessor {
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    effects: Vec<(EffectKind, EffectPass)>,
    blit: EffectPass,
    ping_pong: [ColorTarget; 2],
    size: (u32, u32),
}

impl PostProcessor {
    pub fn new(gpu: &Gpu, size: (u32, u32)) -> Self {
        let device = &gpu.device;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("post-shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::POST.into()),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("post-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("post-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("post-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let make_pass = |kind: Option<EffectKind>, format: wgpu::TextureFormat| {
            let entry_point = kind.map(EffectKind::entry_point).unwrap_or("fs_blit");
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_fullscreen"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            });
            let params = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("post-params"),
                size: std::mem::size_of::<EffectParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            (pipeline, params)
        };

        let effects = EffectKind::ALL
            .into_iter()
            .map(|kind| {
                let (pipeline, params) = make_pass(Some(kind), SceneTargets::COLOR_FORMAT);
                (kind, EffectPass { pipeline, params })
            })
            .collect();
        let (pipeline, params) = make_pass(None, gpu.surface_format);
        gpu.queue
            .write_buffer(&params, 0, bytes_of(&EffectParams::base(size)));
        let blit = EffectPass { pipeline, params };

        Self {
            layout,
            sampler,
            effects,
            blit,
            ping_pong: Self::create_targets(device, size),
            size,
        }
    }

    fn create_targets(device: &wgpu::Device, size: (u32, u32)) -> [ColorTarget; 2] {
        [0, 1].map(|ix| ColorTarget::new(device, size, &format!("post-target-{ix}")))
    }

    pub fn resize(&mut self, gpu: &Gpu, size: (u32, u32)) {
        self.size = size;
        self.ping_pong = Self::create_targets(&gpu.device, size);
    }

    /// Runs the enabled effects over the scene colour and writes the result to
    /// `output`.
    pub fn apply(
        &self,
        gpu: &Gpu,
        encoder: &mut wgpu::CommandEncoder,
        scene: &SceneTargets,
        output: &wgpu::TextureView,
        config: &PostProcessingConfig,
        time: f32,
    ) {
        let mut current = scene.color_view();
        for (index, (kind, params)) in config.chain(self.size, time).into_iter().enumerate() {
            let Some((_, effect)) = self.effects.iter().find(|(k, _)| *k == kind) else {
                continue;
            };
            gpu.queue.write_buffer(&effect.params, 0, bytes_of(&params));
            let target = &self.ping_pong[index % 2].view;
            self.draw(gpu, encoder, effect, current, target);
            current = target;
        }
        self.draw(gpu, encoder, &self.blit, current, output);
    }

    fn draw(
        &self,
        gpu: &Gpu,
        encoder: &mut wgpu::CommandEncoder,
        effect: &EffectPass,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
    ) {
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("post-bind-group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: effect.params.as_entire_binding(),
                },
            ],
        });
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("post-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&effect.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chain_only_grades_colour() {
        let config = PostProcessingConfig::default();
        let chain = config.chain((1280, 720), 0.0);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].0, EffectKind::ColorCorrection);
        assert_eq!(chain[0].1.strength, 0.4);
        assert_eq!(chain[0].1.texel_size, [1.0 / 1280.0, 1.0 / 720.0]);
    }

    #[test]
    fn chain_keeps_fixed_order() {
        let config: PostProcessingConfig = serde_json::from_value(serde_json::json!({
            "film_grain": { "enabled": true },
            "outline": { "enabled": true, "threshold": 0.2 },
            "color_correction": { "enabled": false },
            "box_filter_3x3": { "enabled": true, "strength": 3.0 }
        }))
        .unwrap();
        let kinds: Vec<_> = config.chain((64, 64), 2.0).iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![EffectKind::BoxFilter3x3, EffectKind::Outline, EffectKind::FilmGrain]
        );
        let chain = config.chain((64, 64), 2.0);
        assert_eq!(chain[0].1.strength, 1.0);
        assert_eq!(chain[1].1.param, 0.2);
        assert_eq!(chain[2].1.param, 2.0);
    }

    #[test]
    fn noir_is_greyscale() {
        let grey = ColorPreset::Noir.matrix() * Vec3::new(1.0, 0.0, 0.0);
        assert!((grey.x - grey.y).abs() < 1e-6 && (grey.y - grey.z).abs() < 1e-6);
        assert_eq!(std::mem::size_of::<EffectParams>(), 80);
    }
}
