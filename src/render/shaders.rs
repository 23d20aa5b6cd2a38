pub(crate) const MESH: &str = r#"
const MAX_LIGHTS: u32 = 32u;

struct Light {
    // xyz position, w radius
    position_radius: vec4<f32>,
    // rgb colour, w intensity
    color_intensity: vec4<f32>,
}

struct FrameUniform {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    // rgb ambient, w light count
    ambient_count: vec4<f32>,
    lights: array<Light, MAX_LIGHTS>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> frame: FrameUniform;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = frame.view_proj * world_position;
    out.world_pos = world_position.xyz;

    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;
    out.normal = normalize(world_normal);
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let normal = normalize(input.normal);
    let count = min(u32(frame.ambient_count.w), MAX_LIGHTS);
    var light = frame.ambient_count.rgb;
    for (var i = 0u; i < count; i = i + 1u) {
        let source = frame.lights[i];
        let to_light = source.position_radius.xyz - input.world_pos;
        let distance_sq = dot(to_light, to_light);
        let radius = max(source.position_radius.w, 0.0001);
        let attenuation = source.color_intensity.w * radius / (radius + distance_sq);
        let diffuse = max(dot(normal, normalize(to_light)), 0.0);
        light = light + source.color_intensity.rgb * diffuse * attenuation;
    }
    let lit = object.color.rgb * light;
    // Reinhard tone mapping
    return vec4<f32>(lit / (lit + vec3<f32>(1.0)), object.color.a);
}
"#;

pub(crate) const POST: &str = r#"
struct EffectParams {
    texel_size: vec2<f32>,
    strength: f32,
    param: f32,
    tint0: vec4<f32>,
    tint1: vec4<f32>,
    tint2: vec4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;
@group(0) @binding(2) var<uniform> params: EffectParams;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

// One triangle covering the screen.
@vertex
fn vs_fullscreen(@builtin(vertex_index) index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * vec2<f32>(2.0, -2.0) + vec2<f32>(-1.0, 1.0), 0.0, 1.0);
    out.uv = uv;
    return out;
}

fn fetch(uv: vec2<f32>, dx: f32, dy: f32) -> vec3<f32> {
    return textureSampleLevel(source, source_sampler, uv + vec2<f32>(dx, dy) * params.texel_size, 0.0).rgb;
}

fn luminance(color: vec3<f32>) -> f32 {
    return dot(color, vec3<f32>(0.299, 0.587, 0.114));
}

@fragment
fn fs_blit(input: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(fetch(input.uv, 0.0, 0.0), 1.0);
}

@fragment
fn fs_color_correction(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = fetch(input.uv, 0.0, 0.0);
    let tint = mat3x3<f32>(params.tint0.xyz, params.tint1.xyz, params.tint2.xyz);
    let graded = clamp(tint * color, vec3<f32>(0.0), vec3<f32>(1.0));
    return vec4<f32>(mix(color, graded, params.strength), 1.0);
}

@fragment
fn fs_box_filter_3x3(input: VertexOutput) -> @location(0) vec4<f32> {
    var sum = vec3<f32>(0.0);
    for (var y = -1; y <= 1; y = y + 1) {
        for (var x = -1; x <= 1; x = x + 1) {
            sum = sum + fetch(input.uv, f32(x), f32(y));
        }
    }
    let color = fetch(input.uv, 0.0, 0.0);
    return vec4<f32>(mix(color, sum / 9.0, params.strength), 1.0);
}

@fragment
fn fs_box_filter_5x5(input: VertexOutput) -> @location(0) vec4<f32> {
    var sum = vec3<f32>(0.0);
    for (var y = -2; y <= 2; y = y + 1) {
        for (var x = -2; x <= 2; x = x + 1) {
            sum = sum + fetch(input.uv, f32(x), f32(y));
        }
    }
    let color = fetch(input.uv, 0.0, 0.0);
    return vec4<f32>(mix(color, sum / 25.0, params.strength), 1.0);
}

@fragment
fn fs_outline(input: VertexOutput) -> @location(0) vec4<f32> {
    let tl = luminance(fetch(input.uv, -1.0, -1.0));
    let t = luminance(fetch(input.uv, 0.0, -1.0));
    let tr = luminance(fetch(input.uv, 1.0, -1.0));
    let l = luminance(fetch(input.uv, -1.0, 0.0));
    let r = luminance(fetch(input.uv, 1.0, 0.0));
    let bl = luminance(fetch(input.uv, -1.0, 1.0));
    let b = luminance(fetch(input.uv, 0.0, 1.0));
    let br = luminance(fetch(input.uv, 1.0, 1.0));
    let gx = -tl - 2.0 * l - bl + tr + 2.0 * r + br;
    let gy = -tl - 2.0 * t - tr + bl + 2.0 * b + br;
    let edge = step(params.param, sqrt(gx * gx + gy * gy));
    let color = fetch(input.uv, 0.0, 0.0);
    return vec4<f32>(mix(color, params.color.rgb, edge * params.strength * params.color.a), 1.0);
}

fn grain_hash(p: vec2<f32>) -> f32 {
    return fract(sin(dot(p, vec2<f32>(12.9898, 78.233))) * 43758.5453);
}

@fragment
fn fs_film_grain(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = fetch(input.uv, 0.0, 0.0);
    let noise = grain_hash(input.position.xy + vec2<f32>(params.param * 61.0, params.param * 17.0)) - 0.5;
    return vec4<f32>(color + vec3<f32>(noise * params.strength), 1.0);
}
"#;
