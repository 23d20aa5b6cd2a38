pub(crate) const SIMULATE: &str = r#"
struct Particle {
    position: vec3<f32>,
    kind: u32,
    velocity: vec3<f32>,
    lifetime: f32,
    color: vec4<f32>,
    metadata: vec4<f32>,
}

struct SimParams {
    model: mat4x4<f32>,
    // xyz gravity, w delta time
    gravity_dt: vec4<f32>,
    // x emitters, y capacity, z seed
    counts: vec4<u32>,
}

struct SourceArgs {
    vertex_count: u32,
    instance_count: u32,
    first_vertex: u32,
    first_instance: u32,
}

struct TargetArgs {
    vertex_count: u32,
    instance_count: atomic<u32>,
    first_vertex: u32,
    first_instance: u32,
}

@group(0) @binding(0) var<uniform> params: SimParams;
@group(0) @binding(1) var<storage, read> src: array<Particle>;
@group(0) @binding(2) var<storage, read> src_args: SourceArgs;
@group(0) @binding(3) var<storage, read_write> dst: array<Particle>;
@group(0) @binding(4) var<storage, read_write> dst_args: TargetArgs;

const MAX_SPAWNS: u32 = 16u;
const TAU: f32 = 6.283185307;

fn pcg_hash(input: u32) -> u32 {
    let state = input * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

fn random_unit(seed: u32, index: u32, n: u32) -> f32 {
    return f32(pcg_hash(seed ^ pcg_hash(index * 64u + n))) / 4294967295.0;
}

fn append(particle: Particle) {
    let slot = atomicAdd(&dst_args.instance_count, 1u);
    if (slot < params.counts.y) {
        dst[slot] = particle;
    } else {
        atomicSub(&dst_args.instance_count, 1u);
    }
}

fn deviate(velocity: vec3<f32>, theta: f32, phi: f32) -> vec3<f32> {
    let speed = length(velocity);
    if (speed <= 1.1920929e-7) {
        return vec3<f32>(0.0);
    }
    let forward = velocity / speed;
    var helper = vec3<f32>(0.0, 0.0, 1.0);
    if (abs(forward.z) >= 0.999) {
        helper = vec3<f32>(1.0, 0.0, 0.0);
    }
    let tangent = normalize(cross(helper, forward));
    let bitangent = cross(forward, tangent);
    let offset = tangent * cos(phi) + bitangent * sin(phi);
    return (forward * cos(theta) + offset * sin(theta)) * speed;
}

fn spawn(emitter: Particle, index: u32, n: u32) -> Particle {
    let seed = params.counts.z;
    let theta = random_unit(seed, index, n * 3u) * emitter.metadata.y;
    let phi = random_unit(seed, index, n * 3u + 1u) * TAU;
    let lifetime = mix(emitter.metadata.z, emitter.metadata.w, random_unit(seed, index, n * 3u + 2u));
    let velocity = deviate(emitter.velocity, theta, phi);

    var particle: Particle;
    particle.position = (params.model * vec4<f32>(emitter.position, 1.0)).xyz;
    particle.kind = 1u;
    particle.velocity = (params.model * vec4<f32>(velocity, 0.0)).xyz;
    particle.lifetime = lifetime;
    particle.color = emitter.color;
    particle.metadata = vec4<f32>(lifetime, 0.0, 0.0, 0.0);
    return particle;
}

@compute @workgroup_size(64)
fn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {
    let index = id.x;
    let count = min(src_args.instance_count, params.counts.y);
    if (index >= count) {
        return;
    }

    let dt = params.gravity_dt.w;
    let element = src[index];

    if (index < params.counts.x) {
        var next = element;
        let interval = element.metadata.x;
        next.lifetime = next.lifetime - dt;
        var spawned = 0u;
        while (next.lifetime <= 0.0 && spawned < MAX_SPAWNS && interval > 0.0) {
            append(spawn(element, index, spawned));
            next.lifetime = next.lifetime + interval;
            spawned = spawned + 1u;
        }
        if (next.lifetime <= 0.0) {
            next.lifetime = interval;
        }
        dst[index] = next;
        return;
    }

    var particle = element;
    particle.velocity = element.velocity + params.gravity_dt.xyz * dt;
    particle.position = element.position + particle.velocity * dt;
    particle.lifetime = element.lifetime - dt;
    if (particle.lifetime > 0.0) {
        append(particle);
    }
}
"#;

pub(crate) const RENDER: &str = r#"
struct RenderParams {
    view_proj: mat4x4<f32>,
    // xyz camera right, w particle size
    camera_right: vec4<f32>,
    camera_up: vec4<f32>,
}

@group(0) @binding(0) var<uniform> frame: RenderParams;

struct Instance {
    @location(0) position: vec3<f32>,
    @location(1) kind: u32,
    @location(2) lifetime: f32,
    @location(3) color: vec4<f32>,
    @location(4) metadata: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) corner: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32, instance: Instance) -> VertexOutput {
    var out: VertexOutput;
    if (instance.kind == 0u) {
        // Emitters share the buffer but are never drawn.
        out.clip = vec4<f32>(0.0, 0.0, 2.0, 1.0);
        out.color = vec4<f32>(0.0);
        out.corner = vec2<f32>(0.0);
        return out;
    }

    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let corner = corners[vertex_index % 6u];
    let size = frame.camera_right.w;
    let offset = frame.camera_right.xyz * corner.x + frame.camera_up.xyz * corner.y;
    let world = instance.position + offset * size;

    let remaining = clamp(instance.lifetime / max(instance.metadata.x, 0.0001), 0.0, 1.0);
    out.clip = frame.view_proj * vec4<f32>(world, 1.0);
    out.color = vec4<f32>(instance.color.rgb, instance.color.a * remaining);
    out.corner = corner;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let radius = length(input.corner);
    if (radius > 1.0) {
        discard;
    }
    return vec4<f32>(input.color.rgb, input.color.a * (1.0 - radius * radius));
}
"#;
