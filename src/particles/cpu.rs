use std::f32::consts::TAU;

use glam::{Mat4, Vec3};

use super::buffers::{initial_contents, live_count, PingPong};
use super::{
    pcg_hash, random_unit, ParticleData, ParticleKind, ParticleSystem, MAX_SPAWNS_PER_STEP,
};

/// CPU implementation of the particle kernel, used when no GPU is available.
///
/// Mirrors the GPU path step for step: two buffers, a written count per
/// buffer, emitters pinned to the first slots and appends past capacity
/// dropped.
#[derive(Debug, Clone)]
pub struct CpuParticleSimulator {
    buffers: [Vec<ParticleData>; 2],
    written: [u32; 2],
    ping_pong: PingPong,
    emitter_count: u32,
    capacity: u32,
    frame: u32,
}

impl CpuParticleSimulator {
    pub fn new(system: &ParticleSystem) -> Self {
        let emitters = system.emitter_particles();
        let contents = initial_contents(&emitters, system.max_particles());
        let emitter_count = emitters.len() as u32;
        Self {
            buffers: [contents.clone(), contents],
            written: [emitter_count; 2],
            ping_pong: PingPong::default(),
            emitter_count,
            capacity: system.capacity(),
            frame: 0,
        }
    }

    pub fn update(&mut self, dt: f32, model: Mat4, gravity: Vec3) {
        let src_index = self.ping_pong.current_vertex();
        let dst_index = self.ping_pong.current_feedback();
        let seed = pcg_hash(self.frame);
        self.frame = self.frame.wrapping_add(1);

        let [first, second] = &mut self.buffers;
        let (src, dst) = if src_index == 0 {
            (&*first, second)
        } else {
            (&*second, first)
        };
        let mut writer = Appender {
            dst,
            written: self.emitter_count,
            capacity: self.capacity,
        };

        let count = self.written[src_index].min(self.capacity) as usize;
        for (index, element) in src[..count].iter().enumerate() {
            if (index as u32) < self.emitter_count {
                let emitter = step_emitter(element, index as u32, dt, model, seed, &mut writer);
                writer.dst[index] = emitter;
            } else if let Some(particle) = step_particle(element, dt, gravity) {
                writer.push(particle);
            }
        }

        self.written[dst_index] = writer.written;
        self.ping_pong.swap();
    }

    /// Live particles after the last step (emitters excluded).
    pub fn live_count(&self) -> u32 {
        live_count(self.written[self.ping_pong.current_vertex()], self.emitter_count)
    }

    /// Elements of the current buffer, emitters first.
    pub fn current(&self) -> &[ParticleData] {
        let index = self.ping_pong.current_vertex();
        &self.buffers[index][..self.written[index] as usize]
    }
}

struct Appender<'a> {
    dst: &'a mut Vec<ParticleData>,
    written: u32,
    capacity: u32,
}

impl Appender<'_> {
    fn push(&mut self, particle: ParticleData) {
        if self.written < self.capacity {
            self.dst[self.written as usize] = particle;
            self.written += 1;
        }
    }
}

fn step_emitter(
    emitter: &ParticleData,
    index: u32,
    dt: f32,
    model: Mat4,
    seed: u32,
    writer: &mut Appender<'_>,
) -> ParticleData {
    let mut next = *emitter;
    let interval = emitter.metadata[0];
    next.lifetime -= dt;

    let mut spawned = 0;
    while next.lifetime <= 0.0 && spawned < MAX_SPAWNS_PER_STEP && interval > 0.0 {
        writer.push(spawn(emitter, index, spawned, model, seed));
        next.lifetime += interval;
        spawned += 1;
    }
    if next.lifetime <= 0.0 {
        next.lifetime = interval;
    }
    next
}

fn spawn(emitter: &ParticleData, index: u32, n: u32, model: Mat4, seed: u32) -> ParticleData {
    let [_, cone_angle, min_life, max_life] = emitter.metadata;
    let theta = random_unit(seed, index, n * 3) * cone_angle;
    let phi = random_unit(seed, index, n * 3 + 1) * TAU;
    let lifetime = min_life + (max_life - min_life) * random_unit(seed, index, n * 3 + 2);

    let velocity = deviate(emitter.velocity(), theta, phi);
    ParticleData {
        position: model.transform_point3(emitter.position()).to_array(),
        kind: ParticleKind::Particle as u32,
        velocity: model.transform_vector3(velocity).to_array(),
        lifetime,
        color: emitter.color,
        metadata: [lifetime, 0.0, 0.0, 0.0],
    }
}

/// Rotates `velocity` by `theta` away from itself, around it by `phi`.
pub(crate) fn deviate(velocity: Vec3, theta: f32, phi: f32) -> Vec3 {
    let speed = velocity.length();
    if speed <= f32::EPSILON {
        return Vec3::ZERO;
    }
    let forward = velocity / speed;
    let helper = if forward.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = helper.cross(forward).normalize();
    let bitangent = forward.cross(tangent);
    let offset = tangent * phi.cos() + bitangent * phi.sin();
    (forward * theta.cos() + offset * theta.sin()) * speed
}

fn step_particle(particle: &ParticleData, dt: f32, gravity: Vec3) -> Option<ParticleData> {
    let mut next = *particle;
    let velocity = particle.velocity() + gravity * dt;
    next.velocity = velocity.to_array();
    next.position = (particle.position() + velocity * dt).to_array();
    next.lifetime -= dt;
    (next.lifetime > 0.0).then_some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    const DT: f32 = 1.0 / 60.0;

    fn system(rate: f32, max_particles: u32) -> ParticleSystem {
        let mut system = ParticleSystem::with_max_particles(max_particles).unwrap();
        system
            .add_emitter(Vec3::ZERO, Vec3::new(0.0, -1.0, 10.0), rate, Vec4::ONE, 0.3)
            .unwrap();
        system
    }

    #[test]
    fn first_step_reads_only_emitters() {
        let sim = CpuParticleSimulator::new(&system(10.0, 100));
        assert_eq!(sim.current().len(), 1);
        assert_eq!(sim.live_count(), 0);
    }

    #[test]
    fn spawns_at_the_configured_rate() {
        let mut sim = CpuParticleSimulator::new(&system(10.0, 100));
        for _ in 0..60 {
            sim.update(DT, Mat4::IDENTITY, Vec3::new(0.0, 0.0, -9.81));
        }
        // One second at 10/s with lifetimes of at least two seconds.
        assert!((9..=11).contains(&sim.live_count()), "{}", sim.live_count());
        assert!(sim.current()[0].is_emitter());
        assert!(sim.current()[1..].iter().all(|p| !p.is_emitter()));
    }

    #[test]
    fn spawns_are_capped_per_step() {
        let mut sim = CpuParticleSimulator::new(&system(10_000.0, 1000));
        sim.update(1.0, Mat4::IDENTITY, Vec3::ZERO);
        assert_eq!(sim.live_count(), MAX_SPAWNS_PER_STEP);
    }

    #[test]
    fn written_count_never_exceeds_capacity() {
        let mut sim = CpuParticleSimulator::new(&system(1000.0, 5));
        for _ in 0..10 {
            sim.update(DT, Mat4::IDENTITY, Vec3::ZERO);
        }
        assert_eq!(sim.current().len(), 6);
        assert_eq!(sim.live_count(), 5);
    }

    #[test]
    fn particles_integrate_and_expire() {
        let particle = ParticleData {
            kind: ParticleKind::Particle as u32,
            velocity: [1.0, 0.0, 0.0],
            lifetime: 0.15,
            ..ParticleData::default()
        };
        let gravity = Vec3::new(0.0, 0.0, -10.0);
        let next = step_particle(&particle, 0.1, gravity).unwrap();
        assert_eq!(next.velocity(), Vec3::new(1.0, 0.0, -1.0));
        assert!((next.position() - Vec3::new(0.1, 0.0, -0.1)).length() < 1e-6);
        assert!(step_particle(&next, 0.1, gravity).is_none());
    }

    #[test]
    fn spawn_uses_model_transform() {
        let model = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        let mut sim = CpuParticleSimulator::new(&system(10.0, 10));
        sim.update(0.1, model, Vec3::ZERO);
        let particle = sim.current()[1];
        // Spawned at the emitter, then integrated in the next step only.
        assert_eq!(particle.position(), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(sim.current()[0].position(), Vec3::ZERO);
    }

    #[test]
    fn deviation_stays_inside_cone() {
        let velocity = Vec3::new(0.0, -1.0, 10.0);
        for step in 0..16 {
            let deviated = deviate(velocity, 0.3, step as f32 * 0.4);
            assert!((deviated.length() - velocity.length()).abs() < 1e-3);
            let angle = deviated.angle_between(velocity);
            assert!((angle - 0.3).abs() < 1e-3);
        }
        assert_eq!(deviate(Vec3::ZERO, 0.3, 1.0), Vec3::ZERO);
    }
}
