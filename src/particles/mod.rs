//! GPU-resident particle simulation.
//!
//! Every particle system keeps its state in two buffers that are swapped each
//! step: the current buffer is read, the other one written. Emitters live in
//! the first slots of the buffer and spawn particles from inside the kernel, so
//! after initialisation the CPU never holds particle data. [`cpu`] runs the
//! same kernel on the CPU for headless use and tests.

pub mod buffers;
pub mod cpu;
pub mod gpu;
mod shaders;

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use buffers::{live_count, DrawArgs, PingPong};
pub use cpu::CpuParticleSimulator;
pub use gpu::{max_gpu_capacity, GpuParticleSystem, ParticlePipelines};

/// Upper bound on particles one emitter may spawn in a single step.
pub const MAX_SPAWNS_PER_STEP: u32 = 16;

/// Largest buffer, in elements, a system simulated on the CPU may ask for.
pub const MAX_CPU_CAPACITY: u32 = 1 << 20;

#[derive(Debug, Error, PartialEq)]
pub enum ParticleError {
    #[error("emitters cannot be changed after the particle system has been initialized")]
    AlreadyInitialized,
    #[error("spawn rate must be positive, got {0}")]
    InvalidSpawnRate(f32),
    #[error("particle system must hold at least one particle")]
    ZeroCapacity,
    #[error("no emitter at index {0}")]
    NoSuchEmitter(usize),
    #[error("particle system needs {requested} slots, the limit is {limit}")]
    CapacityTooLarge { requested: u64, limit: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ParticleKind {
    Emitter = 0,
    Particle = 1,
}

/// One element of the particle buffers, laid out for std430 storage and
/// instanced vertex fetch alike.
///
/// Emitters reuse the fields: `velocity` is the initial particle velocity,
/// `lifetime` the time until the next spawn and `metadata` holds
/// (spawn interval, cone angle, min lifetime, max lifetime). Particles keep
/// the lifetime they were born with in `metadata.x`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct ParticleData {
    pub position: [f32; 3],
    pub kind: u32,
    pub velocity: [f32; 3],
    pub lifetime: f32,
    pub color: [f32; 4],
    pub metadata: [f32; 4],
}

impl ParticleData {
    pub fn is_emitter(&self) -> bool {
        self.kind == ParticleKind::Emitter as u32
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn velocity(&self) -> Vec3 {
        Vec3::from_array(self.velocity)
    }
}

/// Serialised description of an emitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Emitter {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Particles per second.
    pub spawn_rate: f32,
    pub color: Vec4,
    /// Maximum deviation from `velocity`, in radians.
    pub cone_angle: f32,
    pub lifetime_range: Vec2,
}

impl Default for Emitter {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            spawn_rate: 1.0,
            color: Vec4::ONE,
            cone_angle: 0.0,
            lifetime_range: Vec2::new(2.0, 4.0),
        }
    }
}

impl Emitter {
    pub fn spawn_interval(&self) -> f32 {
        1.0 / self.spawn_rate
    }

    pub fn to_particle(&self) -> ParticleData {
        let interval = self.spawn_interval();
        ParticleData {
            position: self.position.to_array(),
            kind: ParticleKind::Emitter as u32,
            velocity: self.velocity.to_array(),
            lifetime: interval,
            color: self.color.to_array(),
            metadata: [
                interval,
                self.cone_angle,
                self.lifetime_range.x,
                self.lifetime_range.y,
            ],
        }
    }
}

/// Particle system component. Holds the configuration only; the simulation
/// state belongs to the particle layer and lives on the GPU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSystem {
    pub gravity: Vec3,
    max_particles: u32,
    pub particle_size: f32,
    emitters: Vec<Emitter>,
    #[serde(skip)]
    initialized: bool,
    #[serde(skip)]
    particle_count: u32,
}

impl Default for ParticleSystem {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, 0.0, -9.81),
            max_particles: 1000,
            particle_size: 0.1,
            emitters: Vec::new(),
            initialized: false,
            particle_count: 0,
        }
    }
}

impl ParticleSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_particles(max_particles: u32) -> Result<Self, ParticleError> {
        let mut system = Self::default();
        system.set_max_particles(max_particles)?;
        Ok(system)
    }

    pub fn max_particles(&self) -> u32 {
        self.max_particles
    }

    pub fn set_max_particles(&mut self, max_particles: u32) -> Result<(), ParticleError> {
        self.ensure_editable()?;
        if max_particles == 0 {
            return Err(ParticleError::ZeroCapacity);
        }
        self.max_particles = max_particles;
        Ok(())
    }

    /// Buffer length: every particle slot plus one slot per emitter.
    /// Saturates; [`validate_within`](Self::validate_within) rejects such systems.
    pub fn capacity(&self) -> u32 {
        u32::try_from(self.emitters.len())
            .ok()
            .and_then(|emitters| self.max_particles.checked_add(emitters))
            .unwrap_or(u32::MAX)
    }

    pub fn emitters(&self) -> &[Emitter] {
        &self.emitters
    }

    /// Adds an emitter at `position` shooting along `direction` (whose length
    /// is the initial particle speed).
    pub fn add_emitter(
        &mut self,
        position: Vec3,
        direction: Vec3,
        spawn_rate: f32,
        color: Vec4,
        cone_angle: f32,
    ) -> Result<(), ParticleError> {
        self.ensure_editable()?;
        check_spawn_rate(spawn_rate)?;
        self.emitters.push(Emitter {
            position,
            velocity: direction,
            spawn_rate,
            color,
            cone_angle,
            ..Emitter::default()
        });
        Ok(())
    }

    pub fn remove_emitter(&mut self, index: usize) -> Result<Emitter, ParticleError> {
        self.ensure_editable()?;
        if index >= self.emitters.len() {
            return Err(ParticleError::NoSuchEmitter(index));
        }
        Ok(self.emitters.remove(index))
    }

    pub fn emitter_mut(&mut self, index: usize) -> Result<&mut Emitter, ParticleError> {
        self.ensure_editable()?;
        self.emitters
            .get_mut(index)
            .ok_or(ParticleError::NoSuchEmitter(index))
    }

    /// Checks a configuration (possibly loaded from disk) for the CPU simulator.
    pub fn validate(&self) -> Result<(), ParticleError> {
        self.validate_within(MAX_CPU_CAPACITY)
    }

    /// Checks a configuration against a buffer of at most `limit` elements.
    pub fn validate_within(&self, limit: u32) -> Result<(), ParticleError> {
        if self.max_particles == 0 {
            return Err(ParticleError::ZeroCapacity);
        }
        let requested = u64::from(self.max_particles) + self.emitters.len() as u64;
        if requested > u64::from(limit) {
            return Err(ParticleError::CapacityTooLarge { requested, limit });
        }
        for emitter in &self.emitters {
            check_spawn_rate(emitter.spawn_rate)?;
        }
        Ok(())
    }

    /// Emitters in their buffer representation, in slot order.
    pub fn emitter_particles(&self) -> Vec<ParticleData> {
        self.emitters.iter().map(Emitter::to_particle).collect()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    /// Live particles as last reported by the simulation (emitters excluded).
    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    pub fn set_particle_count(&mut self, count: u32) {
        self.particle_count = count;
    }

    fn ensure_editable(&self) -> Result<(), ParticleError> {
        if self.initialized {
            Err(ParticleError::AlreadyInitialized)
        } else {
            Ok(())
        }
    }
}

fn check_spawn_rate(rate: f32) -> Result<(), ParticleError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(ParticleError::InvalidSpawnRate(rate))
    }
}

/// Integer hash shared by the compute kernel and the CPU simulator.
pub fn pcg_hash(input: u32) -> u32 {
    let state = input.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Uniform random number in `[0, 1]` for spawn `n` of slot `index`.
pub fn random_unit(seed: u32, index: u32, n: u32) -> f32 {
    let hashed = pcg_hash(seed ^ pcg_hash(index.wrapping_mul(64).wrapping_add(n)));
    hashed as f32 / u32::MAX as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particle_data_is_64_bytes() {
        assert_eq!(std::mem::size_of::<ParticleData>(), 64);
        assert_eq!(std::mem::offset_of!(ParticleData, kind), 12);
        assert_eq!(std::mem::offset_of!(ParticleData, lifetime), 28);
        assert_eq!(std::mem::offset_of!(ParticleData, color), 32);
        assert_eq!(std::mem::offset_of!(ParticleData, metadata), 48);
    }

    #[test]
    fn emitter_packs_interval_and_ranges() {
        let mut system = ParticleSystem::new();
        system
            .add_emitter(Vec3::Z, Vec3::new(0.0, -1.0, 10.0), 10.0, Vec4::ONE, 0.25)
            .unwrap();
        let packed = system.emitter_particles()[0];
        assert!(packed.is_emitter());
        assert!((packed.lifetime - 0.1).abs() < 1e-6);
        assert_eq!(packed.metadata[1], 0.25);
        assert_eq!(&packed.metadata[2..], &[2.0, 4.0]);
        assert_eq!(system.capacity(), 1001);
    }

    #[test]
    fn emitters_are_frozen_after_initialization() {
        let mut system = ParticleSystem::new();
        system
            .add_emitter(Vec3::ZERO, Vec3::Z, 5.0, Vec4::ONE, 0.0)
            .unwrap();
        system.mark_initialized();
        assert_eq!(
            system.add_emitter(Vec3::ZERO, Vec3::Z, 5.0, Vec4::ONE, 0.0),
            Err(ParticleError::AlreadyInitialized)
        );
        assert_eq!(
            system.remove_emitter(0).unwrap_err(),
            ParticleError::AlreadyInitialized
        );
        assert!(system.emitter_mut(0).is_err());
        assert_eq!(system.emitters().len(), 1);
    }

    #[test]
    fn rejects_non_positive_spawn_rates() {
        let mut system = ParticleSystem::new();
        assert_eq!(
            system.add_emitter(Vec3::ZERO, Vec3::Z, 0.0, Vec4::ONE, 0.0),
            Err(ParticleError::InvalidSpawnRate(0.0))
        );
        assert!(ParticleSystem::with_max_particles(0).is_err());
    }

    #[test]
    fn json_uses_particles_per_second() {
        let json = r#"{
            "gravity": [0.0, 0.0, -1.0],
            "max_particles": 50,
            "emitters": [{ "position": [1.0, 2.0, 3.0], "spawn_rate": 4.0 }]
        }"#;
        let system: ParticleSystem = serde_json::from_str(json).unwrap();
        assert_eq!(system.max_particles(), 50);
        assert_eq!(system.particle_size, 0.1);
        assert!(!system.is_initialized());
        let emitter = &system.emitters()[0];
        assert_eq!(emitter.spawn_interval(), 0.25);
        assert_eq!(emitter.lifetime_range, Vec2::new(2.0, 4.0));
        assert!(system.validate().is_ok());
    }

    #[test]
    fn oversized_systems_fail_validation() {
        let json = r#"{"max_particles": 4294967295, "emitters": [{"spawn_rate": 1.0}]}"#;
        let system: ParticleSystem = serde_json::from_str(json).unwrap();
        assert_eq!(system.capacity(), u32::MAX);
        assert_eq!(
            system.validate(),
            Err(ParticleError::CapacityTooLarge {
                requested: 4_294_967_296,
                limit: MAX_CPU_CAPACITY,
            })
        );

        let system = ParticleSystem::with_max_particles(100).unwrap();
        assert!(system.validate_within(100).is_ok());
        assert!(system.validate_within(99).is_err());
    }

    #[test]
    fn random_unit_stays_in_range() {
        for n in 0..100 {
            let value = random_unit(7, 3, n);
            assert!((0.0..=1.0).contains(&value));
        }
        assert_ne!(random_unit(1, 0, 0), random_unit(2, 0, 0));
    }
}
