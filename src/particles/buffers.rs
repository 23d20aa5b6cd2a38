use bytemuck::{Pod, Zeroable};

use super::ParticleData;

/// Vertices per particle quad (two triangles).
pub const QUAD_VERTICES: u32 = 6;

/// Which of the two particle buffers is read and which is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPong {
    current_vertex: usize,
    current_feedback: usize,
}

impl Default for PingPong {
    fn default() -> Self {
        Self {
            current_vertex: 0,
            current_feedback: 1,
        }
    }
}

impl PingPong {
    /// Buffer holding the latest state, read by the next step and the renderer.
    pub fn current_vertex(&self) -> usize {
        self.current_vertex
    }

    /// Buffer the next step writes into.
    pub fn current_feedback(&self) -> usize {
        self.current_feedback
    }

    pub fn swap(&mut self) {
        self.current_vertex = self.current_feedback;
        self.current_feedback = (self.current_feedback + 1) & 0x01;
    }
}

/// Indirect draw arguments. `instance_count` doubles as the append counter of
/// the simulation kernel, so after a step it holds the number of elements
/// written (emitters included).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

impl DrawArgs {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn with_written(written: u32) -> Self {
        Self {
            vertex_count: QUAD_VERTICES,
            instance_count: written,
            first_vertex: 0,
            first_instance: 0,
        }
    }

    pub fn written(&self) -> u32 {
        self.instance_count
    }

    /// Decodes arguments read back from the GPU.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..Self::SIZE as usize)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }
}

/// Live particles in a buffer that holds `written` elements, the first
/// `emitters` of which are emitters.
pub fn live_count(written: u32, emitters: u32) -> u32 {
    written.saturating_sub(emitters)
}

/// Contents both buffers start with: emitters first, the rest zeroed.
pub fn initial_contents(emitters: &[ParticleData], max_particles: u32) -> Vec<ParticleData> {
    let capacity = emitters.len() + max_particles as usize;
    let mut data = vec![ParticleData::zeroed(); capacity];
    data[..emitters.len()].copy_from_slice(emitters);
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::{Emitter, ParticleKind};

    #[test]
    fn swap_alternates_buffers() {
        let mut ping_pong = PingPong::default();
        assert_eq!((ping_pong.current_vertex(), ping_pong.current_feedback()), (0, 1));
        ping_pong.swap();
        assert_eq!((ping_pong.current_vertex(), ping_pong.current_feedback()), (1, 0));
        ping_pong.swap();
        assert_eq!((ping_pong.current_vertex(), ping_pong.current_feedback()), (0, 1));
    }

    #[test]
    fn initial_contents_places_emitters_first() {
        let emitters = vec![Emitter::default().to_particle(); 2];
        let data = initial_contents(&emitters, 3);
        assert_eq!(data.len(), 5);
        assert!(data[..2].iter().all(ParticleData::is_emitter));
        assert!(data[2..].iter().all(|p| *p == ParticleData::zeroed()));
        // Zeroed slots read as emitters by kind alone; only `written` makes them live.
        assert_eq!(data[4].kind, ParticleKind::Emitter as u32);
    }

    #[test]
    fn draw_args_decode_from_readback() {
        let args = DrawArgs::with_written(42);
        let bytes = bytemuck::bytes_of(&args).to_vec();
        assert_eq!(DrawArgs::from_bytes(&bytes), Some(args));
        assert_eq!(DrawArgs::from_bytes(&bytes[..8]), None);
        assert_eq!(args.vertex_count, QUAD_VERTICES);
    }

    #[test]
    fn live_count_excludes_emitters() {
        assert_eq!(live_count(10, 3), 7);
        assert_eq!(live_count(2, 3), 0);
    }
}
