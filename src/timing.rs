/// Per-frame timing values shared with every layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    delta_time: f32,
    unscaled_delta_time: f32,
    time_since_scene_load: f32,
    unscaled_time_since_scene_load: f32,
    time_since_app_load: f32,
    unscaled_time_since_app_load: f32,
    time_scale: f32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            delta_time: 0.0,
            unscaled_delta_time: 0.0,
            time_since_scene_load: 0.0,
            unscaled_time_since_scene_load: 0.0,
            time_since_app_load: 0.0,
            unscaled_time_since_app_load: 0.0,
            time_scale: 1.0,
        }
    }
}

impl Timing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances every clock by `dt` seconds of wall time.
    pub fn advance(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        let scaled = dt * self.time_scale;
        self.unscaled_delta_time = dt;
        self.delta_time = scaled;
        self.time_since_app_load += scaled;
        self.unscaled_time_since_app_load += dt;
        self.time_since_scene_load += scaled;
        self.unscaled_time_since_scene_load += dt;
    }

    pub fn reset_scene_clock(&mut self) {
        self.time_since_scene_load = 0.0;
        self.unscaled_time_since_scene_load = 0.0;
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    pub fn unscaled_delta_time(&self) -> f32 {
        self.unscaled_delta_time
    }

    pub fn time_since_scene_load(&self) -> f32 {
        self.time_since_scene_load
    }

    pub fn unscaled_time_since_scene_load(&self) -> f32 {
        self.unscaled_time_since_scene_load
    }

    pub fn time_since_app_load(&self) -> f32 {
        self.time_since_app_load
    }

    pub fn unscaled_time_since_app_load(&self) -> f32 {
        self.unscaled_time_since_app_load
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Negative scales clamp to zero (a frozen clock).
    pub fn set_time_scale(&mut self, value: f32) {
        self.time_scale = value.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_applies_time_scale() {
        let mut timing = Timing::new();
        timing.set_time_scale(0.5);
        timing.advance(0.2);
        assert!((timing.delta_time() - 0.1).abs() < 1e-6);
        assert!((timing.unscaled_delta_time() - 0.2).abs() < 1e-6);
        assert!((timing.time_since_app_load() - 0.1).abs() < 1e-6);
        assert!((timing.unscaled_time_since_app_load() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn negative_time_scale_freezes_clock() {
        let mut timing = Timing::new();
        timing.set_time_scale(-3.0);
        assert_eq!(timing.time_scale(), 0.0);
        timing.advance(1.0);
        assert_eq!(timing.delta_time(), 0.0);
        assert_eq!(timing.unscaled_delta_time(), 1.0);
    }

    #[test]
    fn scene_clock_resets_independently() {
        let mut timing = Timing::new();
        timing.advance(1.0);
        timing.reset_scene_clock();
        timing.advance(0.25);
        assert!((timing.time_since_scene_load() - 0.25).abs() < 1e-6);
        assert!((timing.time_since_app_load() - 1.25).abs() < 1e-6);
    }
}
