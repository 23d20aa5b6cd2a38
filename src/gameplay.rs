//! The scripted ladybug runner played on the default course.

use std::collections::HashSet;

use glam::Vec3;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::input::{InputState, KeyCode};
use crate::scene::{Light, ObjectId, Scene};

/// Gameplay runs at a fixed rate regardless of the frame rate.
pub const TICK_RATE: f32 = 60.0;
pub const TICK: f32 = 1.0 / TICK_RATE;

pub const PLAYER: &str = "ladybug";
pub const DEAD_PLAYER: &str = "deadbug";
pub const CAMERA: &str = "Main Camera";
pub const LIGHTS: &str = "Lights";
pub const PARTICLES: &str = "Particles";
pub const SHADOW_LIGHT: &str = "Shadow Light";

/// A mushroom on the course: hit unless the player is above `clearance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub x: f32,
    pub clearance: f32,
}

pub const OBSTACLES: [Obstacle; 8] = [
    Obstacle { x: -50.0, clearance: 1.56 },
    Obstacle { x: -100.0, clearance: 1.56 },
    Obstacle { x: -150.0, clearance: 3.5 },
    Obstacle { x: -200.0, clearance: 4.0 },
    Obstacle { x: -250.0, clearance: 1.56 },
    Obstacle { x: -280.0, clearance: 1.56 },
    Obstacle { x: -310.0, clearance: 1.56 },
    Obstacle { x: -350.0, clearance: 4.0 },
];

impl Obstacle {
    pub fn hits(&self, position: Vec3) -> bool {
        position.z < self.clearance && position.x > self.x - 0.41 && position.x < self.x + 0.34
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub jump_peak: f32,
    pub jump_base: f32,
    pub jump_speed: f32,
    pub jump_duration: f32,
    pub fly_ceiling: f32,
    pub fly_duration: f32,
    pub run_speed: f32,
    pub finish_x: f32,
    /// Camera y and z while following; x trails the player by `follow_lag`.
    pub follow_height: [f32; 2],
    pub follow_lag: f32,
    pub follow_rotation: Vec3,
    pub shadow_offset: Vec3,
    pub dead_offset: Vec3,
    pub follow_camera: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            jump_peak: 4.0,
            jump_base: 1.0,
            jump_speed: 8.0,
            jump_duration: 2.5,
            fly_ceiling: 10.1,
            fly_duration: 9.0,
            run_speed: 0.4,
            finish_x: -406.0,
            follow_height: [11.48, 6.29],
            follow_lag: 5.0,
            follow_rotation: Vec3::new(84.0, 0.0, -180.0),
            shadow_offset: Vec3::new(-15.0, 0.0, 15.0),
            dead_offset: Vec3::new(0.0, 2.0, 0.0),
            follow_camera: true,
        }
    }
}

/// Player intent for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
    pub jump: bool,
    pub fly: bool,
    pub slide: bool,
    pub lights_off: bool,
    pub toggle_pause: bool,
    pub toggle_follow: bool,
}

impl Controls {
    pub fn from_input(input: &InputState) -> Self {
        Self {
            jump: input.was_key_pressed(KeyCode::SPACE),
            fly: input.was_key_pressed(KeyCode::UP),
            slide: input.is_key_down(KeyCode::DOWN),
            lights_off: input.is_key_down(KeyCode::Digit(1)),
            toggle_pause: input.was_key_pressed(KeyCode::Character('P')),
            toggle_follow: input.was_key_pressed(KeyCode::Character('Y')),
        }
    }

    /// Same controls with the press edges consumed.
    pub fn held(self) -> Self {
        Self {
            jump: false,
            fly: false,
            toggle_pause: false,
            toggle_follow: false,
            ..self
        }
    }
}

#[derive(Debug, Clone)]
pub struct Runner {
    config: RunnerConfig,
    clock: f32,
    jump_started: Option<f32>,
    fly_started: Option<f32>,
    fly_time: f32,
    paused: bool,
    follow: bool,
    collision: bool,
    warned: HashSet<&'static str>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        let follow = config.follow_camera;
        Self {
            config,
            clock: 0.0,
            jump_started: None,
            fly_started: None,
            fly_time: 0.0,
            paused: false,
            follow,
            collision: false,
            warned: HashSet::new(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_following(&self) -> bool {
        self.follow
    }

    pub fn is_jumping(&self) -> bool {
        self.jump_started.is_some()
    }

    pub fn is_flying(&self) -> bool {
        self.fly_started.is_some()
    }

    /// Height of the jump arc `t` seconds after take-off.
    pub fn jump_height(&self, t: f32) -> f32 {
        let c = &self.config;
        let x = c.jump_speed * t / c.jump_duration;
        -c.jump_peak * (x - 1.0).powi(2) + c.jump_peak + c.jump_base
    }

    /// Advances the game by one fixed tick.
    pub fn tick(&mut self, scene: &mut Scene, controls: Controls) {
        self.clock += TICK;
        let Some(player) = self.find(scene, PLAYER) else {
            return;
        };

        self.jump(scene, player, controls);
        self.fly(scene, player, controls);

        let scale = if controls.slide {
            Vec3::new(0.5, 0.15, 0.5)
        } else {
            Vec3::splat(0.3)
        };
        if let Some(object) = scene.get_mut(player) {
            object.set_scale(scale);
        }

        self.update_lights(scene, controls.lights_off);

        if controls.toggle_pause {
            self.paused = !self.paused;
            info!("Game {}", if self.paused { "paused" } else { "resumed" });
        }
        if !self.paused {
            move_by(scene, player, Vec3::new(-self.config.run_speed, 0.0, 0.0));
        }

        if controls.toggle_follow {
            self.follow = !self.follow;
        }
        if self.follow {
            self.follow_player(scene, player);
        }

        if position(scene, player).x < self.config.finish_x {
            info!("Reached the exit");
            self.paused = true;
            set_position(scene, player, Vec3::ZERO);
        }

        if self.collision {
            self.collision = false;
            self.paused = true;
            let at = position(scene, player);
            if let Some(dead) = self.find(scene, DEAD_PLAYER) {
                set_position(scene, dead, at + self.config.dead_offset);
            }
            set_position(scene, player, Vec3::ZERO);
        }

        if let (Some(particles), Some(dead)) =
            (self.find(scene, PARTICLES), self.find(scene, DEAD_PLAYER))
        {
            let at = position(scene, dead);
            set_position(scene, particles, at);
        }
        if let (Some(shadow), Some(camera)) =
            (self.find(scene, SHADOW_LIGHT), self.find(scene, CAMERA))
        {
            let at = position(scene, camera) + self.config.shadow_offset;
            set_position(scene, shadow, at);
        }

        let at = position(scene, player);
        if let Some(obstacle) = OBSTACLES.iter().find(|o| o.hits(at)) {
            info!("Hit the mushroom at x = {}", obstacle.x);
            self.collision = true;
        }
    }

    fn jump(&mut self, scene: &mut Scene, player: ObjectId, controls: Controls) {
        if controls.jump && self.jump_started.is_none() {
            self.jump_started = Some(self.clock);
        }
        let Some(started) = self.jump_started else {
            return;
        };
        let height = self.jump_height(self.clock - started);
        let z = if height < 0.0 {
            self.jump_started = None;
            0.0
        } else {
            height
        };
        if let Some(object) = scene.get_mut(player) {
            object.position.z = z;
        }
    }

    fn fly(&mut self, scene: &mut Scene, player: ObjectId, controls: Controls) {
        if controls.fly {
            self.jump_started = None;
            if self.fly_started.is_none() {
                self.fly_started = Some(self.clock);
                self.fly_time = 0.0;
            }
        }
        if let Some(started) = self.fly_started {
            self.fly_time = (self.clock - started) / self.config.jump_duration * self.config.jump_speed;
            if position(scene, player).z < self.config.fly_ceiling {
                move_by(scene, player, Vec3::Z);
            }
        }
        if self.fly_time > self.config.fly_duration {
            self.fly_started = None;
            if position(scene, player).z > 1.0 {
                move_by(scene, player, Vec3::NEG_Z);
            }
        }
    }

    fn update_lights(&mut self, scene: &mut Scene, lights_off: bool) {
        let Some(group) = self.find(scene, LIGHTS) else {
            return;
        };
        let children = scene.children(group).to_vec();
        for (index, child) in children.into_iter().enumerate() {
            let intensity = match index {
                _ if lights_off => 0.0,
                0..=10 => 250.0,
                11..=21 => 500.0,
                22..=30 => 1.0,
                _ => continue,
            };
            if let Some(light) = scene.get_mut(child).and_then(|o| o.get_mut::<Light>()) {
                light.intensity = intensity;
            }
        }
    }

    fn follow_player(&mut self, scene: &mut Scene, player: ObjectId) {
        let Some(camera) = self.find(scene, CAMERA) else {
            return;
        };
        let [y, z] = self.config.follow_height;
        let x = position(scene, player).x - self.config.follow_lag;
        let rotation = self.config.follow_rotation;
        if let Some(object) = scene.get_mut(camera) {
            object.set_position(Vec3::new(x, y, z));
            object.set_rotation_euler(rotation);
        }
    }

    fn find(&mut self, scene: &Scene, name: &'static str) -> Option<ObjectId> {
        let id = scene.find_id_by_name(name);
        if id.is_none() && self.warned.insert(name) {
            warn!("Gameplay object `{name}` is missing from the scene");
        }
        id
    }
}

fn position(scene: &Scene, id: ObjectId) -> Vec3 {
    scene.get(id).map(|o| o.position).unwrap_or_default()
}

fn set_position(scene: &mut Scene, id: ObjectId, position: Vec3) {
    if let Some(object) = scene.get_mut(id) {
        object.set_position(position);
    }
}

fn move_by(scene: &mut Scene, id: ObjectId, offset: Vec3) {
    if let Some(object) = scene.get_mut(id) {
        object.position += offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default_scene::build_default_scene;

    fn course() -> (Scene, Runner) {
        (build_default_scene().unwrap(), Runner::new(RunnerConfig::default()))
    }

    fn player_position(scene: &Scene) -> Vec3 {
        scene.find_object_by_name(PLAYER).unwrap().position
    }

    #[test]
    fn obstacle_window_is_asymmetric() {
        let mushroom = OBSTACLES[0];
        assert!(mushroom.hits(Vec3::new(-50.0, 0.0, 1.0)));
        assert!(mushroom.hits(Vec3::new(-50.4, 0.0, 1.0)));
        assert!(!mushroom.hits(Vec3::new(-49.6, 0.0, 1.0)));
        assert!(!mushroom.hits(Vec3::new(-50.0, 0.0, 2.0)));
    }

    #[test]
    fn jump_arc_peaks_and_lands() {
        let runner = Runner::new(RunnerConfig::default());
        assert_eq!(runner.jump_height(0.0), 1.0);
        assert!((runner.jump_height(2.5 / 8.0) - 5.0).abs() < 1e-5);
        assert!(runner.jump_height(1.0) < 0.0);
    }

    #[test]
    fn running_into_first_mushroom_resets_player() {
        let (mut scene, mut runner) = course();
        for tick in 1..=140 {
            runner.tick(&mut scene, Controls::default());
            if tick < 140 {
                assert!(!runner.is_paused(), "paused early at tick {tick}");
            }
        }
        assert!((player_position(&scene).x + 50.0).abs() < 1e-3);
        assert!(!runner.is_paused());

        runner.tick(&mut scene, Controls::default());
        assert!(runner.is_paused());
        assert_eq!(player_position(&scene), Vec3::ZERO);
        let dead = scene.find_object_by_name(DEAD_PLAYER).unwrap().position;
        assert!((dead - Vec3::new(-50.4, 2.0, 1.0)).length() < 1e-3);
        let particles = scene.find_object_by_name(PARTICLES).unwrap().position;
        assert_eq!(particles, dead);

        runner.tick(&mut scene, Controls::default());
        assert_eq!(player_position(&scene), Vec3::ZERO);
    }

    #[test]
    fn camera_follows_and_can_be_released() {
        let (mut scene, mut runner) = course();
        runner.tick(&mut scene, Controls::default());
        let camera = scene.find_object_by_name(CAMERA).unwrap();
        assert!((camera.position - Vec3::new(0.6, 11.48, 6.29)).length() < 1e-4);
        let shadow = scene.find_object_by_name(SHADOW_LIGHT).unwrap().position;
        assert!((shadow - Vec3::new(-14.4, 11.48, 21.29)).length() < 1e-4);

        let toggle = Controls {
            toggle_follow: true,
            ..Controls::default()
        };
        runner.tick(&mut scene, toggle);
        assert!(!runner.is_following());
        runner.tick(&mut scene, Controls::default());
        let camera = scene.find_object_by_name(CAMERA).unwrap();
        assert!((camera.position.x - 0.6).abs() < 1e-4);
    }

    #[test]
    fn pause_stops_running() {
        let (mut scene, mut runner) = course();
        let pause = Controls {
            toggle_pause: true,
            ..Controls::default()
        };
        runner.tick(&mut scene, pause);
        runner.tick(&mut scene, pause.held());
        assert_eq!(player_position(&scene).x, 6.0);
        runner.tick(&mut scene, pause);
        assert!((player_position(&scene).x - 5.6).abs() < 1e-5);
    }

    #[test]
    fn jump_clears_mushroom() {
        let (mut scene, mut runner) = course();
        // Take off 17 ticks before reaching the first mushroom.
        let ticks_to_mushroom = 140;
        for _ in 0..ticks_to_mushroom - 18 {
            runner.tick(&mut scene, Controls::default());
        }
        let jump = Controls {
            jump: true,
            ..Controls::default()
        };
        runner.tick(&mut scene, jump);
        assert!(runner.is_jumping());
        for _ in 0..30 {
            runner.tick(&mut scene, Controls::default());
        }
        assert!(!runner.is_paused());
        assert!(player_position(&scene).x < -51.0);
    }

    #[test]
    fn flight_climbs_then_descends() {
        let (mut scene, mut runner) = course();
        let fly = Controls {
            fly: true,
            ..Controls::default()
        };
        runner.tick(&mut scene, fly);
        for _ in 0..20 {
            runner.tick(&mut scene, Controls::default());
        }
        assert!(runner.is_flying());
        let z = player_position(&scene).z;
        assert!(z >= 10.1 && z < 11.2, "{z}");

        // fly_time passes 9 after 9 * 2.5 / 8 s.
        for _ in 0..170 {
            runner.tick(&mut scene, Controls::default());
        }
        assert!(!runner.is_flying());
        assert!(player_position(&scene).z <= 1.0 + 1e-4);
    }

    #[test]
    fn lights_toggle_with_key() {
        let (mut scene, mut runner) = course();
        let dark = Controls {
            lights_off: true,
            toggle_pause: true,
            ..Controls::default()
        };
        runner.tick(&mut scene, dark);
        assert!(scene.lights().iter().filter(|l| l.intensity == 0.0).count() >= 22);
        runner.tick(&mut scene, Controls::default());
        let group = scene.find_id_by_name(LIGHTS).unwrap();
        let first = scene.children(group)[0];
        let last = scene.children(group)[21];
        let intensity = |id| scene.get(id).unwrap().get::<Light>().unwrap().intensity;
        assert_eq!(intensity(first), 250.0);
        assert_eq!(intensity(last), 500.0);
    }

    #[test]
    fn slide_squashes_player() {
        let (mut scene, mut runner) = course();
        let slide = Controls {
            slide: true,
            ..Controls::default()
        };
        runner.tick(&mut scene, slide);
        let scale = scene.find_object_by_name(PLAYER).unwrap().scale;
        assert_eq!(scale, Vec3::new(0.5, 0.15, 0.5));
        runner.tick(&mut scene, Controls::default());
        assert_eq!(scene.find_object_by_name(PLAYER).unwrap().scale, Vec3::splat(0.3));
    }

    #[test]
    fn missing_objects_are_skipped() {
        let mut scene = Scene::new();
        let mut runner = Runner::new(RunnerConfig::default());
        runner.tick(&mut scene, Controls::default());
        runner.tick(&mut scene, Controls::default());
        assert_eq!(runner.warned.len(), 1);
    }

    #[test]
    fn controls_read_press_edges() {
        let mut input = InputState::new();
        input.key_pressed(KeyCode::SPACE);
        input.key_pressed(KeyCode::DOWN);
        let controls = Controls::from_input(&input);
        assert!(controls.jump && controls.slide);
        assert!(!controls.held().jump && controls.held().slide);
        input.end_frame();
        let controls = Controls::from_input(&input);
        assert!(!controls.jump && controls.slide);
    }
}
