use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::{info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use otter::layers::{install_default_layers, SceneLoaderLayer, SceneSource};
use otter::particles::ParticleSystem;
use otter::render::{Gpu, WindowSurface};
use otter::settings::DEFAULT_SETTINGS_PATH;
use otter::{AppContext, Application, KeyCode, MouseButton, NamedKey, RenderFrame, Scene};

const FRAME_TIME: f32 = 1.0 / 60.0;
const DEFAULT_FRAMES: u32 = 300;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;

    if options.summary_only {
        return run_headless(build_app(&options)?, options.frames.unwrap_or(DEFAULT_FRAMES));
    }
    match run_interactive(build_app(&options)?, options.frames) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                );
                run_headless(build_app(&options)?, options.frames.unwrap_or(DEFAULT_FRAMES))
            } else {
                Err(err)
            }
        }
    }
}

fn build_app(options: &CliOptions) -> Result<Application> {
    let source = match &options.scene {
        Some(path) => SceneSource::File(path.clone()),
        None => SceneSource::Default,
    };
    let mut loader = SceneLoaderLayer::new(source);
    if let Some(path) = &options.save_scene {
        loader = loader.with_save_path(path);
    }

    let mut app = Application::new(AppContext::new(
        otter::settings::DEFAULT_WINDOW_SIZE,
        options.editor,
    ));
    install_default_layers(&mut app, loader);
    let settings = options
        .settings
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
    app.load_settings(Some(settings))?;
    Ok(app)
}

/// Loads the layers and the startup scene, then prints the scene summary.
fn start(app: &mut Application) -> Result<()> {
    app.load()?;
    app.apply_pending_scene()?;
    let scene = app
        .context()
        .scene
        .as_ref()
        .ok_or_else(|| anyhow!("no scene was loaded"))?;
    print_summary(scene);
    Ok(())
}

fn run_headless(mut app: Application, frames: u32) -> Result<()> {
    start(&mut app)?;
    for _ in 0..frames {
        app.frame(FRAME_TIME, None)?;
        if app.context().should_quit() {
            break;
        }
    }
    app.unload()?;
    if let Some(scene) = app.context().scene.as_ref() {
        print_final_state(scene);
    }
    Ok(())
}

fn run_interactive(app: Application, frames: Option<u32>) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let (width, height) = app.settings().window_size();
    let mut viewer = Viewer {
        app,
        attributes: Window::default_attributes()
            .with_title("Otter")
            .with_inner_size(LogicalSize::new(width as f64, height as f64)),
        surface: None,
        last_frame: None,
        frames_left: frames,
        error: None,
    };
    event_loop
        .run_app(&mut viewer)
        .context("event loop terminated abnormally")?;

    if let Some(err) = viewer.error.take() {
        return Err(err);
    }
    viewer.app.unload()?;
    if let Some(scene) = viewer.app.context().scene.as_ref() {
        print_final_state(scene);
    }
    Ok(())
}

struct Viewer {
    app: Application,
    attributes: WindowAttributes,
    surface: Option<WindowSurface>,
    last_frame: Option<Instant>,
    frames_left: Option<u32>,
    error: Option<anyhow::Error>,
}

impl Viewer {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Arc::new(
            event_loop
                .create_window(self.attributes.clone())
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );
        let (gpu, surface) = block_on(Gpu::for_window(window))
            .map_err(|err| WindowInitError::from_error("graphics device", format!("{err:#}")))?;
        self.app.resize(surface.size())?;
        self.app.attach_gpu(gpu);
        self.surface = Some(surface);
        start(&mut self.app)
    }

    fn redraw(&mut self) -> Result<()> {
        let now = Instant::now();
        let dt = self
            .last_frame
            .replace(now)
            .map_or(0.0, |last| (now - last).as_secs_f32());

        let (Some(surface), Some(gpu)) = (self.surface.as_mut(), self.app.context().gpu.as_ref())
        else {
            return self.app.frame(dt, None);
        };
        let Some(texture) = surface.acquire(gpu)? else {
            return self.app.frame(dt, None);
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        let mut frame = RenderFrame {
            encoder: &mut encoder,
            surface_view: &view,
        };
        self.app.frame(dt, Some(&mut frame))?;

        if let Some(gpu) = self.app.context().gpu.as_ref() {
            gpu.queue.submit(std::iter::once(encoder.finish()));
        }
        texture.present();
        Ok(())
    }

    fn handle_window_event(&mut self, event_loop: &ActiveEventLoop, event: WindowEvent) -> Result<()> {
        let input = &mut self.app.context_mut().input;
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => self.resize(size)?,
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return Ok(());
                };
                if code == WinitKey::Escape && event.state == ElementState::Pressed {
                    event_loop.exit();
                    return Ok(());
                }
                if let Some(key) = map_keycode(code) {
                    match event.state {
                        ElementState::Pressed => input.key_pressed(key),
                        ElementState::Released => input.key_released(key),
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let index = match button {
                    WinitMouseButton::Left => 0,
                    WinitMouseButton::Right => 1,
                    WinitMouseButton::Middle => 2,
                    WinitMouseButton::Back => 3,
                    WinitMouseButton::Forward => 4,
                    WinitMouseButton::Other(value) => value.min(u8::MAX as u16) as u8,
                };
                let button = MouseButton::new(index);
                match state {
                    ElementState::Pressed => input.mouse_pressed(button),
                    ElementState::Released => input.mouse_released(button),
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                input.set_mouse_position(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let delta = match delta {
                    MouseScrollDelta::LineDelta(x, y) => Vec2::new(x, y),
                    MouseScrollDelta::PixelDelta(pos) => Vec2::new(pos.x as f32, pos.y as f32),
                };
                input.add_scroll(delta);
            }
            WindowEvent::RedrawRequested => {
                self.redraw()?;
                if let Some(left) = self.frames_left.as_mut() {
                    *left = left.saturating_sub(1);
                    if *left == 0 {
                        event_loop.exit();
                    }
                }
                if self.app.context().should_quit() {
                    event_loop.exit();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }
        if let (Some(surface), Some(gpu)) = (self.surface.as_mut(), self.app.context().gpu.as_ref()) {
            surface.resize(gpu, size);
        }
        self.app.resize((size.width, size.height))
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.surface.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if let Err(err) = self.handle_window_event(event_loop, event) {
            self.error = Some(err);
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(surface) = self.surface.as_ref() {
            surface.window().request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        info!("Window closed");
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

fn print_summary(scene: &Scene) {
    println!(
        "Loaded scene with {} objects ({} lights)",
        scene.object_count(),
        scene.lights().len()
    );
    for object in scene.objects() {
        let components: Vec<&str> = object
            .components()
            .iter()
            .map(|component| component.type_name())
            .collect();
        if components.is_empty() {
            println!(" - {}", object.name);
        } else {
            println!(" - {} ({})", object.name, components.join(", "));
        }
    }
}

fn print_final_state(scene: &Scene) {
    println!("Final object states:");
    for object in scene.objects() {
        let position = object.position;
        println!(
            " - {} pos=({:.2}, {:.2}, {:.2})",
            object.name, position.x, position.y, position.z
        );
    }
    for object in scene.objects() {
        if let Some(system) = object.get::<ParticleSystem>() {
            println!(" - {} particles={}", object.name, system.particle_count());
        }
    }
}

fn map_keycode(code: WinitKey) -> Option<KeyCode> {
    use WinitKey as Key;
    Some(match code {
        Key::Space => KeyCode::Named(NamedKey::Space),
        Key::Enter => KeyCode::Named(NamedKey::Enter),
        Key::Tab => KeyCode::Named(NamedKey::Tab),
        Key::ArrowLeft => KeyCode::Named(NamedKey::Left),
        Key::ArrowRight => KeyCode::Named(NamedKey::Right),
        Key::ArrowUp => KeyCode::Named(NamedKey::Up),
        Key::ArrowDown => KeyCode::Named(NamedKey::Down),
        Key::Escape => KeyCode::Named(NamedKey::Escape),
        Key::Backspace => KeyCode::Named(NamedKey::Backspace),
        Key::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        Key::ShiftRight => KeyCode::Named(NamedKey::RightShift),
        Key::ControlLeft => KeyCode::Named(NamedKey::LeftCtrl),
        Key::ControlRight => KeyCode::Named(NamedKey::RightCtrl),
        Key::AltLeft => KeyCode::Named(NamedKey::LeftAlt),
        Key::AltRight => KeyCode::Named(NamedKey::RightAlt),
        Key::Digit0 => KeyCode::Digit(0),
        Key::Digit1 => KeyCode::Digit(1),
        Key::Digit2 => KeyCode::Digit(2),
        Key::Digit3 => KeyCode::Digit(3),
        Key::Digit4 => KeyCode::Digit(4),
        Key::Digit5 => KeyCode::Digit(5),
        Key::Digit6 => KeyCode::Digit(6),
        Key::Digit7 => KeyCode::Digit(7),
        Key::Digit8 => KeyCode::Digit(8),
        Key::Digit9 => KeyCode::Digit(9),
        Key::KeyA => KeyCode::Character('A'),
        Key::KeyB => KeyCode::Character('B'),
        Key::KeyC => KeyCode::Character('C'),
        Key::KeyD => KeyCode::Character('D'),
        Key::KeyE => KeyCode::Character('E'),
        Key::KeyF => KeyCode::Character('F'),
        Key::KeyG => KeyCode::Character('G'),
        Key::KeyH => KeyCode::Character('H'),
        Key::KeyI => KeyCode::Character('I'),
        Key::KeyJ => KeyCode::Character('J'),
        Key::KeyK => KeyCode::Character('K'),
        Key::KeyL => KeyCode::Character('L'),
        Key::KeyM => KeyCode::Character('M'),
        Key::KeyN => KeyCode::Character('N'),
        Key::KeyO => KeyCode::Character('O'),
        Key::KeyP => KeyCode::Character('P'),
        Key::KeyQ => KeyCode::Character('Q'),
        Key::KeyR => KeyCode::Character('R'),
        Key::KeyS => KeyCode::Character('S'),
        Key::KeyT => KeyCode::Character('T'),
        Key::KeyU => KeyCode::Character('U'),
        Key::KeyV => KeyCode::Character('V'),
        Key::KeyW => KeyCode::Character('W'),
        Key::KeyX => KeyCode::Character('X'),
        Key::KeyY => KeyCode::Character('Y'),
        Key::KeyZ => KeyCode::Character('Z'),
        Key::F1 => KeyCode::Function(1),
        Key::F2 => KeyCode::Function(2),
        Key::F3 => KeyCode::Function(3),
        Key::F4 => KeyCode::Function(4),
        Key::F5 => KeyCode::Function(5),
        Key::F6 => KeyCode::Function(6),
        Key::F7 => KeyCode::Function(7),
        Key::F8 => KeyCode::Function(8),
        Key::F9 => KeyCode::Function(9),
        Key::F10 => KeyCode::Function(10),
        Key::F11 => KeyCode::Function(11),
        Key::F12 => KeyCode::Function(12),
        _ => return None,
    })
}

const USAGE: &str = "Usage: otter [scene.json] [--summary-only] [--frames N] [--edit] [--save-scene PATH] [--settings PATH]";

#[derive(Debug, Default)]
struct CliOptions {
    scene: Option<PathBuf>,
    summary_only: bool,
    frames: Option<u32>,
    editor: bool,
    save_scene: Option<PathBuf>,
    settings: Option<PathBuf>,
}

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{flag} expects a value. {USAGE}"))
            };
            match arg.as_str() {
                "--summary-only" => options.summary_only = true,
                "--edit" => options.editor = true,
                "--frames" => {
                    let raw = value("--frames")?;
                    let frames = raw
                        .parse()
                        .with_context(|| format!("invalid frame count `{raw}`"))?;
                    options.frames = Some(frames);
                }
                "--save-scene" => options.save_scene = Some(value("--save-scene")?.into()),
                "--settings" => options.settings = Some(value("--settings")?.into()),
                other if other.starts_with("--") => {
                    return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                }
                path => {
                    if options.scene.is_some() {
                        warn!("Ignoring extra scene argument {path}");
                    } else {
                        options.scene = Some(PathBuf::from(path));
                    }
                }
            }
        }
        Ok(options)
    }
}
