use anyhow::{Context, Result};
use clap::Parser;
use egui::Context as EguiContext;
use glam::Vec3;
use kiln_gpu::{CubeSources, GpuContext, Texture};
use kiln_gpu_wgpu::WgpuBackend;
use kiln_scene::{Camera, MAX_FOV, MIN_FOV};
use kiln_studio::{LitModule, ModuleHandle, SkyboxModule, Studio, StudioConfig};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

type WgpuStudio = Studio<WgpuBackend>;

#[derive(Parser)]
#[command(name = "kiln-viewer", about = "Kiln scene viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// OBJ mesh to show with the lit module
    #[arg(long)]
    obj: Option<PathBuf>,

    /// Directory holding posx.* … negz.* skybox faces
    #[arg(long)]
    skybox: Option<PathBuf>,

    /// File extension of the skybox faces
    #[arg(long, default_value = "png")]
    skybox_ext: String,

    /// Edge length of baked cube faces
    #[arg(long, default_value_t = 512)]
    bake_size: u32,
}

/// Radians per pixel of mouse motion.
const LOOK_SPEED: f32 = 0.004;
/// Radians per second while an arrow key is held.
const KEY_LOOK_SPEED: f32 = 1.5;
/// Degrees of field of view per wheel line.
const ZOOM_STEP: f32 = 2.0;

/// Handles to the modules the viewer registered.
#[derive(Default)]
struct Scene {
    lit: Option<ModuleHandle<LitModule>>,
    skybox: Option<ModuleHandle<SkyboxModule>>,
}

/// Everything that is not tied to the GPU.
struct AppState {
    camera: Camera,
    scene: Scene,
    baked: Option<Texture>,
    bake_requested: bool,
    show_inspector: bool,
    keys_held: HashSet<KeyCode>,
    mouse_captured: bool,
    last_frame: Instant,
}

impl AppState {
    fn new() -> Self {
        Self {
            camera: Camera {
                position: Vec3::new(0.0, 0.0, 3.0),
                ..Camera::default()
            },
            scene: Scene::default(),
            baked: None,
            bake_requested: false,
            show_inspector: true,
            keys_held: HashSet::new(),
            mouse_captured: false,
            last_frame: Instant::now(),
        }
    }

    fn update(&mut self, dt: f32) {
        let step = KEY_LOOK_SPEED * dt;
        let mut dx = 0.0;
        let mut dy = 0.0;
        if self.keys_held.contains(&KeyCode::ArrowLeft) {
            dx += step;
        }
        if self.keys_held.contains(&KeyCode::ArrowRight) {
            dx -= step;
        }
        if self.keys_held.contains(&KeyCode::ArrowUp) {
            dy += step;
        }
        if self.keys_held.contains(&KeyCode::ArrowDown) {
            dy -= step;
        }
        if dx != 0.0 || dy != 0.0 {
            self.camera.rotate(dx, dy);
        }
    }

    fn handle_key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.keys_held.insert(key);
        } else {
            self.keys_held.remove(&key);
        }

        if !pressed {
            return;
        }

        match key {
            KeyCode::KeyB => self.bake_requested = true,
            KeyCode::Equal => self.camera.zoom(-ZOOM_STEP),
            KeyCode::Minus => self.camera.zoom(ZOOM_STEP),
            KeyCode::F1 => self.show_inspector = !self.show_inspector,
            _ => {}
        }
    }

    /// Bake from the current camera and hand the result to the lit items as
    /// their reflection map.
    fn bake(&mut self, studio: &mut WgpuStudio) {
        let started = Instant::now();
        let cube = match studio.render_cubemap(&self.camera) {
            Ok(cube) => cube,
            Err(e) => {
                tracing::error!("cubemap bake failed: {e}");
                return;
            }
        };
        // The skybox may still be showing the previous bake.
        if let Some(old) = self.baked.replace(cube) {
            if let Err(e) = studio.replace_texture(old, cube) {
                tracing::warn!("failed to release previous bake: {e}");
            }
        }
        if let Some(lit) = self.scene.lit.and_then(|h| studio.module_mut(h)) {
            for item in &mut lit.items {
                item.cube = Some(cube);
            }
        }
        tracing::info!(
            "baked {} in {:.1} ms",
            cube.id,
            started.elapsed().as_secs_f64() * 1000.0
        );
    }

    fn draw_ui(&mut self, ctx: &EguiContext, studio: &mut WgpuStudio) {
        if !self.show_inspector {
            return;
        }

        egui::SidePanel::left("inspector")
            .default_width(280.0)
            .show(ctx, |ui| {
                ui.heading("Kiln");
                ui.separator();
                ui.label(format!(
                    "Camera: ({:.2}, {:.2}, {:.2})",
                    self.camera.position.x, self.camera.position.y, self.camera.position.z
                ));
                ui.label(format!(
                    "Looking: ({:.2}, {:.2}, {:.2})",
                    self.camera.direction.x, self.camera.direction.y, self.camera.direction.z
                ));
                let mut fov = self.camera.fov;
                ui.add(egui::Slider::new(&mut fov, MIN_FOV..=MAX_FOV).text("FOV"));
                if fov != self.camera.fov {
                    self.camera.set_fov(fov);
                }
                ui.separator();

                ui.heading("Modules");
                for (index, module) in studio.modules().iter().enumerate() {
                    ui.label(format!("{index}: {}", module.name()));
                }
                ui.label(format!(
                    "Programs: {}",
                    studio.programs().names().collect::<Vec<_>>().join(", ")
                ));
                ui.label(format!("Live GPU objects: {}", studio.ctx().live_resources().len()));

                if let Some(lit) = self.scene.lit.and_then(|h| studio.module_mut(h)) {
                    ui.separator();
                    ui.heading("Lighting");
                    ui.checkbox(&mut lit.render_textures, "Textures");
                    ui.add(egui::Slider::new(&mut lit.light.ka, 0.0..=1.0).text("ka"));
                    ui.add(egui::Slider::new(&mut lit.light.kd, 0.0..=1.0).text("kd"));
                    ui.add(egui::Slider::new(&mut lit.light.ks, 0.0..=1.0).text("ks"));
                    ui.add(egui::Slider::new(&mut lit.light.shininess, 1.0..=128.0).text("shininess"));
                    ui.label(format!("Items: {}", lit.items.len()));
                    for item in &mut lit.items {
                        let vertices: u32 = item.vertex_arrays.iter().map(|(_, n)| n).sum();
                        let mut shown = !item.skip;
                        ui.checkbox(&mut shown, format!("{vertices} vertices"));
                        item.skip = !shown;
                    }
                }

                ui.separator();
                ui.heading("Bake");
                if ui.button("Bake cubemap (B)").clicked() {
                    self.bake_requested = true;
                }
                if let Some(baked) = self.baked {
                    ui.label(format!("Last bake: {} ({}px)", baked.id, baked.width));
                    if let Some(sky) = self.scene.skybox.and_then(|h| studio.module_mut(h)) {
                        if ui.button("Use bake as skybox").clicked() {
                            sky.set_texture(baked);
                        }
                    }
                }

                ui.separator();
                ui.small("F1: Toggle Inspector | RMB: Look | Wheel, +/-: Zoom");
            });
    }
}

/// Build the scene the command line asked for.
async fn populate(studio: &mut WgpuStudio, cli: &Cli) -> Result<Scene> {
    let mut scene = Scene::default();
    if let Some(path) = &cli.obj {
        let doc = kiln_scene::load_obj(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?;
        tracing::info!(
            "{}: {} geometries, {} vertices, {} warnings",
            path.display(),
            doc.geometries.len(),
            doc.vertex_count(),
            doc.warnings.len()
        );
        let lit = studio
            .register(async |s: &mut WgpuStudio| {
                let mut lit = LitModule::create(s)?;
                lit.add(s.ctx_mut(), &doc)?;
                Ok(lit)
            })
            .await?;
        scene.lit = Some(lit);
    }
    if let Some(dir) = &cli.skybox {
        let sources = CubeSources::from_dir(dir, &cli.skybox_ext);
        let skybox = studio
            .register(async |s: &mut WgpuStudio| SkyboxModule::load(s, sources).await)
            .await
            .with_context(|| format!("loading skybox from {}", dir.display()))?;
        scene.skybox = Some(skybox);
    }
    Ok(scene)
}

struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    studio: WgpuStudio,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl Gpu {
    fn new(event_loop: &ActiveEventLoop, egui_ctx: &EguiContext, cli: &Cli) -> Result<(Self, Scene)> {
        let attrs = Window::default_attributes()
            .with_title("Kiln")
            .with_inner_size(PhysicalSize::new(1280u32, 720));
        let window = Arc::new(event_loop.create_window(attrs).context("create window")?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(Arc::clone(&window))
            .context("create surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no suitable GPU adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("kiln_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .context("create device")?;
        let (device, queue) = (Arc::new(device), Arc::new(queue));

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("surface reports no formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let backend = WgpuBackend::new(
            Arc::clone(&device),
            Arc::clone(&queue),
            surface_format,
            config.width,
            config.height,
        );
        let mut studio = Studio::new(
            GpuContext::new(backend),
            StudioConfig {
                bake_size: cli.bake_size,
                ..StudioConfig::default()
            },
        );
        let scene = pollster::block_on(populate(&mut studio, cli))?;

        let egui_winit = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        tracing::info!(
            "GPU initialized with {} backend",
            adapter.get_info().backend.to_str()
        );

        Ok((
            Self {
                window,
                surface,
                device,
                queue,
                config,
                studio,
                egui_winit,
                egui_renderer,
            },
            scene,
        ))
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.studio
            .ctx_mut()
            .backend_mut()
            .resize(self.config.width, self.config.height);
    }

    fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height.max(1) as f32
    }
}

struct GpuApp {
    cli: Cli,
    state: AppState,
    gpu: Option<Gpu>,
    egui_ctx: EguiContext,
}

impl GpuApp {
    fn new(cli: Cli) -> Self {
        Self {
            cli,
            state: AppState::new(),
            gpu: None,
            egui_ctx: EguiContext::default(),
        }
    }

    fn redraw(&mut self) {
        let now = Instant::now();
        let dt = (now - self.state.last_frame).as_secs_f32().min(0.1);
        self.state.last_frame = now;
        self.state.update(dt);

        let Some(gpu) = &mut self.gpu else {
            return;
        };

        if std::mem::take(&mut self.state.bake_requested) {
            self.state.bake(&mut gpu.studio);
        }

        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(&gpu.device, &gpu.config);
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };

        let scene_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        gpu.studio.ctx_mut().backend_mut().attach_surface(scene_view);
        let rendered = gpu
            .studio
            .render(&self.state.camera)
            .and_then(|()| gpu.studio.flush());
        if let Err(e) = rendered {
            tracing::error!("render failed: {e}");
        }

        let raw_input = gpu.egui_winit.take_egui_input(&gpu.window);
        let state = &mut self.state;
        let studio = &mut gpu.studio;
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            state.draw_ui(ctx, studio);
        });

        gpu.egui_winit
            .handle_platform_output(&gpu.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gpu.config.width, gpu.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        for (id, image_delta) in &full_output.textures_delta.set {
            gpu.egui_renderer
                .update_texture(&gpu.device, &gpu.queue, *id, image_delta);
        }
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("egui_encoder"),
            });
        gpu.egui_renderer.update_buffers(
            &gpu.device,
            &gpu.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();
            gpu.egui_renderer
                .render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        for id in &full_output.textures_delta.free {
            gpu.egui_renderer.free_texture(id);
        }

        output.present();
        gpu.window.request_redraw();
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match Gpu::new(event_loop, &self.egui_ctx, &self.cli) {
            Ok((gpu, scene)) => {
                self.state.camera.aspect = gpu.aspect();
                self.state.scene = scene;
                self.gpu = Some(gpu);
            }
            Err(e) => {
                tracing::error!("startup failed: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if let Some(gpu) = &mut self.gpu {
            let response = gpu.egui_winit.on_window_event(&gpu.window, &event);
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.studio.teardown();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(new_size.width, new_size.height);
                    self.state.camera.aspect = gpu.aspect();
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: key_state,
                        ..
                    },
                ..
            } => {
                self.state.handle_key(key, key_state == ElementState::Pressed);
            }
            WindowEvent::MouseInput {
                button: MouseButton::Right,
                state: btn_state,
                ..
            } => {
                self.state.mouse_captured = btn_state == ElementState::Pressed;
                if let Some(gpu) = &self.gpu {
                    gpu.window.set_cursor_visible(!self.state.mouse_captured);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 40.0,
                };
                self.state.camera.zoom(-lines * ZOOM_STEP);
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.state.mouse_captured {
                self.state
                    .camera
                    .rotate(-delta.0 as f32 * LOOK_SPEED, -delta.1 as f32 * LOOK_SPEED);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    tracing::info!("kiln-viewer starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp::new(cli);
    event_loop.run_app(&mut app)?;

    Ok(())
}
