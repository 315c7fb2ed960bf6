// =============================================================================
// VK-SCENE - textured, depth-tested, multisampled Vulkan scene
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, input, FPS title, shader watcher)       │
// │    └── Renderer (per-frame record/submit/present)               │
// │          └── Swapchain + targets + pipelines + descriptors      │
// │                └── VulkanDevice (instance, surface, queues)     │
// └─────────────────────────────────────────────────────────────────┘
//
// Settings come from config.toml (see config.rs), logging from env_logger.
//
// =============================================================================

mod backend;
mod config;
mod hot_reload;
mod renderer;
mod scene;

use anyhow::Result;
use config::Config;
use hot_reload::ShaderWatcher;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use renderer::{Renderer, RendererSettings};
use std::fs::File;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::PhysicalKey,
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let mut config = Config::load();

    init_logging(&config);
    log::info!("Starting vk-scene");
    config.log_load_messages();
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if let Some(e) = app.fatal_error.take() {
        return Err(e);
    }
    Ok(())
}

/// env_logger at Info unless RUST_LOG says otherwise; optionally into a file
fn init_logging(config: &Config) {
    use env_logger::{Builder, Env, Target};

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    if config.debug.log_to_file {
        match File::create(&config.debug.log_file) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!(
                "Could not open log file {}: {}, logging to stderr",
                config.debug.log_file, e
            ),
        }
    }

    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the renderer owns the surface, which must
/// go before the window it was created from.
struct App {
    config: Config,
    renderer: Option<Renderer>,
    shader_watcher: Option<ShaderWatcher>,
    window: Option<Arc<Window>>,
    is_fullscreen: bool,
    /// Set when the window is minimized (size = 0) - skip rendering
    is_minimized: bool,
    /// Initialization or rendering failure that ended the event loop
    fatal_error: Option<anyhow::Error>,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let now = Instant::now();
        Self {
            config,
            renderer: None,
            shader_watcher: None,
            window: None,
            is_fullscreen,
            is_minimized: false,
            fatal_error: None,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    fn init_vulkan(&mut self, window: &Window) -> Result<()> {
        let size = window.inner_size();
        let renderer = Renderer::new(
            RendererSettings::from_config(&self.config),
            window.raw_display_handle(),
            window.raw_window_handle(),
            size.width,
            size.height,
        )?;
        self.renderer = Some(renderer);

        if self.config.debug.hot_reload {
            // A watcher failure only disables hot reload
            match ShaderWatcher::new(&self.config.assets.shader_paths()) {
                Ok(watcher) => self.shader_watcher = Some(watcher),
                Err(e) => log::warn!("Shader hot reload disabled: {:#}", e),
            }
        }

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    fn render_frame(&mut self) -> Result<bool> {
        if self.is_minimized {
            return Ok(false);
        }
        let (Some(renderer), Some(window)) = (self.renderer.as_mut(), self.window.as_ref()) else {
            return Ok(false);
        };

        let size = window.inner_size();
        renderer.draw_frame(size.width, size.height)
    }

    fn reload_shaders(&mut self) {
        if let Some(renderer) = self.renderer.as_mut() {
            log::info!("Reloading shaders...");
            renderer.reload_pipelines();
        }
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            if let Some(renderer) = self.renderer.as_mut() {
                renderer.request_resize();
            }
        }
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.fatal_error = Some(error);
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        if let Err(e) = self.init_vulkan(&window) {
            self.fail(event_loop, e.context("Failed to initialize Vulkan"));
            return;
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                self.is_minimized = size.width == 0 || size.height == 0;
                if !self.is_minimized {
                    if let Some(renderer) = self.renderer.as_mut() {
                        renderer.request_resize();
                    }
                }
            }

            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(true) => self.update_fps(),
                Ok(false) => {}
                Err(e) => self.fail(event_loop, e.context("Render error")),
            },

            WindowEvent::KeyboardInput { event, .. } => {
                if !event.state.is_pressed() || event.repeat {
                    return;
                }
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };

                let controls = &self.config.controls;
                if Some(key) == controls.quit() {
                    log::info!("{:?} pressed, exiting...", key);
                    event_loop.exit();
                } else if Some(key) == controls.fullscreen() {
                    self.toggle_fullscreen();
                } else if Some(key) == controls.reload_shaders() {
                    self.reload_shaders();
                }
            }

            _ => {}
        }
    }

    /// Pick up shader changes, then keep redrawing continuously
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self
            .shader_watcher
            .as_ref()
            .is_some_and(|watcher| watcher.take_changes())
        {
            self.reload_shaders();
        }

        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        // Renderer (and with it the surface) before the window
        self.renderer = None;
        self.window = None;
        log::info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_follow_config() {
        let config = Config::from_toml(
            r#"
            [graphics]
            present_mode = "fifo"
            max_frames_in_flight = 3
            max_msaa_samples = 4
            draw_cube = false

            [assets]
            texture = ""
            scene_vertex_shader = "s.vert.spv"
            "#,
        )
        .unwrap();

        let settings = RendererSettings::from_config(&config);
        assert_eq!(settings.present_mode, ash::vk::PresentModeKHR::FIFO);
        assert_eq!(settings.frames_in_flight, 3);
        assert_eq!(settings.max_samples, ash::vk::SampleCountFlags::TYPE_4);
        assert!(!settings.draw_cube);
        assert!(settings.texture.is_none());
        assert_eq!(settings.scene_shaders[0], std::path::PathBuf::from("s.vert.spv"));
        assert_eq!(
            settings.cube_shaders[1],
            std::path::PathBuf::from("shaders/cube.frag.spv")
        );
    }
}
