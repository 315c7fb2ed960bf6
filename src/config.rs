// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every field has a default, so a partial (or missing) config.toml is fine.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;
use winit::keyboard::KeyCode;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub assets: AssetsConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
    /// Messages produced while loading, logged once the logger is up
    #[serde(skip)]
    pub load_messages: Vec<(log::Level, String)>,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Scene".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
    /// Upper bound for the MSAA sample count; the device limit still applies
    pub max_msaa_samples: u32,
    pub draw_cube: bool,
    /// Model rotation in degrees per second
    pub rotation_speed: f32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_frames_in_flight: 2,
            max_msaa_samples: 8,
            draw_cube: true,
            rotation_speed: 90.0,
        }
    }
}

/// Texture and shader locations
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Absent (or empty) uploads a generated checkerboard instead
    pub texture: Option<String>,
    pub scene_vertex_shader: String,
    pub scene_fragment_shader: String,
    pub cube_vertex_shader: String,
    pub cube_fragment_shader: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            texture: None,
            scene_vertex_shader: "shaders/scene.vert.spv".to_string(),
            scene_fragment_shader: "shaders/scene.frag.spv".to_string(),
            cube_vertex_shader: "shaders/cube.vert.spv".to_string(),
            cube_fragment_shader: "shaders/cube.frag.spv".to_string(),
        }
    }
}

impl AssetsConfig {
    pub fn texture_path(&self) -> Option<&str> {
        self.texture.as_deref().filter(|path| !path.is_empty())
    }

    pub fn shader_paths(&self) -> [&str; 4] {
        [
            &self.scene_vertex_shader,
            &self.scene_fragment_shader,
            &self.cube_vertex_shader,
            &self.cube_fragment_shader,
        ]
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
    pub hot_reload: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "vk_scene.log".to_string(),
            show_fps: true,
            hot_reload: true,
        }
    }
}

/// Control key bindings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub fullscreen_key: String,
    pub quit_key: String,
    pub reload_shaders_key: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            fullscreen_key: "F11".to_string(),
            quit_key: "Escape".to_string(),
            reload_shaders_key: "F5".to_string(),
        }
    }
}

impl ControlsConfig {
    /// Map a key name from the config file to a winit key code
    pub fn key(name: &str) -> Option<KeyCode> {
        let key = match name.to_lowercase().as_str() {
            "escape" | "esc" => KeyCode::Escape,
            "space" => KeyCode::Space,
            "enter" | "return" => KeyCode::Enter,
            "tab" => KeyCode::Tab,
            "f1" => KeyCode::F1,
            "f2" => KeyCode::F2,
            "f3" => KeyCode::F3,
            "f4" => KeyCode::F4,
            "f5" => KeyCode::F5,
            "f6" => KeyCode::F6,
            "f7" => KeyCode::F7,
            "f8" => KeyCode::F8,
            "f9" => KeyCode::F9,
            "f10" => KeyCode::F10,
            "f11" => KeyCode::F11,
            "f12" => KeyCode::F12,
            "q" => KeyCode::KeyQ,
            "r" => KeyCode::KeyR,
            "f" => KeyCode::KeyF,
            _ => return None,
        };
        Some(key)
    }

    pub fn fullscreen(&self) -> Option<KeyCode> {
        Self::key(&self.fullscreen_key)
    }

    pub fn quit(&self) -> Option<KeyCode> {
        Self::key(&self.quit_key)
    }

    pub fn reload_shaders(&self) -> Option<KeyCode> {
        Self::key(&self.reload_shaders_key)
    }
}

impl Config {
    /// Load config.toml, falling back to defaults if it is missing or broken
    pub fn load() -> Self {
        Self::load_or_default("config.toml")
    }

    /// Like `load_from_path`, but a bad file becomes defaults plus a warning
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_path(&path).unwrap_or_else(|e| {
            let mut config = Config::default();
            config.note(
                log::Level::Warn,
                format!("Failed to load {:?}: {:#}. Using defaults.", path.as_ref(), e),
            );
            config
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let mut config = Config::default();
            config.note(
                log::Level::Info,
                format!("Config file not found at {:?}, using defaults", path),
            );
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.note(log::Level::Info, format!("Loaded configuration from {:?}", path));
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.sanitize();
        Ok(config)
    }

    fn note(&mut self, level: log::Level, message: String) {
        self.load_messages.push((level, message));
    }

    /// Emit the messages collected by `load`; call after the logger is initialized
    pub fn log_load_messages(&mut self) {
        for (level, message) in self.load_messages.drain(..) {
            log::log!(level, "{}", message);
        }
        log::debug!("Config: {:?}", self);
    }

    /// Pull out-of-range values back to something the renderer can use
    pub fn sanitize(&mut self) {
        let defaults = WindowConfig::default();
        if self.window.width == 0 {
            self.window.width = defaults.width;
        }
        if self.window.height == 0 {
            self.window.height = defaults.height;
        }

        let frames = self.graphics.max_frames_in_flight.clamp(1, 4);
        if frames != self.graphics.max_frames_in_flight {
            self.note(
                log::Level::Warn,
                format!(
                    "max_frames_in_flight {} out of range, using {}",
                    self.graphics.max_frames_in_flight, frames
                ),
            );
            self.graphics.max_frames_in_flight = frames;
        }

        // Largest power of two not above the requested count
        let samples = self.graphics.max_msaa_samples.clamp(1, 64);
        self.graphics.max_msaa_samples = 1 << (31 - samples.leading_zeros());
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::MAILBOX
            }
        }
    }

    /// MSAA cap as a Vulkan sample count flag
    pub fn max_sample_count(&self) -> vk::SampleCountFlags {
        vk::SampleCountFlags::from_raw(self.graphics.max_msaa_samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.assets.texture_path(), None);
    }

    #[test]
    fn test_partial_tables() {
        let config = Config::from_toml(
            r#"
            [window]
            title = "Test"

            [graphics]
            present_mode = "FIFO"
            clear_color = [0.1, 0.2, 0.3, 1.0]

            [debug]
            hot_reload = false
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Test");
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.graphics.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert!(!config.debug.hot_reload);
        assert!(config.debug.validation_layers);
    }

    #[test]
    fn test_unknown_present_mode_falls_back_to_mailbox() {
        let config = Config::from_toml("[graphics]\npresent_mode = \"vsync-ish\"").unwrap();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_sanitize_clamps_frames_and_samples() {
        let config = Config::from_toml(
            "[graphics]\nmax_frames_in_flight = 0\nmax_msaa_samples = 6\n[window]\nwidth = 0",
        )
        .unwrap();
        assert_eq!(config.graphics.max_frames_in_flight, 1);
        assert_eq!(config.graphics.max_msaa_samples, 4);
        assert_eq!(config.max_sample_count(), vk::SampleCountFlags::TYPE_4);
        assert_eq!(config.window.width, 1280);

        let config = Config::from_toml(
            "[graphics]\nmax_frames_in_flight = 9\nmax_msaa_samples = 1000",
        )
        .unwrap();
        assert_eq!(config.graphics.max_frames_in_flight, 4);
        assert_eq!(config.max_sample_count(), vk::SampleCountFlags::TYPE_64);
    }

    #[test]
    fn test_texture_can_be_unset() {
        let config = Config::from_toml("[assets]\nscene_vertex_shader = \"a.spv\"").unwrap();
        assert_eq!(config.assets.texture_path(), None);
        assert_eq!(config.assets.shader_paths()[0], "a.spv");

        let config = Config::from_toml("[assets]\ntexture = \"\"").unwrap();
        assert_eq!(config.assets.texture_path(), None);

        let config = Config::from_toml("[assets]\ntexture = \"assets/texture.png\"").unwrap();
        assert_eq!(config.assets.texture_path(), Some("assets/texture.png"));
    }

    #[test]
    fn test_sanitize_warnings_are_kept_for_later() {
        let config = Config::from_toml("[graphics]\nmax_frames_in_flight = 9").unwrap();
        assert_eq!(config.load_messages.len(), 1);
        assert_eq!(config.load_messages[0].0, log::Level::Warn);
        assert!(config.load_messages[0].1.contains("max_frames_in_flight 9"));
    }

    #[test]
    fn test_broken_file_falls_back_with_warning() {
        let path = std::env::temp_dir().join(format!("vk_scene_bad_{}.toml", std::process::id()));
        std::fs::write(&path, "[window\nwidth = 3").unwrap();

        let config = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.window.width, 1280);
        assert!(config
            .load_messages
            .iter()
            .any(|(level, msg)| *level == log::Level::Warn && msg.contains("Using defaults")));
    }

    #[test]
    fn test_missing_file_is_noted() {
        let config = Config::load_or_default("definitely/not/here/config.toml");
        assert_eq!(config.load_messages.len(), 1);
        assert_eq!(config.load_messages[0].0, log::Level::Info);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::from_toml("[window\nwidth = 3").is_err());
        assert!(Config::from_toml("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn test_key_names() {
        assert_eq!(ControlsConfig::key("Escape"), Some(KeyCode::Escape));
        assert_eq!(ControlsConfig::key("f11"), Some(KeyCode::F11));
        assert_eq!(ControlsConfig::key("nope"), None);

        let controls = ControlsConfig::default();
        assert_eq!(controls.fullscreen(), Some(KeyCode::F11));
        assert_eq!(controls.quit(), Some(KeyCode::Escape));
        assert_eq!(controls.reload_shaders(), Some(KeyCode::F5));
    }
}
