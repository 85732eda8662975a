// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Falls back to defaults if the file is missing or has errors, handing the
// error back so it can be logged once logging is up.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::{ContextConfig, VALIDATION_LAYER};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub context: ContextSection,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
    pub frame: FrameConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Hello Triangle".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Instance extensions and layers requested on top of the built-in ones
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    pub extra_extensions: Vec<String>,
    /// Enabled only while validation is on
    pub layers: Vec<String>,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            extra_extensions: Vec::new(),
            layers: vec![VALIDATION_LAYER.to_string()],
        }
    }
}

/// Where compiled SPIR-V lives
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub directory: PathBuf,
    pub name: String,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("shaders"),
            name: "triangle".to_string(),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "vulkan_debug.log".to_string(),
        }
    }
}

/// Frame loop pacing
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Sleep between event polls, 0 to spin
    pub idle_ms: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { idle_ms: 16 }
    }
}

impl Config {
    /// Load config.toml. Runs before logging exists, so a failure comes back
    /// alongside the defaults for the caller to report.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        Self::load_or_default("config.toml")
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<anyhow::Error>) {
        match Self::load_from_path(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Diagnostics only exist in debug builds, and only when asked for
    pub fn context_config(&self) -> ContextConfig {
        ContextConfig {
            app_name: self.window.title.clone(),
            enable_diagnostics: cfg!(debug_assertions) && self.debug.validation_layers,
            required_extensions: self.context.extra_extensions.iter().cloned().collect(),
            required_layers: self.context.layers.iter().cloned().collect::<BTreeSet<_>>(),
        }
    }

    /// Get log level as a filter
    pub fn log_level(&self) -> Result<LevelFilter> {
        self.debug
            .log_level
            .parse()
            .with_context(|| format!("Unknown log level '{}'", self.debug.log_level))
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.frame.idle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults_and_reports_why() {
        let (config, error) = Config::load_or_default("definitely/not/here.toml");
        let error = error.expect("missing file must be reported");
        assert!(format!("{:#}", error).contains("Failed to read config file"));
        assert_eq!(config.window.width, 800);
        assert_eq!(config.shaders.name, "triangle");
        assert_eq!(config.context.layers, vec![VALIDATION_LAYER.to_string()]);
        assert_eq!(config.idle(), Duration::from_millis(16));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: Config = toml::from_str(
            r#"
            [window]
            title = "Resize me"

            [context]
            extra_extensions = ["VK_KHR_get_physical_device_properties2"]

            [debug]
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Resize me");
        assert_eq!(config.window.height, 600);
        assert_eq!(config.context.layers, vec![VALIDATION_LAYER.to_string()]);
        assert_eq!(config.log_level().unwrap(), LevelFilter::Debug);
        assert!(config.debug.validation_layers);

        let context = config.context_config();
        assert_eq!(context.app_name, "Resize me");
        assert!(context.required_extensions.contains("VK_KHR_get_physical_device_properties2"));
    }

    #[test]
    fn diagnostics_follow_build_and_flag() {
        let mut config = Config::default();
        assert_eq!(config.context_config().enable_diagnostics, cfg!(debug_assertions));

        config.debug.validation_layers = false;
        assert!(!config.context_config().enable_diagnostics);
    }

    #[test]
    fn unknown_log_level_is_an_error() {
        let mut config = Config::default();
        config.debug.log_level = "chatty".to_string();
        let error = config.log_level().unwrap_err();
        assert!(error.to_string().contains("chatty"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("vk-bringup-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[window\nwidth = ").unwrap();

        assert!(Config::load_from_path(&path).is_err());
        let (config, error) = Config::load_or_default(&path);
        assert!(error.is_some());
        assert_eq!(config.window.width, 800);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn valid_file_loads_without_error() {
        let path = std::env::temp_dir().join(format!("vk-bringup-valid-{}.toml", std::process::id()));
        std::fs::write(&path, "[frame]\nidle_ms = 0\n").unwrap();

        let (config, error) = Config::load_or_default(&path);
        assert!(error.is_none());
        assert_eq!(config.idle(), Duration::ZERO);

        std::fs::remove_file(path).ok();
    }
}
