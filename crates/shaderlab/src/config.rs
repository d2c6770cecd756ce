use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use renderer::{EngineConfig, GpuPowerPreference, VsyncMode};
use serde::Deserialize;

use crate::cli::parse_surface_size;

/// Contents of `settings.toml`. Every field is optional; CLI flags win.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Drawing buffer size as `WIDTHxHEIGHT`.
    pub size: Option<String>,
    pub power: Option<GpuPowerPreference>,
    pub vsync: Option<VsyncMode>,
    pub start_paused: bool,
    pub screenshot_dir: Option<PathBuf>,
}

impl Settings {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let settings: Self = toml::from_str(contents).context("failed to parse settings")?;
        if let Some(size) = settings.size.as_deref() {
            parse_surface_size(size)
                .map_err(|err| anyhow::anyhow!("invalid size '{size}' in settings: {err}"))?;
        }
        Ok(settings)
    }

    /// Reads `path`, or returns defaults when `required` is false and the
    /// file does not exist.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if !required && !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file; using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file at {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("invalid settings file at {}", path.display()))
    }

    /// Engine configuration from these settings before CLI overrides.
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            surface_size: self
                .size
                .as_deref()
                .and_then(|size| parse_surface_size(size).ok())
                .unwrap_or(defaults.surface_size),
            power: self.power.unwrap_or(defaults.power),
            vsync: self.vsync.unwrap_or(defaults.vsync),
            start_paused: self.start_paused,
        }
    }
}
