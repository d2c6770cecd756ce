use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "SHADERLAB_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "SHADERLAB_DATA_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "Shaderlab";
const APPLICATION: &str = "shaderlab";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        Self::resolve(env_override(ENV_CONFIG_DIR), env_override(ENV_DATA_DIR), || {
            ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        })
    }

    /// Overrides win; the platform directories are only looked up when one is
    /// missing.
    fn resolve(
        config_override: Option<PathBuf>,
        data_override: Option<PathBuf>,
        project_dirs: impl FnOnce() -> Option<ProjectDirs>,
    ) -> Result<Self> {
        let (config_dir, data_dir) = match (config_override, data_override) {
            (Some(config_dir), Some(data_dir)) => (config_dir, data_dir),
            (config_override, data_override) => {
                let dirs = project_dirs().ok_or_else(|| anyhow!("failed to determine user directories"))?;
                (
                    config_override.unwrap_or_else(|| dirs.config_dir().to_path_buf()),
                    data_override.unwrap_or_else(|| dirs.data_dir().to_path_buf()),
                )
            }
        };
        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.toml")
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.data_dir.join("screenshots")
    }
}

#[cfg(test)]
impl AppPaths {
    pub fn from_raw(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_dir,
            data_dir,
        }
    }
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
