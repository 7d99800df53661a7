//! Configuration management.
//!
//! User settings are stored as JSON in the platform config directory:
//! - Linux: `~/.config/pacerec/config.json`
//! - macOS: `~/Library/Application Support/pacerec/config.json`
//! - Windows: `%APPDATA%\pacerec\config.json`

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default recording rate, frames per second.
pub const DEFAULT_FPS: u32 = 20;

fn default_fps() -> u32 {
    DEFAULT_FPS
}

/// Recorder configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Target frame rate
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Output directory override; the user's Videos directory when unset
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            output_dir: None,
        }
    }
}

impl Config {
    /// Load the configuration, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path; defaults on any failure.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("config file at {} is invalid ({}), using defaults", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Persist the configuration. Returns the path written.
    pub fn save(&self) -> Result<PathBuf, String> {
        let path = config_path().ok_or("could not determine config directory")?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Persist to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create config directory: {}", e))?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize config: {}", e))?;
        fs::write(path, contents).map_err(|e| format!("failed to write config: {}", e))
    }
}

/// Path of the config file in the platform config directory.
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "pacerec").map(|dirs| dirs.config_dir().join("config.json"))
}

/// Check that a directory is usable as an output target: it must exist
/// (or be creatable) and be a directory.
pub fn validate_directory(path: &Path) -> Result<(), String> {
    if path.exists() {
        if path.is_dir() {
            Ok(())
        } else {
            Err(format!("{} is not a directory", path.display()))
        }
    } else {
        fs::create_dir_all(path)
            .map_err(|e| format!("cannot create {}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("pacerec-test-{}-{}", std::process::id(), name))
            .join("config.json")
    }

    #[test]
    fn test_default_fps_matches_constant() {
        let config = Config::default();
        assert_eq!(config.fps, 20);
        assert!(config.output_dir.is_none());
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/pacerec/config.json"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_invalid_json_uses_defaults() {
        let path = temp_config_path("invalid");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();

        let config = Config::load_from(&path);

        assert_eq!(config, Config::default());
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = temp_config_path("roundtrip");
        let config = Config {
            fps: 30,
            output_dir: Some(PathBuf::from("/tmp/recordings")),
        };

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path);

        assert_eq!(loaded, config);
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let path = temp_config_path("partial");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{}").unwrap();

        let config = Config::load_from(&path);

        assert_eq!(config.fps, DEFAULT_FPS);
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_validate_directory_rejects_file() {
        let path = temp_config_path("validate");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "x").unwrap();

        assert!(validate_directory(&path).is_err());
        assert!(validate_directory(path.parent().unwrap()).is_ok());
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
