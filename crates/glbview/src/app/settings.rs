//! Per-directory viewer settings.
//!
//! Settings are stored as `glbview.toml` next to the model being
//! viewed and capture the backend choice and chunk size so repeat
//! visits skip the probe. Command-line arguments always win over the
//! file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Filename used for per-directory settings.
pub const SETTINGS_FILENAME: &str = "glbview.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Backend override: "auto", "high" or "gl".
    pub backend: Option<String>,
    /// Per-chunk read size in MiB.
    pub chunk_size_mb: Option<usize>,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize TOML: {0}")]
    SerializeToml(#[from] toml::ser::Error),
}

impl Settings {
    /// Load settings from `glbview.toml` in the given directory.
    /// Returns `Ok(None)` if the file doesn't exist.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>, SettingsError> {
        let path = dir.join(SETTINGS_FILENAME);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })?;
        let settings =
            toml::from_str(&contents).map_err(|source| SettingsError::ParseToml { path, source })?;
        Ok(Some(settings))
    }

    /// Save settings to `glbview.toml` in the given directory.
    pub fn save_to_dir(&self, dir: &Path) -> Result<(), SettingsError> {
        let path = dir.join(SETTINGS_FILENAME);
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|source| SettingsError::Io { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load_from_dir(dir.path()).unwrap().is_none());

        let settings = Settings {
            backend: Some("gl".to_string()),
            chunk_size_mb: Some(32),
        };
        settings.save_to_dir(dir.path()).unwrap();

        let loaded = Settings::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.backend.as_deref(), Some("gl"));
        assert_eq!(loaded.chunk_size_mb, Some(32));
    }

    #[test]
    fn malformed_settings_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILENAME), "backend = [").unwrap();
        assert!(matches!(
            Settings::load_from_dir(dir.path()),
            Err(SettingsError::ParseToml { .. })
        ));
    }
}
