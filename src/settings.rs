// Player settings management and persistence
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Persisted player settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSettings {
    pub version: i32, // Settings schema version for future migrations
    /// Normalized playback volume, 0.0..=1.0
    pub volume: f32,
    /// Root of the mood catalog, if one has been chosen
    pub music_dir: Option<PathBuf>,
    /// Position update cadence in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            version: 1,
            volume: 0.7,
            music_dir: None,
            poll_interval_ms: 100,
        }
    }
}

impl PlayerSettings {
    /// Get the settings file path
    pub fn settings_path(dir: &Path) -> PathBuf {
        dir.join("settings.json")
    }

    /// Load settings from file, or return defaults if the file doesn't exist
    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::settings_path(dir);

        if !path.exists() {
            debug!("no settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;

        let mut settings: PlayerSettings = serde_json::from_str(&content)
            .map_err(|e| Error::Settings(format!("failed to parse settings: {}", e)))?;

        // Sanitize values that may have been edited by hand
        settings.volume = settings.volume.clamp(0.0, 1.0);
        settings.poll_interval_ms = settings.poll_interval_ms.max(10);

        info!("loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let path = Self::settings_path(dir);
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Settings(format!("failed to serialize settings: {}", e)))?;

        fs::write(&path, content)?;

        info!("saved settings to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PlayerSettings::default();
        assert_eq!(settings.version, 1);
        assert!((settings.volume - 0.7).abs() < f32::EPSILON);
        assert!(settings.music_dir.is_none());
        assert_eq!(settings.poll_interval_ms, 100);
    }

    #[test]
    fn test_load_missing_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = PlayerSettings::load(dir.path()).unwrap();
        assert_eq!(settings.poll_interval_ms, 100);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        let mut settings = PlayerSettings::default();
        settings.volume = 0.25;
        settings.music_dir = Some(PathBuf::from("/music"));
        settings.poll_interval_ms = 250;
        settings.save(dir.path()).unwrap();

        let loaded = PlayerSettings::load(dir.path()).unwrap();
        assert!((loaded.volume - 0.25).abs() < f32::EPSILON);
        assert_eq!(loaded.music_dir, Some(PathBuf::from("/music")));
        assert_eq!(loaded.poll_interval_ms, 250);
    }

    #[test]
    fn test_load_sanitizes_edited_values() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            PlayerSettings::settings_path(dir.path()),
            r#"{"version":1,"volume":3.5,"music_dir":null,"poll_interval_ms":1}"#,
        )
        .unwrap();

        let loaded = PlayerSettings::load(dir.path()).unwrap();
        assert!((loaded.volume - 1.0).abs() < f32::EPSILON);
        assert_eq!(loaded.poll_interval_ms, 10);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(PlayerSettings::settings_path(dir.path()), "{not json").unwrap();

        assert!(matches!(
            PlayerSettings::load(dir.path()),
            Err(Error::Settings(_))
        ));
    }
}
