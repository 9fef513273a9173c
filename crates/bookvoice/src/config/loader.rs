use std::path::{Path, PathBuf};

use crate::config::schema::Settings;
use crate::error::ConfigError;

pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// `<config dir>/bookvoice`.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("bookvoice"))
        .unwrap_or_else(|| PathBuf::from(".bookvoice"))
}

pub fn default_settings_path() -> PathBuf {
    default_config_dir().join(SETTINGS_FILE_NAME)
}

/// Loads settings from `path`, falling back to defaults when the file does
/// not exist yet.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Settings::default());
        }
        Err(e) => {
            return Err(ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = serde_json::from_str(content)?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Writes `settings` as pretty JSON, creating parent directories.
pub fn save_settings<P: AsRef<Path>>(path: P, settings: &Settings) -> Result<(), ConfigError> {
    let path = path.as_ref();
    validate_settings(settings)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).map_err(|e| ConfigError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    log::info!("Saved settings to {}", path.display());
    Ok(())
}

/// Points the voice sample store at `dir` and persists the change.
pub fn set_voice_samples_dir<P: AsRef<Path>>(
    path: P,
    dir: impl Into<PathBuf>,
) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let mut settings = load_settings(path)?;
    settings.voice_samples_dir = dir.into();
    save_settings(path, &settings)?;
    Ok(settings)
}

pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.synthesis.max_chunk_chars == 0 {
        return Err(ConfigError::Validation {
            message: "synthesis.maxChunkChars must be greater than 0".to_string(),
        });
    }

    for (name, value) in [
        ("synthesis.exaggeration", settings.synthesis.exaggeration),
        ("synthesis.cfgWeight", settings.synthesis.cfg_weight),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Validation {
                message: format!("{} must be within [0, 1], got {}", name, value),
            });
        }
    }

    if settings.voice_samples_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "voiceSamplesDir must not be empty".to_string(),
        });
    }

    if settings.alignment.language.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "alignment.language must not be empty".to_string(),
        });
    }

    Ok(())
}
