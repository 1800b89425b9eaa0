//! Settings file for ~/.config/phpmon/settings.toml

use std::io::Write;
use std::path::Path;

use fs2::FileExt;
use phpmon_core::prelude::*;

use super::types::Settings;

const SETTINGS_FILENAME: &str = "settings.toml";

/// Load settings from `path`
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        debug!("No settings file at {:?}, using defaults", path);
        return Settings::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            Settings::default()
        }
    }
}

/// Save settings to `path`
///
/// Writes a temp file next to it under an exclusive lock, then renames it
/// into place.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::config(format!("No parent directory for {:?}", path)))?;
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::config(format!("Failed to create {:?}: {}", dir, e)))?;
    }

    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::config(format!("Failed to serialize settings: {}", e)))?;
    let temp_path = dir.join(format!(".{}.tmp", SETTINGS_FILENAME));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| Error::config(format!("Failed to open temp file: {}", e)))?;
    file.lock_exclusive()
        .map_err(|e| Error::config(format!("Failed to lock temp file: {}", e)))?;
    file.write_all(content.as_bytes())
        .map_err(|e| Error::config(format!("Failed to write temp file: {}", e)))?;
    file.flush()
        .map_err(|e| Error::config(format!("Failed to flush temp file: {}", e)))?;

    std::fs::rename(&temp_path, path)
        .map_err(|e| Error::config(format!("Failed to rename temp file: {}", e)))?;
    drop(file);

    info!("Saved settings to {:?}", path);
    Ok(())
}
