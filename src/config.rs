/// Persistent application settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::frames::{DEFAULT_FRAME_INTERVAL_S, DEFAULT_MAX_FRAMES};
use crate::export::spreadsheet::DEFAULT_START_ROW;

const APP_DIR: &str = "vaso_gui";
const CONFIG_FILE: &str = "config.json";
const LAST_SESSION_FILE: &str = "last_session.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Seconds between acquired frames
    pub frame_interval_s: f64,
    /// Cap on decoded TIFF pages
    pub max_frames: usize,
    /// Right-click radius for removing pins
    pub pin_tolerance_px: f64,
    /// Write eventDiameters_output.csv next to the trace after each change
    pub auto_export: bool,
    pub excel_start_row: u32,
    pub last_session_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            frame_interval_s: DEFAULT_FRAME_INTERVAL_S,
            max_frames: DEFAULT_MAX_FRAMES,
            pin_tolerance_px: 10.0,
            auto_export: true,
            excel_start_row: DEFAULT_START_ROW,
            last_session_path: None,
        }
    }
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Where the automatic last-session snapshot goes.
    pub fn last_session_file() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(APP_DIR).join(LAST_SESSION_FILE))
    }

    /// Load from the platform config dir, falling back to defaults.
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                log::warn!("Cannot read config {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match serde_json::from_str::<Self>(&text) {
            Ok(config) => config.sanitized(),
            Err(e) => {
                log::warn!("Ignoring corrupt config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        match Self::default_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        crate::session::snapshot::write_atomic(path, json.as_bytes())
    }

    /// Replace out-of-range values with defaults.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.frame_interval_s.is_finite() && self.frame_interval_s > 0.0) {
            self.frame_interval_s = defaults.frame_interval_s;
        }
        if !(self.pin_tolerance_px.is_finite() && self.pin_tolerance_px > 0.0) {
            self.pin_tolerance_px = defaults.pin_tolerance_px;
        }
        if self.excel_start_row == 0 {
            self.excel_start_row = defaults.excel_start_row;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("nope.json"));
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.frame_interval_s, 0.14);
        assert_eq!(config.excel_start_row, 3);
    }

    #[test]
    fn partial_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        std::fs::write(&path, r#"{"auto_export": false, "frame_interval_s": -1}"#).unwrap();
        let config = AppConfig::load_from(&path);
        assert!(!config.auto_export);
        assert_eq!(config.frame_interval_s, DEFAULT_FRAME_INTERVAL_S);
        assert_eq!(config.max_frames, DEFAULT_MAX_FRAMES);

        std::fs::write(&path, "{{{").unwrap();
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AppConfig {
            max_frames: 50,
            last_session_path: Some(PathBuf::from("/tmp/s.json")),
            ..AppConfig::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path), config);
    }
}
