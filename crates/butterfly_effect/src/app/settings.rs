use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use engine::LoopConfig;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

pub(crate) const SETTINGS_FILE_NAME: &str = "settings.json";

/// Optional overrides read from `settings.json` at the project root. Every
/// field is optional; absent fields keep the [`LoopConfig`] default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Settings {
    pub(crate) window_title: Option<String>,
    pub(crate) window_width: Option<u32>,
    pub(crate) window_height: Option<u32>,
    pub(crate) target_tps: Option<u32>,
    pub(crate) max_render_fps: Option<u32>,
}

#[derive(Debug, Error)]
pub(crate) enum SettingsError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {} at {field}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {field} in {}: {message}", .path.display())]
    Invalid {
        path: PathBuf,
        field: &'static str,
        message: &'static str,
    },
}

impl Settings {
    pub(crate) fn apply_to(self, mut config: LoopConfig) -> LoopConfig {
        if let Some(title) = self.window_title {
            config.window_title = title;
        }
        if let Some(width) = self.window_width {
            config.window_width = width;
        }
        if let Some(height) = self.window_height {
            config.window_height = height;
        }
        if let Some(target_tps) = self.target_tps {
            config.target_tps = target_tps;
        }
        if self.max_render_fps.is_some() {
            config.max_render_fps = self.max_render_fps;
        }
        config
    }

    fn validate(&self, path: &Path) -> Result<(), SettingsError> {
        let invalid = |field, message| SettingsError::Invalid {
            path: path.to_path_buf(),
            field,
            message,
        };

        if self.window_width == Some(0) {
            return Err(invalid("window_width", "must be greater than zero"));
        }
        if self.window_height == Some(0) {
            return Err(invalid("window_height", "must be greater than zero"));
        }
        if self.target_tps == Some(0) {
            return Err(invalid("target_tps", "must be greater than zero"));
        }
        if self.max_render_fps == Some(0) {
            return Err(invalid(
                "max_render_fps",
                "must be greater than zero; omit it to leave rendering uncapped",
            ));
        }
        if matches!(&self.window_title, Some(title) if title.trim().is_empty()) {
            return Err(invalid("window_title", "must not be blank"));
        }
        Ok(())
    }
}

/// Loads `settings.json` from `root`. A missing file yields the defaults.
pub(crate) fn load_settings(root: &Path) -> Result<Settings, SettingsError> {
    let path = root.join(SETTINGS_FILE_NAME);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(source) if source.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "settings_not_found_using_defaults");
            return Ok(Settings::default());
        }
        Err(source) => return Err(SettingsError::Read { path, source }),
    };

    let settings = parse_settings_json(&path, &raw)?;
    settings.validate(&path)?;
    info!(path = %path.display(), "settings_loaded");
    Ok(settings)
}

fn parse_settings_json(path: &Path, raw: &str) -> Result<Settings, SettingsError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, Settings>(&mut deserializer).map_err(|error| {
        let field = error.path().to_string();
        SettingsError::Parse {
            path: path.to_path_buf(),
            field,
            source: error.into_inner(),
        }
    })
}
