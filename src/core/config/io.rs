use crate::core::config::data::{path_display, Settings};
use directories::ProjectDirs;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

pub const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Errors that can occur when loading, validating or saving settings.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the settings file from disk.
    Read { path: PathBuf, source: std::io::Error },
    /// The settings file is not valid TOML for [`Settings`].
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to write the settings file.
    Write { path: PathBuf, message: String },
    /// No platform configuration directory could be determined.
    NoConfigDir,
    /// A value failed validation.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read settings at {}: {}", path_display(path), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse settings at {}: {}", path_display(path), source)
            }
            ConfigError::Write { path, message } => {
                write!(f, "Failed to save settings at {}: {}", path_display(path), message)
            }
            ConfigError::NoConfigDir => write!(f, "Unable to determine a configuration directory"),
            ConfigError::Invalid(message) => write!(f, "Invalid settings: {message}"),
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl Settings {
    /// Load settings, returning first-install defaults when the file is absent.
    pub fn load_from_path(path: &Path) -> Result<Settings, ConfigError> {
        if !path.exists() {
            debug!(path = %path_display(path), "No settings file, using defaults");
            return Ok(Settings::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Replace the persisted settings wholesale via an atomic rename.
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |message: String| ConfigError::Write {
            path: path.to_path_buf(),
            message,
        };
        let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(|err| write_err(err.to_string()))?;
        }

        let contents = toml::to_string_pretty(self).map_err(|err| write_err(err.to_string()))?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(|err| write_err(err.to_string()))?;

        temp_file
            .write_all(contents.as_bytes())
            .map_err(|err| write_err(err.to_string()))?;
        temp_file
            .as_file_mut()
            .sync_all()
            .map_err(|err| write_err(err.to_string()))?;
        temp_file
            .persist(path)
            .map_err(|err| write_err(err.to_string()))?;
        debug!(path = %path_display(path), "Settings saved");
        Ok(())
    }

    /// Validate, then save.
    pub fn save_validated(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        self.save_to_path(path)
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let proj_dirs =
            ProjectDirs::from("org", "mcp-chat", "mcp-chat-relay").ok_or(ConfigError::NoConfigDir)?;
        Ok(proj_dirs.config_dir().join(SETTINGS_FILE_NAME))
    }

    /// Resolve an explicit path or fall back to the platform default.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        match explicit {
            Some(path) => Ok(path.to_path_buf()),
            None => Self::default_path(),
        }
    }
}
