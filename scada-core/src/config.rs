//! Common utilities for configuration files: every config struct in this
//! workspace implements [`Config`] to get `load`/`save` via `serde_yaml`
//! plus a `validate` hook.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Error returned from saving or loading config objects.
#[derive(Debug)]
pub enum ConfigError {
    /// Configuration is invalid, with a list of validation errors.
    ConfigInvalid(Vec<String>),
    /// Reading or writing the file failed.
    Io(std::io::Error),
    /// Failed to serialize or deserialize the config object.
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ConfigInvalid(errs) => write!(f, "invalid config: {}", errs.join("; ")),
            ConfigError::Io(e) => write!(f, "I/O error: {e}"),
            ConfigError::Yaml(e) => write!(f, "YAML error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

/// A trait that handles loading, saving, and validating configuration
/// structs.
pub trait Config: serde::Serialize {
    /// Save the configuration object to a file.
    fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Err(e) = self.validate() {
            return Err(ConfigError::ConfigInvalid(e));
        }
        let s = serde_yaml::to_string(&self)?;
        let mut f = File::create(path)?;
        f.write_all(s.as_bytes())?;
        Ok(())
    }

    /// Load the configuration object from the given path.
    fn load<A>(path: &Path) -> Result<A, ConfigError>
    where
        for<'de> A: Config + serde::Deserialize<'de>,
    {
        let mut f = File::open(path)?;
        let mut s = String::new();
        f.read_to_string(&mut s)?;
        let parsed: A = serde_yaml::from_str(&s)?;
        if let Err(e) = parsed.validate() {
            return Err(ConfigError::ConfigInvalid(e));
        }
        Ok(parsed)
    }

    /// Validate the config struct, returning a list of validation errors if
    /// it fails.
    fn validate(&self) -> Result<(), Vec<String>>;
}
