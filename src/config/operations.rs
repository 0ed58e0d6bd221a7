//! Config loading, validation, and utility operations.

use super::model::{CONFIG_FILE_NAME, Config};
use crate::error::{InterlockError, Result};
use std::path::Path;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(InterlockError::ConfigError)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            InterlockError::ConfigError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load the config named on the command line, or `interlock.yaml` in the
    /// working directory if it exists, or the defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(CONFIG_FILE_NAME);
                if default_path.is_file() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml).map_err(|e| {
            InterlockError::ConfigError(format!("failed to parse config YAML: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            InterlockError::ConfigError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `max_resources` and `max_capacity` must be positive
    /// - file names must be non-empty
    pub fn validate(&self) -> Result<()> {
        if self.max_resources == 0 {
            return Err(InterlockError::ConfigError(
                "config validation failed: max_resources must be greater than 0".to_string(),
            ));
        }

        if self.max_capacity == 0 {
            return Err(InterlockError::ConfigError(
                "config validation failed: max_capacity must be greater than 0".to_string(),
            ));
        }

        for (field, value) in [
            ("resources_file", &self.resources_file),
            ("routes_file", &self.routes_file),
            ("log_file", &self.log_file),
        ] {
            if value.trim().is_empty() {
                return Err(InterlockError::ConfigError(format!(
                    "config validation failed: {} must be non-empty",
                    field
                )));
            }
        }

        Ok(())
    }
}
