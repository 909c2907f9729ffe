//! Configuration loader with environment variable expansion

use super::{expand_env_vars, ConfigError, TracingConfig};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a tracing configuration from a YAML file.
    ///
    /// Environment variables are expanded over the raw file content before
    /// parsing, so `${VAR}` works anywhere in the document, and the parsed
    /// configuration is validated before it is returned.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<TracingConfig, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&content);
        let config: TracingConfig = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }
}
