//! Runtime configuration via `quilt.toml`
//!
//! All settings have defaults; an empty or missing file yields the default
//! runtime. Invalid values are rejected when the file is loaded.

use serde::{Deserialize, Serialize};
use std::path::Path;

use quilt_core::{QuiltError, QuiltResult};

/// Config file name looked up by the assembly layer.
pub const CONFIG_FILE_NAME: &str = "quilt.toml";

fn default_pooling() -> bool {
    true
}

fn default_max_pooled_fragments() -> usize {
    1024
}

/// Runtime configuration loaded from `quilt.toml`.
///
/// # Example
///
/// ```toml
/// pooling = true
/// max_pooled_fragments = 1024
/// eager_resolution = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Share stateless fragments between composites.
    #[serde(default = "default_pooling")]
    pub pooling: bool,
    /// Upper bound on pooled fragment instances; beyond it stateless
    /// fragments are created per composite.
    #[serde(default = "default_max_pooled_fragments")]
    pub max_pooled_fragments: usize,
    /// Resolve every registered contract when the dispatcher is created.
    #[serde(default)]
    pub eager_resolution: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pooling: default_pooling(),
            max_pooled_fragments: default_max_pooled_fragments(),
            eager_resolution: false,
        }
    }
}

impl RuntimeConfig {
    /// Check that the settings are usable.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if pooling is enabled with a zero pool size.
    pub fn validate(&self) -> QuiltResult<()> {
        if self.pooling && self.max_pooled_fragments == 0 {
            return Err(QuiltError::InvalidConfig(
                "max_pooled_fragments must be greater than 0 when pooling is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Quilt runtime configuration
#
# Share stateless fragment instances between composites (default: true)
pooling = true

# Maximum number of pooled fragment instances (default: 1024).
# Stateless fragments beyond this bound are created per composite.
max_pooled_fragments = 1024

# Resolve every registered capability contract at startup so that
# graph and declaration errors surface immediately (default: false).
eager_resolution = false
"#
    }

    /// Parse and validate config from TOML text.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the text cannot be parsed or fails validation.
    pub fn from_toml_str(content: &str) -> QuiltResult<Self> {
        let config: RuntimeConfig = toml::from_str(content)
            .map_err(|e| QuiltError::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> QuiltResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            QuiltError::InvalidConfig(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            QuiltError::InvalidConfig(message) => {
                QuiltError::InvalidConfig(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> QuiltResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                QuiltError::InvalidConfig(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> QuiltResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| QuiltError::InvalidConfig(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            QuiltError::InvalidConfig(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
