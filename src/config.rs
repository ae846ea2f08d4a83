//! Application configuration
//!
//! A small JSON file supplies the identity prefix, the projection tags and
//! the default persistence tier for writes. Every field is optional.
//!
//! ```json
//! {
//!   "prefix_id": "AppX:",
//!   "tags": { "prefix_tag": "CustomCredentials" },
//!   "persistence": "local-machine"
//! }
//! ```

use crate::constants::{APP_DIR_NAME, BUILD_PREFIX_ID, CONFIG_FILE_NAME};
use crate::core::ProjectionOptions;
use crate::models::Persistence;
use crate::utils::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Identity prefix used by `list --configured`
    pub prefix_id: Option<String>,
    pub tags: ProjectionOptions,
    /// Tier for new records when none is given on the command line
    pub persistence: Option<Persistence>,
}

impl AppConfig {
    /// `%APPDATA%\SecretsManager\config.json`, if `APPDATA` is set
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("APPDATA")
            .map(|appdata| PathBuf::from(appdata).join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load the explicitly named file, or the default file when there is one
    ///
    /// A missing explicit file is an error; a missing default file yields
    /// the defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Identity prefix from the file, else the one baked in at build time
    ///
    /// `Ok(None)` only when `optional` and neither is set.
    pub fn resolve_prefix_id(&self, optional: bool) -> Result<Option<String>, ConfigError> {
        resolve_prefix(self.prefix_id.as_deref(), BUILD_PREFIX_ID, optional)
    }

    /// Tier for a write: the explicit choice, else config, else local machine
    pub fn persistence_or_default(&self, explicit: Option<Persistence>) -> Persistence {
        explicit.or(self.persistence).unwrap_or_default()
    }
}

fn resolve_prefix(
    configured: Option<&str>,
    built_in: Option<&str>,
    optional: bool,
) -> Result<Option<String>, ConfigError> {
    match configured.or(built_in) {
        Some(prefix) if prefix.trim().is_empty() => Err(ConfigError::EmptyPrefixId),
        Some(prefix) => Ok(Some(prefix.to_string())),
        None if optional => Ok(None),
        None => Err(ConfigError::MissingPrefixId),
    }
}
