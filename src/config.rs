use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::OpenRefError;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Client configuration for resolution and the query transport.
///
/// `server_url` forces remote mode. `disable_worker` opts out of the shared
/// worker for environments where it cannot load (e.g. cross-origin
/// embedding), falling back to in-process execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: Option<String>,
    pub disable_worker: bool,
    /// Base directory for resolving file references.
    pub base_dir: Option<PathBuf>,
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_url: None,
            disable_worker: false,
            base_dir: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<ClientConfig, OpenRefError> {
        let path = path.as_ref();
        tracing::debug!("Reading client config from {:?}", path);
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults");
            return Ok(ClientConfig::default());
        }
        let content = read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), OpenRefError> {
        let path = path.as_ref();
        tracing::debug!("Writing client config to {:?}", path);
        let toml_string = toml::to_string(self)?;
        write(path, toml_string)?;
        Ok(())
    }
}
