//! Minimal view of the application manifest

use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// The parts of `manifest.json` the builder needs
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifest {
    /// Manifest schema version
    #[serde(default)]
    pub schema_version: String,
    /// Package configuration
    pub acap_package_conf: AcapPackageConf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcapPackageConf {
    pub setup: Setup,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub app_name: String,
}

impl AppManifest {
    /// Load a manifest from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Manifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|e| match e {
            ConfigError::Manifest { reason, .. } => {
                ConfigError::Manifest { path: path.to_path_buf(), reason }
            }
            other => other,
        })
    }

    /// Parse a manifest from its JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let manifest: AppManifest =
            serde_json::from_str(content).map_err(|e| ConfigError::Manifest {
                path: Default::default(),
                reason: e.to_string(),
            })?;

        if manifest.app_name().is_empty() {
            return Err(ConfigError::Manifest {
                path: Default::default(),
                reason: "acapPackageConf.setup.appName is empty".to_string(),
            });
        }

        Ok(manifest)
    }

    /// Application name
    pub fn app_name(&self) -> &str {
        &self.acap_package_conf.setup.app_name
    }
}
