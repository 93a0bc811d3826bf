//! Configuration error types

use std::path::PathBuf;

use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Unsupported target architecture
    #[error("Architecture invalid: should be either aarch64 or armv7hf, got {arch}")]
    InvalidArchitecture { arch: String },

    /// Manifest could not be read or parsed
    #[error("Failed to load manifest from {path:?}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    /// Project file could not be read or parsed
    #[error("Failed to load project file {path:?}: {reason}")]
    ProjectFile { path: PathBuf, reason: String },

    /// Environment variable referenced in a path is not set
    #[error("Environment variable not found: {name}")]
    MissingEnvVar { name: String },

    /// Configuration values are inconsistent
    #[error("Invalid build configuration: {reason}")]
    Invalid { reason: String },
}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
