//! Error types for the build pipeline

use thiserror::Error;

/// Build pipeline error types
#[derive(Error, Debug)]
pub enum BuildError {
    /// Walking or reading the source tree or the recipe override failed
    #[error("Failed to assemble build context: {reason}")]
    ContextAssembly { reason: String },

    /// The engine refused the build request
    #[error("Build submission rejected: {reason}")]
    BuildSubmission { reason: String },

    /// The build response stream broke mid-flight
    #[error("Failed to decode build response: {reason}")]
    StreamDecode { reason: String },

    /// The build log matched the failure heuristic
    #[error("Error detected during build process ({} messages)", messages.len())]
    BuildFailure { messages: Vec<String> },

    /// A container lifecycle operation failed
    #[error("Container {operation} failed for {container_id}: {reason}")]
    Lifecycle { operation: String, container_id: String, reason: String },

    /// Container operation attempted from the wrong state
    #[error("Cannot {operation} container {container_id} in state {state}")]
    InvalidTransition { operation: String, container_id: String, state: String },

    /// Copying or writing artifacts failed
    #[error("Failed to extract artifacts: {reason}")]
    Extraction { reason: String },

    /// The extraction completed but produced no regular file
    #[error("No artifact produced: no file found in the archive of {path}")]
    NoArtifact { path: String },

    /// Build was cancelled by the caller
    #[error("Build was cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] acap_build_config::ConfigError),

    /// Docker error
    #[error("Docker error: {0}")]
    Docker(#[from] acap_build_docker::DockerError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for build operations
pub type Result<T> = std::result::Result<T, BuildError>;

impl BuildError {
    /// Create a context assembly error
    pub fn context(reason: impl Into<String>) -> Self {
        Self::ContextAssembly { reason: reason.into() }
    }

    /// Create an extraction error
    pub fn extraction(reason: impl Into<String>) -> Self {
        Self::Extraction { reason: reason.into() }
    }

    /// Create a lifecycle error
    pub fn lifecycle(
        operation: impl Into<String>,
        container_id: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Lifecycle {
            operation: operation.into(),
            container_id: container_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Messages accumulated by a failed build, empty for other errors
    pub fn build_messages(&self) -> &[String] {
        match self {
            Self::BuildFailure { messages } => messages,
            _ => &[],
        }
    }

    /// Check if an error indicates cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
