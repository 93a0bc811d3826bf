//! Docker-specific error types

use thiserror::Error;

/// Docker-specific error type
#[derive(Error, Debug)]
pub enum DockerError {
    /// Bollard client error
    #[error("Docker client error: {0}")]
    Client(#[from] bollard::errors::Error),

    /// Container not found
    #[error("Container not found: {id}")]
    ContainerNotFound { id: String },

    /// The engine refused the build request
    #[error("Docker build request rejected ({status}): {reason}")]
    BuildRejected { status: u16, reason: String },

    /// Container creation failed
    #[error("Container creation failed for image {image}: {reason}")]
    CreateFailed { image: String, reason: String },

    /// Copy from container failed
    #[error("Copy of {path} from container {id} failed: {reason}")]
    CopyFailed { id: String, path: String, reason: String },

    /// Invalid configuration
    #[error("Invalid Docker configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Stream error
    #[error("Docker stream error: {reason}")]
    StreamError { reason: String },
}

impl DockerError {
    /// Classify an error surfaced while consuming the build response.
    ///
    /// An HTTP error answer means the engine never accepted the build;
    /// anything else broke the stream mid-flight.
    pub fn from_build_stream(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError { status_code, message } => {
                Self::BuildRejected { status: status_code, reason: message }
            }
            other => Self::StreamError { reason: other.to_string() },
        }
    }

    /// Check whether the engine refused the build request
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::BuildRejected { .. })
    }
}

/// Result type alias for Docker operations
pub type Result<T> = std::result::Result<T, DockerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_stream_classification() {
        let rejected = DockerError::from_build_stream(
            bollard::errors::Error::DockerResponseServerError {
                status_code: 400,
                message: "invalid reference format".to_string(),
            },
        );
        assert!(rejected.is_rejection());

        let broken = DockerError::from_build_stream(bollard::errors::Error::JsonDataError {
            message: "unexpected end of input".to_string(),
            column: 12,
        });
        assert!(matches!(broken, DockerError::StreamError { .. }));
        assert!(!broken.is_rejection());
    }
}
