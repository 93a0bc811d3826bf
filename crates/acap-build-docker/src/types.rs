//! Docker-related types and structures

use std::collections::HashMap;

use bollard::models::BuildInfo;
use serde::{Deserialize, Serialize};

/// Image build request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageBuildRequest {
    /// Image tag
    pub tag: String,
    /// Recipe file name inside the build context
    pub dockerfile: String,
    /// Build arguments
    pub build_args: HashMap<String, String>,
    /// Remove intermediate containers after a successful build
    pub remove_intermediate: bool,
}

impl ImageBuildRequest {
    /// Create a request for the given tag using the default recipe name
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            dockerfile: "Dockerfile".to_string(),
            build_args: HashMap::new(),
            remove_intermediate: true,
        }
    }

    /// Set build arguments
    pub fn with_build_args(mut self, build_args: HashMap<String, String>) -> Self {
        self.build_args = build_args;
        self
    }
}

/// One decoded unit of the engine's build response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEvent {
    /// Log text emitted by the build
    pub stream: Option<String>,
    /// Error reported by the engine itself
    pub error: Option<String>,
    /// Status line (pull progress and similar)
    pub status: Option<String>,
}

impl BuildEvent {
    /// Event carrying a line of log text
    pub fn log(text: impl Into<String>) -> Self {
        Self { stream: Some(text.into()), ..Default::default() }
    }

    /// Event carrying an engine error
    pub fn engine_error(text: impl Into<String>) -> Self {
        Self { error: Some(text.into()), ..Default::default() }
    }

    /// The log text, if any
    pub fn message(&self) -> Option<&str> {
        self.stream.as_deref()
    }
}

impl From<BuildInfo> for BuildEvent {
    fn from(info: BuildInfo) -> Self {
        let error = info
            .error
            .or_else(|| info.error_detail.and_then(|detail| detail.message));
        Self { stream: info.stream, error, status: info.status }
    }
}

/// Resources removed by a prune
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    /// Stopped containers removed
    pub containers_deleted: usize,
    /// Dangling images removed
    pub images_deleted: usize,
    /// Unused networks removed
    pub networks_deleted: usize,
    /// Bytes reclaimed
    pub space_reclaimed: i64,
}

#[cfg(test)]
mod tests {
    use bollard::models::ErrorDetail;

    use super::*;

    #[test]
    fn test_event_from_build_info() {
        let info = BuildInfo { stream: Some("Step 1/4 : FROM ubuntu\n".to_string()), ..Default::default() };
        let event = BuildEvent::from(info);
        assert_eq!(event.message(), Some("Step 1/4 : FROM ubuntu\n"));
        assert_eq!(event.error, None);

        let info = BuildInfo {
            error_detail: Some(ErrorDetail {
                code: Some(1),
                message: Some("returned a non-zero code: 2".to_string()),
            }),
            ..Default::default()
        };
        let event = BuildEvent::from(info);
        assert_eq!(event.message(), None);
        assert_eq!(event.error.as_deref(), Some("returned a non-zero code: 2"));
    }

    #[test]
    fn test_build_request_defaults() {
        let request = ImageBuildRequest::new("acap:aarch64")
            .with_build_args(HashMap::from([("ARCH".to_string(), "aarch64".to_string())]));
        assert_eq!(request.dockerfile, "Dockerfile");
        assert!(request.remove_intermediate);
        assert_eq!(request.build_args["ARCH"], "aarch64");
    }
}
