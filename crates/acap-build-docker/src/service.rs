//! Docker service trait

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::types::{BuildEvent, ImageBuildRequest, PruneReport};

/// Streamed build response, one item per decoded engine message
pub type BuildEventStream = Pin<Box<dyn Stream<Item = Result<BuildEvent>> + Send>>;

/// Docker service trait for the operations the build pipeline needs
#[async_trait]
pub trait DockerServiceTrait: Send + Sync {
    /// Submit an image build with the given context archive
    async fn build_image(
        &self,
        request: &ImageBuildRequest,
        context: Vec<u8>,
    ) -> Result<BuildEventStream>;

    /// Create a container from an image, returning its id
    async fn create_container(&self, image: &str) -> Result<String>;

    /// Start a created container
    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Stop a running container
    async fn stop_container(&self, container_id: &str) -> Result<()>;

    /// Remove a container
    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()>;

    /// Copy a path out of a container as a tar archive
    async fn copy_from_container(&self, container_id: &str, path: &str) -> Result<Vec<u8>>;

    /// Remove unused engine resources
    async fn prune(&self) -> Result<PruneReport>;
}
