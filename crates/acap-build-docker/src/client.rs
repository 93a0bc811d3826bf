//! Docker client wrapper

use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use tracing::{debug, info};

use crate::container::ContainerManager;
use crate::error::{DockerError, Result};
use crate::image::ImageManager;
use crate::service::{BuildEventStream, DockerServiceTrait};
use crate::types::{ImageBuildRequest, PruneReport};

/// Docker service configuration
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Socket path (None for the environment / platform default)
    pub socket_path: Option<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self { socket_path: None, timeout: Duration::from_secs(120) }
    }
}

/// High-level Docker service wrapper
pub struct DockerService {
    client: Docker,
}

impl DockerService {
    /// Connect to the engine and negotiate the API version
    pub async fn new(config: DockerConfig) -> Result<Self> {
        let client = match &config.socket_path {
            Some(path) => Docker::connect_with_socket(
                path,
                config.timeout.as_secs(),
                bollard::API_DEFAULT_VERSION,
            ),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(DockerError::Client)?;

        let client = client.negotiate_version().await.map_err(DockerError::Client)?;

        // Test connection
        client.ping().await.map_err(DockerError::Client)?;
        info!("Connected to Docker engine");

        Ok(Self { client })
    }

    /// Get the underlying Docker client
    pub fn client(&self) -> &Docker {
        &self.client
    }
}

#[async_trait]
impl DockerServiceTrait for DockerService {
    async fn build_image(
        &self,
        request: &ImageBuildRequest,
        context: Vec<u8>,
    ) -> Result<BuildEventStream> {
        if request.tag.is_empty() {
            return Err(DockerError::InvalidConfig { reason: "image tag is empty".to_string() });
        }
        Ok(ImageManager::new(&self.client).build(request, context))
    }

    async fn create_container(&self, image: &str) -> Result<String> {
        let id = ContainerManager::new(&self.client).create(image).await?;
        debug!("Created container {} from {}", id, image);
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        ContainerManager::new(&self.client).start(container_id).await
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        ContainerManager::new(&self.client).stop(container_id).await
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        ContainerManager::new(&self.client)
            .remove(container_id, force)
            .await
    }

    async fn copy_from_container(&self, container_id: &str, path: &str) -> Result<Vec<u8>> {
        ContainerManager::new(&self.client)
            .download(container_id, path)
            .await
    }

    async fn prune(&self) -> Result<PruneReport> {
        let (containers_deleted, container_space) =
            ContainerManager::new(&self.client).prune().await?;
        let (images_deleted, networks_deleted, image_space) =
            ImageManager::new(&self.client).prune().await?;

        Ok(PruneReport {
            containers_deleted,
            images_deleted,
            networks_deleted,
            space_reclaimed: container_space + image_space,
        })
    }
}
