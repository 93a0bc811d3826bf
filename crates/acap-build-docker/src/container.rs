//! Container management

use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, PruneContainersOptions,
    RemoveContainerOptions, StopContainerOptions,
};
use futures::StreamExt;
use tracing::debug;

use crate::error::{DockerError, Result};

/// Seconds the engine waits before killing a container on stop
const STOP_TIMEOUT_SECS: i64 = 10;

/// Container manager for executing operations
pub struct ContainerManager<'a> {
    client: &'a bollard::Docker,
}

impl<'a> ContainerManager<'a> {
    /// Create a new container manager
    pub fn new(client: &'a bollard::Docker) -> Self {
        Self { client }
    }

    /// Create a container from an image
    pub async fn create(&self, image: &str) -> Result<String> {
        let config = Config { image: Some(image.to_string()), ..Default::default() };

        let container = self
            .client
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| DockerError::CreateFailed {
                image: image.to_string(),
                reason: e.to_string(),
            })?;

        for warning in &container.warnings {
            debug!("Create warning for {}: {}", image, warning);
        }

        Ok(container.id)
    }

    /// Start a created container
    pub async fn start(&self, container_id: &str) -> Result<()> {
        self.client
            .start_container::<String>(container_id, None)
            .await
            .map_err(|e| not_found_or(container_id, e))
    }

    /// Stop a container
    pub async fn stop(&self, container_id: &str) -> Result<()> {
        let options = StopContainerOptions { t: STOP_TIMEOUT_SECS };

        match self.client.stop_container(container_id, Some(options)).await {
            Ok(()) => Ok(()),
            // 304: the container already exited on its own
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 304, .. }) => {
                debug!("Container {} was not running", container_id);
                Ok(())
            }
            Err(e) => Err(not_found_or(container_id, e)),
        }
    }

    /// Remove container
    pub async fn remove(&self, container_id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions { force, ..Default::default() };

        self.client
            .remove_container(container_id, Some(options))
            .await
            .map_err(|e| not_found_or(container_id, e))
    }

    /// Download a path from the container as a tar archive
    pub async fn download(&self, container_id: &str, path: &str) -> Result<Vec<u8>> {
        let options = DownloadFromContainerOptions { path };

        let stream = self
            .client
            .download_from_container(container_id, Some(options));

        let mut bytes = Vec::new();
        futures::pin_mut!(stream);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DockerError::CopyFailed {
                id: container_id.to_string(),
                path: path.to_string(),
                reason: e.to_string(),
            })?;
            bytes.extend_from_slice(&chunk);
        }

        Ok(bytes)
    }

    /// Remove stopped containers
    pub async fn prune(&self) -> Result<(usize, i64)> {
        let response = self
            .client
            .prune_containers(None::<PruneContainersOptions<String>>)
            .await
            .map_err(DockerError::Client)?;

        Ok((
            response.containers_deleted.map(|v| v.len()).unwrap_or(0),
            response.space_reclaimed.unwrap_or(0),
        ))
    }
}

fn not_found_or(container_id: &str, err: bollard::errors::Error) -> DockerError {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
            DockerError::ContainerNotFound { id: container_id.to_string() }
        }
        other => DockerError::Client(other),
    }
}
