//! Ephemeral container lifecycle
//!
//! The container exists only long enough to copy the package out of it.
//! Transitions run strictly `Created -> Started -> Stopped -> Removed`;
//! [`ContainerLifecycleManager::teardown`] is the one path that may skip the
//! stop, so a container is removed even when stopping it failed.

use std::fmt;
use std::sync::Arc;

use acap_build_docker::{DockerServiceTrait, PruneReport};
use tracing::{debug, info, warn};

use crate::error::{BuildError, Result};

/// Engine-side container state as tracked by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Started,
    Stopped,
    Removed,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// A container created by this build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedContainer {
    id: String,
    state: ContainerState,
}

impl ManagedContainer {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    fn expect_state(&self, operation: &str, allowed: &[ContainerState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(BuildError::InvalidTransition {
                operation: operation.to_string(),
                container_id: self.id.clone(),
                state: self.state.to_string(),
            })
        }
    }
}

/// Drives container operations against the engine
pub struct ContainerLifecycleManager {
    docker: Arc<dyn DockerServiceTrait>,
}

impl ContainerLifecycleManager {
    pub fn new(docker: Arc<dyn DockerServiceTrait>) -> Self {
        Self { docker }
    }

    /// Create a container from `image`
    pub async fn create(&self, image: &str) -> Result<ManagedContainer> {
        let id = self
            .docker
            .create_container(image)
            .await
            .map_err(|e| BuildError::lifecycle("create", image, e))?;

        info!("Created container {} from {}", short_id(&id), image);
        Ok(ManagedContainer { id, state: ContainerState::Created })
    }

    pub async fn start(&self, container: &mut ManagedContainer) -> Result<()> {
        container.expect_state("start", &[ContainerState::Created])?;
        self.docker
            .start_container(&container.id)
            .await
            .map_err(|e| BuildError::lifecycle("start", &container.id, e))?;

        debug!("Started container {}", short_id(&container.id));
        container.state = ContainerState::Started;
        Ok(())
    }

    pub async fn stop(&self, container: &mut ManagedContainer) -> Result<()> {
        container.expect_state("stop", &[ContainerState::Started])?;
        self.docker
            .stop_container(&container.id)
            .await
            .map_err(|e| BuildError::lifecycle("stop", &container.id, e))?;

        debug!("Stopped container {}", short_id(&container.id));
        container.state = ContainerState::Stopped;
        Ok(())
    }

    /// Remove a container that was never started or has been stopped
    pub async fn remove(&self, container: &mut ManagedContainer) -> Result<()> {
        container.expect_state("remove", &[ContainerState::Created, ContainerState::Stopped])?;
        self.remove_forced(container).await
    }

    async fn remove_forced(&self, container: &mut ManagedContainer) -> Result<()> {
        self.docker
            .remove_container(&container.id, true)
            .await
            .map_err(|e| BuildError::lifecycle("remove", &container.id, e))?;

        debug!("Removed container {}", short_id(&container.id));
        container.state = ContainerState::Removed;
        Ok(())
    }

    /// Stop (if running) and remove, whatever happened before.
    ///
    /// Every failure is returned instead of aborting, and removal is
    /// attempted even when the stop failed.
    pub async fn teardown(&self, container: &mut ManagedContainer) -> Vec<BuildError> {
        let mut errors = Vec::new();

        if container.state == ContainerState::Started {
            if let Err(e) = self.stop(container).await {
                warn!("{}", e);
                errors.push(e);
            }
        }

        if container.state != ContainerState::Removed {
            if let Err(e) = self.remove_forced(container).await {
                warn!("{}", e);
                errors.push(e);
            }
        }

        errors
    }

    /// Remove unused engine resources; callers treat failures as non-fatal
    pub async fn prune(&self) -> Result<PruneReport> {
        let report = self.docker.prune().await?;
        info!(
            "Pruned {} containers, {} images, {} networks ({} bytes reclaimed)",
            report.containers_deleted,
            report.images_deleted,
            report.networks_deleted,
            report.space_reclaimed
        );
        Ok(report)
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
