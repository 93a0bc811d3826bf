//! Docker image management

use bollard::image::{BuildImageOptions, PruneImagesOptions};
use bollard::network::PruneNetworksOptions;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info};

use crate::error::{DockerError, Result};
use crate::service::BuildEventStream;
use crate::types::{BuildEvent, ImageBuildRequest};

/// Decoded build events buffered ahead of the consumer
const BUILD_EVENT_BUFFER: usize = 64;

/// Docker image manager
pub struct ImageManager<'a> {
    client: &'a bollard::Docker,
}

impl<'a> ImageManager<'a> {
    /// Create a new image manager
    pub fn new(client: &'a bollard::Docker) -> Self {
        Self { client }
    }

    /// Submit a build and return the decoded event stream.
    ///
    /// The engine response is drained by a task owning its own client handle,
    /// so the returned stream outlives this manager. Dropping the stream stops
    /// the task at the next event.
    pub fn build(&self, request: &ImageBuildRequest, context: Vec<u8>) -> BuildEventStream {
        info!("Building Docker image: {} ({} bytes of context)", request.tag, context.len());

        let options = BuildImageOptions {
            t: request.tag.clone(),
            dockerfile: request.dockerfile.clone(),
            buildargs: request.build_args.clone(),
            rm: request.remove_intermediate,
            ..Default::default()
        };

        let client = self.client.clone();
        let (mut sender, receiver) = mpsc::channel(BUILD_EVENT_BUFFER);

        tokio::spawn(async move {
            let mut response = Box::pin(client.build_image(options, None, Some(context.into())));
            while let Some(item) = response.next().await {
                let event = item.map(BuildEvent::from).map_err(DockerError::from_build_stream);
                if sender.send(event).await.is_err() {
                    debug!("Build event consumer went away, dropping the response");
                    break;
                }
            }
        });

        Box::pin(receiver)
    }

    /// Remove dangling images and unused networks
    pub async fn prune(&self) -> Result<(usize, usize, i64)> {
        let images = self
            .client
            .prune_images(None::<PruneImagesOptions<String>>)
            .await
            .map_err(DockerError::Client)?;

        let networks = self
            .client
            .prune_networks(None::<PruneNetworksOptions<String>>)
            .await
            .map_err(DockerError::Client)?;

        let images_deleted = images.images_deleted.map(|v| v.len()).unwrap_or(0);
        let networks_deleted = networks.networks_deleted.map(|v| v.len()).unwrap_or(0);
        debug!("Pruned {} images and {} networks", images_deleted, networks_deleted);

        Ok((images_deleted, networks_deleted, images.space_reclaimed.unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bollard::API_DEFAULT_VERSION;

    use super::*;

    #[tokio::test]
    async fn test_build_stream_outlives_manager() {
        // nothing listens on port 1, so the request fails once polled
        let client = bollard::Docker::connect_with_http("http://127.0.0.1:1", 5, API_DEFAULT_VERSION)
            .unwrap();
        let request = ImageBuildRequest {
            tag: "axis-acap-aarch64".to_string(),
            dockerfile: "Dockerfile".to_string(),
            build_args: HashMap::new(),
            remove_intermediate: true,
        };

        let mut events = ImageManager::new(&client).build(&request, Vec::new());
        drop(client);

        let first = events.next().await.expect("the failure is delivered as an event");
        assert!(matches!(first, Err(DockerError::StreamError { .. })));
        assert!(events.next().await.is_none());
    }
}
