//! Container engine integration for the ACAP builder
//!
//! This crate wraps the Docker API behind [`DockerServiceTrait`]: image
//! builds with a streamed response, the container lifecycle, copying
//! files out of a container and pruning.

pub mod client;
pub mod container;
pub mod error;
pub mod image;
pub mod service;
pub mod types;

pub use client::{DockerConfig, DockerService};
pub use error::{DockerError, Result};
pub use service::{BuildEventStream, DockerServiceTrait};
pub use types::{BuildEvent, ImageBuildRequest, PruneReport};
