//! Artifact extraction from the build container

use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use acap_build_docker::DockerServiceTrait;
use serde::Serialize;
use tar::Archive;
use tracing::{debug, info};

use crate::error::{BuildError, Result};

/// One file written to the output directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedArtifact {
    /// Path relative to the output directory, `/`-separated
    pub name: String,
    /// Local path
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

/// Files produced by one extraction; never empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedArtifactSet {
    pub output_dir: PathBuf,
    pub artifacts: Vec<ExtractedArtifact>,
}

impl ExtractedArtifactSet {
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractedArtifact> {
        self.artifacts.iter()
    }

    pub fn paths(&self) -> Vec<&Path> {
        self.artifacts.iter().map(|a| a.path.as_path()).collect()
    }

    /// Human-readable listing
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} artifact(s) in {}:",
            self.artifacts.len(),
            self.output_dir.display()
        );
        for artifact in &self.artifacts {
            summary.push_str(&format!("\n  {} ({} bytes)", artifact.name, artifact.size));
        }
        summary
    }
}

/// Copies a directory out of a container onto the host
pub struct ArtifactExtractor {
    docker: Arc<dyn DockerServiceTrait>,
}

impl ArtifactExtractor {
    pub fn new(docker: Arc<dyn DockerServiceTrait>) -> Self {
        Self { docker }
    }

    /// Copy `container_path` out of the container into `local_dir`
    pub async fn extract(
        &self,
        container_id: &str,
        container_path: &str,
        local_dir: &Path,
    ) -> Result<ExtractedArtifactSet> {
        prepare_output_dir(local_dir)?;

        info!("Copying {} out of the build container", container_path);
        let data = self
            .docker
            .copy_from_container(container_id, container_path)
            .await
            .map_err(|e| BuildError::extraction(format!("Failed to copy {container_path}: {e}")))?;

        unpack_artifacts(&data, local_dir, container_path)
    }
}

fn prepare_output_dir(local_dir: &Path) -> Result<()> {
    if local_dir.exists() && !local_dir.is_dir() {
        return Err(BuildError::extraction(format!(
            "{} exists and is not a directory",
            local_dir.display()
        )));
    }
    fs::create_dir_all(local_dir).map_err(|e| {
        BuildError::extraction(format!("Failed to create {}: {e}", local_dir.display()))
    })
}

/// Write every regular file of a copy-from-container archive under `local_dir`.
///
/// The archive's top-level component is the copied directory itself and is
/// dropped. Directory and special entries are skipped.
pub fn unpack_artifacts(data: &[u8], local_dir: &Path, source: &str) -> Result<ExtractedArtifactSet> {
    prepare_output_dir(local_dir)?;

    let mut archive = Archive::new(Cursor::new(data));
    let entries = archive
        .entries()
        .map_err(|e| BuildError::extraction(format!("Failed to read archive: {e}")))?;

    let mut artifacts = Vec::new();
    for entry in entries {
        let mut entry =
            entry.map_err(|e| BuildError::extraction(format!("Corrupt archive entry: {e}")))?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let entry_path = entry
            .path()
            .map_err(|e| BuildError::extraction(format!("Invalid entry name: {e}")))?
            .into_owned();
        let relative = output_relative_path(&entry_path)?;
        let target = local_dir.join(&relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BuildError::extraction(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let mut file = File::create(&target).map_err(|e| {
            BuildError::extraction(format!("Failed to create {}: {e}", target.display()))
        })?;
        let size = io::copy(&mut entry, &mut file).map_err(|e| {
            BuildError::extraction(format!("Failed to write {}: {e}", target.display()))
        })?;

        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        debug!("Extracted {} ({} bytes)", name, size);
        artifacts.push(ExtractedArtifact { name, path: target, size });
    }

    if artifacts.is_empty() {
        return Err(BuildError::NoArtifact { path: source.to_string() });
    }

    info!("Extracted {} artifact(s) to {}", artifacts.len(), local_dir.display());
    Ok(ExtractedArtifactSet { output_dir: local_dir.to_path_buf(), artifacts })
}

/// Drop the leading directory component and refuse paths escaping the output
fn output_relative_path(entry_path: &Path) -> Result<PathBuf> {
    let mut parts = Vec::new();
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            _ => {
                return Err(BuildError::extraction(format!(
                    "Refusing unsafe entry {}",
                    entry_path.display()
                )))
            }
        }
    }

    let parts = if parts.len() > 1 { &parts[1..] } else { &parts[..] };
    if parts.is_empty() {
        return Err(BuildError::extraction(format!("Empty entry name {}", entry_path.display())));
    }
    Ok(parts.iter().collect())
}
