//! Build orchestration logic
//!
//! Runs the fixed pipeline: assemble the context, build the image, read the
//! build stream, then realize the image in a throwaway container to copy the
//! package out. Container cleanup runs on every path once a container exists.

use std::sync::Arc;

use acap_build_config::BuildConfiguration;
use acap_build_docker::{DockerConfig, DockerService, DockerServiceTrait, ImageBuildRequest, PruneReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    artifact::{ArtifactExtractor, ExtractedArtifactSet},
    context::ContextAssembler,
    error::{BuildError, Result},
    graceful_shutdown::ShutdownManager,
    interpreter::{BuildLog, LogInterpreter},
    lifecycle::{ContainerLifecycleManager, ManagedContainer},
    progress::{ProgressModel, ProgressState},
    progress_ui::{LogProgressDisplay, ProgressDisplay},
    rules::RuleSet,
};

/// Outcome of a successful build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Image tag the build produced
    pub image: String,
    pub artifacts: ExtractedArtifactSet,
    /// Progress at the end of the build stream
    pub progress: ProgressState,
    /// Stop/remove failures; the build itself succeeded
    pub cleanup_errors: Vec<String>,
    pub prune: Option<PruneReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BuildReport {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Whether the container was cleaned up without errors
    pub fn is_clean(&self) -> bool {
        self.cleanup_errors.is_empty()
    }

    /// Human-readable report listing every artifact
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Built {} in {}s ({}/{} steps)\n{}",
            self.image,
            self.duration().num_seconds(),
            self.progress.current,
            self.progress.total,
            self.artifacts.summary()
        );
        if let Some(prune) = &self.prune {
            summary.push_str(&format!(
                "\nPruned {} containers, {} images, {} networks",
                prune.containers_deleted, prune.images_deleted, prune.networks_deleted
            ));
        }
        for cleanup_error in &self.cleanup_errors {
            summary.push_str(&format!("\nCleanup error: {cleanup_error}"));
        }
        summary
    }
}

/// Main build orchestrator
pub struct BuildOrchestrator {
    config: BuildConfiguration,
    docker: Arc<dyn DockerServiceTrait>,
    shutdown_manager: Arc<ShutdownManager>,
    display: Box<dyn ProgressDisplay>,
    rules: RuleSet,
}

impl BuildOrchestrator {
    /// Orchestrator over an existing engine connection
    pub fn new(config: BuildConfiguration, docker: Arc<dyn DockerServiceTrait>) -> Self {
        Self {
            config,
            docker,
            shutdown_manager: Arc::new(ShutdownManager::new()),
            display: Box::new(LogProgressDisplay::new()),
            rules: RuleSet::standard(),
        }
    }

    /// Connect to the local engine and create an orchestrator
    pub async fn connect(config: BuildConfiguration, docker_config: DockerConfig) -> Result<Self> {
        let docker = DockerService::new(docker_config).await?;
        Ok(Self::new(config, Arc::new(docker)))
    }

    pub fn with_shutdown_manager(mut self, shutdown_manager: Arc<ShutdownManager>) -> Self {
        self.shutdown_manager = shutdown_manager;
        self
    }

    pub fn with_display(mut self, display: Box<dyn ProgressDisplay>) -> Self {
        self.display = display;
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Get the shutdown manager
    pub fn shutdown_manager(&self) -> Arc<ShutdownManager> {
        Arc::clone(&self.shutdown_manager)
    }

    pub fn config(&self) -> &BuildConfiguration {
        &self.config
    }

    /// Run the whole pipeline
    pub async fn run(self) -> Result<BuildReport> {
        let started_at = Utc::now();
        let Self { config, docker, shutdown_manager, display, rules } = self;
        let options = &config.options;

        info!("Assembling build context from {}", options.context_dir.display());
        let archive = ContextAssembler::new(&options.context_dir)
            .with_recipe(options.dockerfile.clone())
            .with_ignore_dirs(&options.ignore_dirs)
            .assemble()?;

        shutdown_manager.check("submitting the build")?;

        let request =
            ImageBuildRequest::new(config.image_name()).with_build_args(config.build_args());
        info!("Building image {} for {}", request.tag, config.app_name);
        let events = docker
            .build_image(&request, archive.into_bytes())
            .await
            .map_err(|e| BuildError::BuildSubmission { reason: e.to_string() })?;

        let progress = Arc::new(ProgressModel::new(display));
        let log = BuildLog::create(&options.build_log).await?;
        let interpreted = LogInterpreter::new(Arc::clone(&progress))
            .with_rules(rules)
            .with_log(log)
            .with_cancellation(shutdown_manager.subscribe())
            .interpret(events, options.expected_extra_steps() as u64)
            .await;

        let outcome = match interpreted {
            Ok(outcome) => outcome,
            Err(e) => {
                progress.clear();
                return Err(e);
            }
        };
        let outcome = outcome.into_result()?;
        info!("Image {} built ({}%)", request.tag, outcome.progress.percent());

        shutdown_manager.check("creating the container")?;

        let lifecycle = ContainerLifecycleManager::new(Arc::clone(&docker));
        let extractor = ArtifactExtractor::new(Arc::clone(&docker));
        let mut container = lifecycle.create(&request.tag).await?;

        let extracted =
            realize(&config, &lifecycle, &extractor, &shutdown_manager, &mut container).await;

        let cleanup_errors: Vec<String> = lifecycle
            .teardown(&mut container)
            .await
            .iter()
            .map(ToString::to_string)
            .collect();

        let prune = if options.prune {
            match lifecycle.prune().await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("Prune failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let artifacts = match extracted {
            Ok(artifacts) => artifacts,
            Err(e) => {
                for cleanup_error in &cleanup_errors {
                    error!("Cleanup error: {}", cleanup_error);
                }
                return Err(e);
            }
        };

        Ok(BuildReport {
            image: request.tag,
            artifacts,
            progress: outcome.progress,
            cleanup_errors,
            prune,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Start the container and copy the package out of it
async fn realize(
    config: &BuildConfiguration,
    lifecycle: &ContainerLifecycleManager,
    extractor: &ArtifactExtractor,
    shutdown_manager: &ShutdownManager,
    container: &mut ManagedContainer,
) -> Result<ExtractedArtifactSet> {
    lifecycle.start(container).await?;
    shutdown_manager.check("extracting artifacts")?;

    extractor
        .extract(container.id(), &config.options.artifact_path, &config.options.output_dir)
        .await
}
