//! Build command implementation

use std::path::PathBuf;
use std::sync::Arc;

use acap_build::{
    setup_signal_handlers, BuildError, BuildOrchestrator, ProgressDisplayFactory, ShutdownManager,
};
use acap_build_config::{BuildConfiguration, BuildOptions};
use acap_build_docker::DockerConfig;
use color_eyre::eyre::{eyre, Context, Result};
use tracing::info;

use crate::BuildArgs;

/// Build command implementation
pub struct BuildCommand {
    config_path: PathBuf,
    args: BuildArgs,
    interactive: bool,
}

impl BuildCommand {
    pub fn new(config_path: PathBuf, args: BuildArgs, interactive: bool) -> Self {
        Self { config_path, args, interactive }
    }

    pub async fn execute(&self) -> Result<()> {
        let mut options = BuildOptions::load_or_default(&self.config_path).with_context(|| {
            format!("Failed to load project file {}", self.config_path.display())
        })?;
        apply_overrides(&mut options, &self.args);

        let config = BuildConfiguration::resolve(options).context("Invalid build configuration")?;
        info!("Building {} for {}", config.app_name, config.arch);

        let shutdown_manager = Arc::new(ShutdownManager::new());
        setup_signal_handlers(Arc::clone(&shutdown_manager))?;

        let docker_config = DockerConfig {
            socket_path: self.args.socket.clone(),
            ..Default::default()
        };
        let orchestrator = BuildOrchestrator::connect(config, docker_config)
            .await
            .context("Failed to connect to Docker")?
            .with_shutdown_manager(shutdown_manager)
            .with_display(ProgressDisplayFactory::create(self.interactive));

        let report = match orchestrator.run().await {
            Ok(report) => report,
            Err(BuildError::BuildFailure { messages }) => {
                eprintln!("\nBuild errors detected:");
                for message in &messages {
                    eprintln!("{}", message.trim_end());
                }
                return Err(eyre!("Error detected during build process"));
            }
            Err(e) => return Err(eyre!("Build failed: {}", e)),
        };

        println!("\n{}", report.summary());

        if !report.is_clean() {
            return Err(eyre!(
                "Container cleanup failed ({} errors)",
                report.cleanup_errors.len()
            ));
        }

        info!("Build completed successfully");
        Ok(())
    }
}

/// Command-line flags win over the project file
fn apply_overrides(options: &mut BuildOptions, args: &BuildArgs) {
    if let Some(ip) = &args.ip {
        options.ip = ip.clone();
    }
    if let Some(password) = &args.password {
        options.password = password.clone();
    }
    if let Some(manifest) = &args.manifest {
        options.manifest = manifest.clone();
    }
    if let Some(dockerfile) = &args.dockerfile {
        options.dockerfile = Some(dockerfile.clone());
    }
    if let Some(arch) = &args.arch {
        options.arch = arch.clone();
    }
    if let Some(version) = &args.sdk_version {
        options.sdk_version = Some(version.clone());
    }
    if let Some(version) = &args.ubuntu_version {
        options.ubuntu_version = Some(version.clone());
    }
    if let Some(app_dir) = &args.app_dir {
        options.app_dir = app_dir.clone();
    }
    if !args.files.is_empty() {
        options.files = args.files.clone();
    }
    if let Some(tags) = &args.tags {
        options.build_tags = Some(tags.clone());
    }
    if !args.ignore_dirs.is_empty() {
        options.ignore_dirs = args.ignore_dirs.clone();
    }
    if let Some(context) = &args.context {
        options.context_dir = context.clone();
    }
    if let Some(output) = &args.output {
        options.output_dir = output.clone();
    }
    if let Some(log) = &args.log {
        options.build_log = log.clone();
    }

    options.lowest_sdk |= args.lowest_sdk;
    options.install |= args.install;
    options.start |= args.start;
    options.watch |= args.watch;
    options.prune |= args.prune;
    options.libav |= args.libav;
}
