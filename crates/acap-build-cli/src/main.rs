//! Main CLI entry point for the ACAP builder

use std::path::PathBuf;

use acap_build_config::PROJECT_FILE;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::Result;
use tracing_subscriber::EnvFilter;

mod commands;

/// ACAP builder - build Axis camera applications inside a container
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Decrease logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    quiet: u8,

    /// Project file path
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the application package
    Build(BuildArgs),

    /// Remove the output directory and the build log
    Clean,
}

/// Flags overriding the project file
#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Camera IP address, required for --install and --start
    #[arg(long, value_name = "IP")]
    pub ip: Option<String>,

    /// Camera root password
    #[arg(long = "pwd", value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Manifest file name inside the app directory
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<String>,

    /// Custom recipe instead of the bundled Dockerfile
    #[arg(long, value_name = "FILE")]
    pub dockerfile: Option<PathBuf>,

    /// Target architecture: aarch64 or armv7hf
    #[arg(long, value_name = "ARCH")]
    pub arch: Option<String>,

    /// SDK version
    #[arg(long = "sdk", value_name = "VERSION")]
    pub sdk_version: Option<String>,

    /// Ubuntu version of the SDK image
    #[arg(long = "ubuntu", value_name = "VERSION")]
    pub ubuntu_version: Option<String>,

    /// Build with acap-sdk 3.5 on Ubuntu 20.04
    #[arg(long = "lowsdk")]
    pub lowest_sdk: bool,

    /// Install the package on the camera
    #[arg(long)]
    pub install: bool,

    /// Start the application after installation
    #[arg(long)]
    pub start: bool,

    /// Count the log watch phase in the progress total
    #[arg(long)]
    pub watch: bool,

    /// Prune unused engine resources after the build
    #[arg(long)]
    pub prune: bool,

    /// Application directory relative to the context directory
    #[arg(long = "appdir", value_name = "DIR")]
    pub app_dir: Option<String>,

    /// Extra files to bundle into the package
    #[arg(long, value_name = "FILE", num_args = 1..)]
    pub files: Vec<String>,

    /// Extra Go build tags
    #[arg(long, value_name = "TAGS")]
    pub tags: Option<String>,

    /// Build libav into the image
    #[arg(long)]
    pub libav: bool,

    /// Directories left out of the build context
    #[arg(long = "ignore", value_name = "DIR")]
    pub ignore_dirs: Vec<String>,

    /// Context directory
    #[arg(long, value_name = "DIR")]
    pub context: Option<PathBuf>,

    /// Output directory for extracted packages
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Build log file
    #[arg(long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Docker socket path
    #[arg(long, value_name = "PATH")]
    pub socket: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet)?;

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(PROJECT_FILE));

    let result = match cli.command {
        Commands::Build(args) => {
            let command = commands::BuildCommand::new(config_path, args, cli.quiet == 0);
            command.execute().await
        }

        Commands::Clean => {
            let command = commands::CleanCommand::new(config_path);
            command.execute().await
        }
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn setup_logging(verbose: u8, quiet: u8) -> Result<()> {
    let log_level = match (verbose, quiet) {
        (0, 0) => "info",
        (1, 0) => "debug",
        (v, 0) if v >= 2 => "trace",
        (0, 1) => "warn",
        (0, 2) => "error",
        (0, q) if q > 2 => "off",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_flags() {
        let cli = Cli::parse_from([
            "acap-build",
            "-v",
            "build",
            "--arch",
            "armv7hf",
            "--install",
            "--ip",
            "192.168.0.90",
            "--files",
            "config.json",
            "index.html",
            "--ignore",
            "node_modules",
        ]);

        assert_eq!(cli.verbose, 1);
        let Commands::Build(args) = cli.command else {
            panic!("expected the build subcommand");
        };
        assert_eq!(args.arch.as_deref(), Some("armv7hf"));
        assert!(args.install);
        assert_eq!(args.files, ["config.json", "index.html"]);
        assert_eq!(args.ignore_dirs, ["node_modules"]);
    }
}
