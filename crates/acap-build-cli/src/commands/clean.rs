//! Clean command implementation

use std::path::{Path, PathBuf};

use acap_build_config::BuildOptions;
use color_eyre::eyre::{Context, Result};
use tracing::info;

/// Clean command implementation
pub struct CleanCommand {
    config_path: PathBuf,
}

impl CleanCommand {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub async fn execute(&self) -> Result<()> {
        info!("Cleaning build artifacts");

        let options = BuildOptions::load_or_default(&self.config_path).with_context(|| {
            format!("Failed to load project file {}", self.config_path.display())
        })?;

        let removed = clean(&options)?;
        if removed == 0 {
            println!("Nothing to clean");
        } else {
            println!("Cleanup completed");
        }
        Ok(())
    }
}

/// Remove the output directory and the build log; returns how many were removed
fn clean(options: &BuildOptions) -> Result<usize> {
    let mut removed = 0;

    if remove_path(&options.output_dir)? {
        println!("  Removed {}", options.output_dir.display());
        removed += 1;
    }
    if remove_path(&options.build_log)? {
        println!("  Removed {}", options.build_log.display());
        removed += 1;
    }

    Ok(removed)
}

fn remove_path(path: &Path) -> Result<bool> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
        Ok(true)
    } else if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove file: {}", path.display()))?;
        Ok(true)
    } else {
        info!("Nothing to clean at {}", path.display());
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_clean_removes_output_and_log() {
        let temp_dir = TempDir::new().unwrap();
        let output_dir = temp_dir.path().join("build");
        std::fs::create_dir_all(output_dir.join("nested")).unwrap();
        std::fs::write(output_dir.join("app.eap"), "eap").unwrap();
        let build_log = temp_dir.path().join("docker-build.log");
        std::fs::write(&build_log, "log").unwrap();

        let options = BuildOptions { output_dir: output_dir.clone(), build_log: build_log.clone(), ..Default::default() };

        assert_eq!(clean(&options).unwrap(), 2);
        assert!(!output_dir.exists());
        assert!(!build_log.exists());

        // second run is a no-op
        assert_eq!(clean(&options).unwrap(), 0);
    }
}
