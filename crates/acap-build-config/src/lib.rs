//! Configuration management for the ACAP builder
//!
//! This crate turns user options (an optional YAML project file plus
//! command line overrides) into a resolved [`BuildConfiguration`], and
//! renders the build arguments handed to the container engine.

pub mod arch;
pub mod error;
pub mod manifest;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use arch::{Architecture, SdkSelection};
pub use error::{ConfigError, Result};
pub use manifest::AppManifest;

/// Default name of the optional project file
pub const PROJECT_FILE: &str = "acap-build.yaml";

/// User supplied build options, as found in the project file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Directory packaged as the build context
    pub context_dir: PathBuf,

    /// Application directory inside the context
    pub app_dir: String,

    /// Manifest file name, relative to the application directory
    pub manifest: String,

    /// Custom recipe replacing the built-in Dockerfile
    pub dockerfile: Option<PathBuf>,

    /// Target architecture
    pub arch: String,

    /// Build with the legacy SDK
    pub lowest_sdk: bool,

    /// SDK version override
    pub sdk_version: Option<String>,

    /// Ubuntu version override
    pub ubuntu_version: Option<String>,

    /// Camera address used by the post-build install/start phases
    pub ip: String,

    /// Camera root password
    pub password: String,

    /// Install the package on the camera after building
    pub install: bool,

    /// Start the application after installing
    pub start: bool,

    /// Follow the application log after building
    pub watch: bool,

    /// Prune unused engine resources after the build
    pub prune: bool,

    /// Additional files bundled into the package
    pub files: Vec<String>,

    /// Extra Go build tags
    pub build_tags: Option<String>,

    /// Compile and bundle libav
    pub libav: bool,

    /// Directories (relative to the context) excluded from the build context
    pub ignore_dirs: Vec<String>,

    /// Local directory receiving the extracted artifacts
    pub output_dir: PathBuf,

    /// Directory inside the container holding the artifacts
    pub artifact_path: String,

    /// Build log written during the image build
    pub build_log: PathBuf,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            context_dir: PathBuf::from("."),
            app_dir: String::new(),
            manifest: "manifest.json".to_string(),
            dockerfile: None,
            arch: Architecture::default().to_string(),
            lowest_sdk: false,
            sdk_version: None,
            ubuntu_version: None,
            ip: String::new(),
            password: String::new(),
            install: false,
            start: false,
            watch: false,
            prune: false,
            files: Vec::new(),
            build_tags: None,
            libav: false,
            ignore_dirs: Vec::new(),
            output_dir: PathBuf::from("build"),
            artifact_path: "/opt/eap".to_string(),
            build_log: PathBuf::from("docker-build.log"),
        }
    }
}

impl BuildOptions {
    /// Load options from a YAML project file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ProjectFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut options: BuildOptions =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ProjectFile {
                path: path.to_path_buf(),
                reason: format!("Failed to parse YAML: {e}"),
            })?;

        options.expand_env_vars()?;
        Ok(options)
    }

    /// Load the project file if it exists, defaults otherwise
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            info!("Using project file {}", path.display());
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Expand environment variables in paths
    fn expand_env_vars(&mut self) -> Result<()> {
        self.context_dir = expand_path(&self.context_dir)?;
        self.output_dir = expand_path(&self.output_dir)?;
        self.build_log = expand_path(&self.build_log)?;

        if let Some(dockerfile) = &self.dockerfile {
            self.dockerfile = Some(expand_path(dockerfile)?);
        }

        Ok(())
    }

    /// Number of pipeline phases run inside the recipe beyond the engine's own steps
    pub fn expected_extra_steps(&self) -> usize {
        [self.install, self.start, self.watch]
            .iter()
            .filter(|enabled| **enabled)
            .count()
    }
}

/// Fully resolved configuration for one build invocation
#[derive(Debug, Clone)]
pub struct BuildConfiguration {
    /// The options this configuration was resolved from
    pub options: BuildOptions,
    /// Target architecture
    pub arch: Architecture,
    /// SDK selection
    pub sdk: SdkSelection,
    /// Application name from the manifest
    pub app_name: String,
    /// Manifest schema version
    pub schema_version: String,
}

impl BuildConfiguration {
    /// Resolve options into a configuration, reading the manifest from disk
    pub fn resolve(options: BuildOptions) -> Result<Self> {
        let manifest_path = options
            .context_dir
            .join(&options.app_dir)
            .join(&options.manifest);
        let manifest = AppManifest::from_file(&manifest_path)?;
        Self::with_manifest(options, &manifest)
    }

    /// Resolve options against an already loaded manifest
    pub fn with_manifest(options: BuildOptions, manifest: &AppManifest) -> Result<Self> {
        let arch: Architecture = options.arch.parse()?;
        let sdk = SdkSelection::resolve(
            options.lowest_sdk,
            options.sdk_version.as_deref(),
            options.ubuntu_version.as_deref(),
        );

        info!("Using SDK: {}", sdk.sdk);
        info!("Using SDK version: {}", sdk.version);
        info!("Using Ubuntu version: {}", sdk.ubuntu_version);

        let config = Self {
            options,
            arch,
            sdk,
            app_name: manifest.app_name().to_string(),
            schema_version: manifest.schema_version.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if (self.options.install || self.options.start) && self.options.ip.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "install/start require the camera ip address".to_string(),
            });
        }

        if self.options.artifact_path.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "artifact path inside the container cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Tag of the image built for this configuration
    pub fn image_name(&self) -> &'static str {
        self.arch.image_name()
    }

    /// Build-time arguments passed to the engine
    pub fn build_args(&self) -> HashMap<String, String> {
        let o = &self.options;
        let app_dir = if o.app_dir.is_empty() { "." } else { o.app_dir.as_str() };
        let files: String = o.files.iter().map(|f| format!("-a {f} ")).collect();

        HashMap::from([
            ("ARCH".to_string(), self.arch.to_string()),
            ("SDK".to_string(), self.sdk.sdk.clone()),
            ("UBUNTU_VERSION".to_string(), self.sdk.ubuntu_version.clone()),
            ("VERSION".to_string(), self.sdk.version.clone()),
            ("GO_ARCH".to_string(), self.arch.go_arch().to_string()),
            ("GO_ARM".to_string(), self.arch.go_arm().to_string()),
            ("APP_NAME".to_string(), self.app_name.clone()),
            ("APP_MANIFEST".to_string(), o.manifest.clone()),
            ("IP_ADDR".to_string(), o.ip.clone()),
            ("PASSWORD".to_string(), o.password.clone()),
            ("START".to_string(), yes_no(o.start)),
            ("INSTALL".to_string(), yes_no(o.install)),
            ("GO_APP".to_string(), app_dir.to_string()),
            ("CROSS_PREFIX".to_string(), self.arch.cross_prefix().to_string()),
            ("COMP_LIBAV".to_string(), yes_no(o.libav)),
            ("FILES_TO_ADD_TO_ACAP".to_string(), files),
            ("GO_BUILD_TAGS".to_string(), normalize_build_tags(o.build_tags.as_deref().unwrap_or_default())),
        ])
    }
}

/// Turn space- or comma-separated tags into the comma list `go build -tags` expects.
/// Empty entries and repeats are dropped; first occurrence order is kept.
fn normalize_build_tags(tags: &str) -> String {
    let mut seen = HashSet::new();
    tags.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(*tag))
        .collect::<Vec<_>>()
        .join(",")
}

fn yes_no(flag: bool) -> String {
    let value = if flag { "YES" } else { "NO" };
    value.to_string()
}

/// Expand environment variables in a path
fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();
    let env_var_re =
        Regex::new(r"\$\{([^}]+)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid regex");

    let mut result = path_str.to_string();
    for cap in env_var_re.captures_iter(&path_str) {
        let Some(name) = cap.get(1).or_else(|| cap.get(2)) else {
            continue;
        };
        let value = std::env::var(name.as_str())
            .map_err(|_| ConfigError::MissingEnvVar { name: name.as_str().to_string() })?;

        result = result.replace(&cap[0], &value);
    }

    Ok(PathBuf::from(result))
}

#[cfg(test)]
mod tests {
    use std::env;

    use tempfile::TempDir;

    use super::*;

    fn manifest() -> AppManifest {
        AppManifest::from_json(r#"{"acapPackageConf": {"setup": {"appName": "hello"}}}"#)
            .unwrap()
    }

    #[test]
    fn test_expand_path() {
        env::set_var("ACAP_BUILD_TEST_VAR", "/test/path");

        let path = PathBuf::from("${ACAP_BUILD_TEST_VAR}/sub");
        let expanded = expand_path(&path).unwrap();
        assert_eq!(expanded, PathBuf::from("/test/path/sub"));

        let path = PathBuf::from("$ACAP_BUILD_TEST_VAR/sub");
        let expanded = expand_path(&path).unwrap();
        assert_eq!(expanded, PathBuf::from("/test/path/sub"));

        let missing = PathBuf::from("$ACAP_BUILD_SURELY_UNSET_VAR/x");
        assert!(matches!(expand_path(&missing), Err(ConfigError::MissingEnvVar { .. })));
    }

    #[test]
    fn test_project_file_defaults_and_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join(PROJECT_FILE);
        std::fs::write(
            &file,
            "arch: armv7hf\ninstall: true\nip: 192.168.0.90\nignore_dirs: [vendor]\n",
        )
        .unwrap();

        let options = BuildOptions::from_file(&file).unwrap();
        assert_eq!(options.arch, "armv7hf");
        assert!(options.install);
        assert_eq!(options.ignore_dirs, vec!["vendor"]);
        // untouched fields keep their defaults
        assert_eq!(options.manifest, "manifest.json");
        assert_eq!(options.artifact_path, "/opt/eap");
        assert_eq!(options.expected_extra_steps(), 1);
    }

    #[test]
    fn test_missing_project_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let options = BuildOptions::load_or_default(temp_dir.path().join(PROJECT_FILE)).unwrap();
        assert_eq!(options.output_dir, PathBuf::from("build"));
        assert_eq!(options.expected_extra_steps(), 0);
    }

    #[test]
    fn test_build_args() {
        let options = BuildOptions {
            arch: "armv7hf".to_string(),
            files: vec!["lib".to_string(), "html".to_string()],
            start: true,
            install: true,
            ip: "10.0.0.2".to_string(),
            ..Default::default()
        };
        let config = BuildConfiguration::with_manifest(options, &manifest()).unwrap();
        let args = config.build_args();

        assert_eq!(args["ARCH"], "armv7hf");
        assert_eq!(args["GO_ARCH"], "arm");
        assert_eq!(args["GO_ARM"], "7");
        assert_eq!(args["APP_NAME"], "hello");
        assert_eq!(args["START"], "YES");
        assert_eq!(args["COMP_LIBAV"], "NO");
        assert_eq!(args["GO_APP"], ".");
        assert_eq!(args["FILES_TO_ADD_TO_ACAP"], "-a lib -a html ");
        assert_eq!(config.image_name(), "acap:arm");
    }

    #[test]
    fn test_build_tags_normalized() {
        assert_eq!(normalize_build_tags("netgo osusergo"), "netgo,osusergo");
        assert_eq!(normalize_build_tags("netgo,osusergo"), "netgo,osusergo");
        assert_eq!(normalize_build_tags(" netgo, osusergo\tsqlite "), "netgo,osusergo,sqlite");
        assert_eq!(normalize_build_tags("netgo,,netgo osusergo netgo"), "netgo,osusergo");
        assert_eq!(normalize_build_tags("  , "), "");

        let options = BuildOptions { build_tags: Some("netgo, osusergo".to_string()), ..Default::default() };
        let config = BuildConfiguration::with_manifest(options, &manifest()).unwrap();
        assert_eq!(config.build_args()["GO_BUILD_TAGS"], "netgo,osusergo");
    }

    #[test]
    fn test_install_requires_ip() {
        let options = BuildOptions { install: true, ..Default::default() };
        let result = BuildConfiguration::with_manifest(options, &manifest());
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_resolve_reads_manifest_from_app_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("app")).unwrap();
        std::fs::write(
            temp_dir.path().join("app/manifest.json"),
            r#"{"schemaVersion": "1.8.0", "acapPackageConf": {"setup": {"appName": "cam"}}}"#,
        )
        .unwrap();

        let options = BuildOptions {
            context_dir: temp_dir.path().to_path_buf(),
            app_dir: "app".to_string(),
            ..Default::default()
        };
        let config = BuildConfiguration::resolve(options).unwrap();
        assert_eq!(config.app_name, "cam");
        assert_eq!(config.schema_version, "1.8.0");
        assert_eq!(config.build_args()["GO_APP"], "app");
    }
}
