use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::target::DeployTarget;

/// File name of the deployment configuration.
pub const CONFIG_FILE: &str = "pcosync.toml";

/// pcosync.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PcosyncConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub cloud_run: CloudRunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Service (or job) name, defaults to the worker package name
    pub name: Option<String>,
    /// GCP region (defaults to us-central1)
    #[serde(default = "default_region")]
    pub region: String,
    /// GCP project ID
    pub gcp_project_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Rust builder image
    #[serde(default = "default_builder_image")]
    pub base_image: String,
    /// Runtime base image
    #[serde(default = "default_runtime_image")]
    pub runtime_image: String,
    /// Additional system packages to install via apt-get
    #[serde(default)]
    pub extra_packages: Vec<String>,
    /// Cargo Chef version
    #[serde(default = "default_cargo_chef_version")]
    pub cargo_chef_version: String,
    /// Directory (relative to the project root) of the package that owns
    /// the worker binary.
    #[serde(default = "default_package_dir")]
    pub package_dir: PathBuf,
    /// Files/directories copied into the runtime image next to the binary.
    /// When None, the runtime image holds only the worker binary.
    #[serde(default)]
    pub include: Option<Vec<String>>,
    /// Static, non-secret environment variables baked into the image.
    /// Secret values never belong here; see [`DeployConfig::secrets`].
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Which entry point the image starts with.
    #[serde(default)]
    pub target: DeployTarget,
    /// Runtime values injected from Secret Manager at deploy time.
    /// Each name is both the secret name and the environment variable name.
    #[serde(default = "default_secrets")]
    pub secrets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudRunConfig {
    /// Memory allocation
    #[serde(default = "default_memory")]
    pub memory: String,
    /// CPU count
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    /// Minimum instances
    #[serde(default)]
    pub min_instances: u32,
    /// Maximum instances
    #[serde(default = "default_max_instances")]
    pub max_instances: u32,
    /// Max concurrent requests per instance
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    /// Port the worker listens on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whether the trigger endpoint is publicly invokable
    #[serde(default = "default_allow_unauthenticated")]
    pub allow_unauthenticated: bool,
    /// Request timeout (service) or task timeout (job)
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Retries per failed job task
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: None,
            region: default_region(),
            gcp_project_id: None,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            base_image: default_builder_image(),
            runtime_image: default_runtime_image(),
            extra_packages: Vec::new(),
            cargo_chef_version: default_cargo_chef_version(),
            package_dir: default_package_dir(),
            include: None,
            env: BTreeMap::new(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            target: DeployTarget::default(),
            secrets: default_secrets(),
        }
    }
}

impl Default for CloudRunConfig {
    fn default() -> Self {
        Self {
            memory: default_memory(),
            cpu: default_cpu(),
            min_instances: 0,
            max_instances: default_max_instances(),
            concurrency: default_concurrency(),
            port: default_port(),
            allow_unauthenticated: default_allow_unauthenticated(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl PcosyncConfig {
    /// Load from pcosync.toml at the given path, or return defaults if not found.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                path: config_path.clone(),
                source: e,
            })?;
        let config: Self = toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
            path: config_path,
            source: e,
        })?;
        config.build.validate_include()?;
        Ok(config)
    }

    /// The configured GCP project, or an error naming the missing key.
    pub fn gcp_project_id(&self) -> crate::Result<&str> {
        self.project
            .gcp_project_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(crate::Error::MissingProjectId)
    }

    /// Service name: `[project].name` or the given package name.
    pub fn service_name<'a>(&'a self, package_name: &'a str) -> &'a str {
        self.project.name.as_deref().unwrap_or(package_name)
    }
}

impl BuildConfig {
    /// Reject include paths that would escape the bundle.
    pub fn validate_include(&self) -> crate::Result<()> {
        let Some(paths) = &self.include else {
            return Ok(());
        };
        for path in paths {
            if path.trim().is_empty() {
                return Err(crate::Error::InvalidIncludePath {
                    path: path.clone(),
                    reason: "path is empty",
                });
            }
            let p = Path::new(path);
            if p.is_absolute() {
                return Err(crate::Error::InvalidIncludePath {
                    path: path.clone(),
                    reason: "absolute paths are not allowed",
                });
            }
            if p.components().any(|c| matches!(c, Component::ParentDir)) {
                return Err(crate::Error::InvalidIncludePath {
                    path: path.clone(),
                    reason: "parent directory references are not allowed",
                });
            }
        }
        Ok(())
    }
}

fn default_region() -> String {
    "us-central1".to_owned()
}

fn default_builder_image() -> String {
    "rust:1.88-bookworm".to_owned()
}

fn default_runtime_image() -> String {
    "gcr.io/distroless/cc-debian12".to_owned()
}

fn default_cargo_chef_version() -> String {
    "0.1.68".to_owned()
}

fn default_package_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_secrets() -> Vec<String> {
    ["CLIENT_ID", "CLIENT_SECRET", "BQ_DATASET"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

fn default_memory() -> String {
    "512Mi".to_owned()
}

fn default_cpu() -> u32 {
    1
}

fn default_max_instances() -> u32 {
    10
}

fn default_concurrency() -> u32 {
    80
}

fn default_port() -> u16 {
    8080
}

fn default_allow_unauthenticated() -> bool {
    true
}

fn default_timeout() -> String {
    "3600s".to_owned()
}

fn default_max_retries() -> u32 {
    1
}
