mod deploy;
mod destroy;
mod doctor;
mod eject;
mod init;
mod logs;
mod secret;
mod status;

use std::io::Write;
use std::path::{Path, PathBuf};

use pcosync_cloud::{RunKind, RunTarget};
use pcosync_core::{PcosyncConfig, WorkerPackage};

/// Artifact Registry repository name used for container images.
pub(crate) const ARTIFACT_REPO_NAME: &str = "pcosync";

pub use deploy::deploy;
pub use destroy::destroy;
pub use doctor::doctor;
pub use eject::eject;
pub use init::init_project;
pub use logs::logs;
pub use secret::{secret_delete, secret_list, secret_set};
pub use status::status;

/// Commands always run from the project root.
pub(crate) fn project_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Configuration plus the worker package it points at.
pub(crate) struct Deployment {
    pub config: PcosyncConfig,
    pub package: WorkerPackage,
    pub project_id: String,
}

impl Deployment {
    /// Load `pcosync.toml`, require a GCP project, then discover the worker
    /// package under `[build].package_dir`.
    pub fn load(project_dir: &Path) -> anyhow::Result<Self> {
        let config = PcosyncConfig::load(project_dir)?;
        let project_id = config.gcp_project_id()?.to_owned();
        let package = WorkerPackage::discover(&project_dir.join(&config.build.package_dir))?;
        Ok(Self {
            config,
            package,
            project_id,
        })
    }

    pub fn service_name(&self) -> &str {
        self.config.service_name(&self.package.name)
    }

    pub fn region(&self) -> &str {
        &self.config.project.region
    }

    pub fn run_target(&self) -> RunTarget<'_> {
        RunTarget {
            name: self.service_name(),
            project_id: &self.project_id,
            region: self.region(),
        }
    }

    pub fn run_kind(&self) -> RunKind {
        self.config.deploy.target.resource().into()
    }

    /// Image path without tag.
    pub fn image_repo(&self) -> String {
        image_repo(self.region(), &self.project_id, self.service_name())
    }
}

fn image_repo(region: &str, project_id: &str, service: &str) -> String {
    format!("{region}-docker.pkg.dev/{project_id}/{ARTIFACT_REPO_NAME}/{service}")
}

/// Ask a yes/no question on stdin; anything but an explicit yes declines.
pub(crate) fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(is_yes(&input))
}

fn is_yes(input: &str) -> bool {
    matches!(input.trim(), "y" | "Y" | "yes" | "YES")
}
