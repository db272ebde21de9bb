use crate::executor::{GcloudExecutor, RealExecutor};
use crate::gcloud::GcloudError;
use pcosync_core::{CloudRunConfig, DeployTarget};
use std::fmt;
use std::path::Path;

/// APIs the deploy pipeline depends on.
const REQUIRED_APIS: &[(&str, &str)] = &[
    ("Cloud Build", "cloudbuild.googleapis.com"),
    ("Cloud Run", "run.googleapis.com"),
    ("Secret Manager", "secretmanager.googleapis.com"),
    ("Artifact Registry", "artifactregistry.googleapis.com"),
    ("BigQuery", "bigquery.googleapis.com"),
];

/// GCP operations client, parameterized over the executor for testability.
pub struct GcloudClient<E: GcloudExecutor = RealExecutor> {
    executor: E,
}

impl GcloudClient<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor,
        }
    }
}

impl Default for GcloudClient<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: GcloudExecutor> GcloudClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    // ── Preflight ──

    pub async fn check_prerequisites(
        &self,
        project_id: &str,
    ) -> Result<PreflightReport, PreflightError> {
        let mut report = PreflightReport::default();

        match self
            .executor
            .exec(&args(["version", "--format", "value(version)"]))
            .await
        {
            Ok(version) => report.gcloud_version = Some(version.trim().to_owned()),
            Err(e) => {
                tracing::debug!(error = %e, "gcloud version check failed");
                return Err(PreflightError::GcloudNotInstalled);
            }
        }

        match self
            .executor
            .exec(&args(["auth", "print-access-token", "--quiet"]))
            .await
        {
            Ok(_) => report.authenticated = true,
            Err(e) => {
                tracing::debug!(error = %e, "gcloud auth check failed");
                return Err(PreflightError::NotAuthenticated);
            }
        }

        match self
            .executor
            .exec(&args([
                "projects",
                "describe",
                project_id,
                "--format",
                "value(name)",
            ]))
            .await
        {
            Ok(name) => report.project_name = Some(name.trim().to_owned()),
            Err(e) => {
                tracing::debug!(error = %e, project = project_id, "project lookup failed");
                return Err(PreflightError::ProjectNotAccessible(project_id.to_owned()));
            }
        }

        for (_, api) in REQUIRED_APIS {
            if !self.api_enabled(project_id, api).await {
                report.disabled_apis.push((*api).to_owned());
            }
        }

        Ok(report)
    }

    async fn api_enabled(&self, project_id: &str, api: &str) -> bool {
        match self
            .executor
            .exec(&args([
                "services",
                "list",
                "--project",
                project_id,
                "--filter",
                &format!("config.name={api}"),
                "--format",
                "value(config.name)",
            ]))
            .await
        {
            Ok(out) => !out.trim().is_empty(),
            Err(e) => {
                tracing::debug!(api, error = %e, "service list failed; treating API as disabled");
                false
            }
        }
    }

    // ── Doctor ──

    /// Run all diagnostic checks without early return.
    pub async fn doctor(&self, project_id: Option<&str>) -> DoctorReport {
        let mut report = DoctorReport::default();

        report.gcloud = match self.executor.exec(&args(["version"])).await {
            Ok(v) => {
                let version = v
                    .lines()
                    .next()
                    .and_then(|line| line.strip_prefix("Google Cloud SDK "))
                    .unwrap_or(v.trim());
                CheckResult::ok(version.trim())
            }
            Err(e) => CheckResult::fail(&e.to_string()),
        };

        report.account = match self
            .executor
            .exec(&args(["config", "get-value", "account"]))
            .await
        {
            Ok(a) if !a.trim().is_empty() => CheckResult::ok(a.trim()),
            Ok(_) => CheckResult::fail("no active account"),
            Err(e) => CheckResult::fail(&format!("no active account ({e})")),
        };

        let Some(pid) = project_id else {
            report.project = CheckResult::fail("gcp_project_id not set in pcosync.toml");
            return report;
        };

        match self
            .executor
            .exec(&args([
                "projects",
                "describe",
                pid,
                "--format",
                "value(name)",
            ]))
            .await
        {
            Ok(name) => {
                report.project = CheckResult::ok(&format!("{pid} ({name})", name = name.trim()))
            }
            Err(e) => {
                tracing::debug!(error = %e, "project describe failed");
                report.project = CheckResult::fail(&format!("{pid} — not accessible"));
                return report;
            }
        }

        report.billing = match self
            .executor
            .exec(&args([
                "billing",
                "projects",
                "describe",
                pid,
                "--format",
                "value(billingEnabled)",
            ]))
            .await
        {
            Ok(v) if v.trim().eq_ignore_ascii_case("true") => CheckResult::ok("Enabled"),
            Ok(_) => CheckResult::fail("Billing not enabled"),
            Err(e) => CheckResult::fail(&format!("Billing status unknown ({e})")),
        };

        for (label, api) in REQUIRED_APIS {
            let enabled = self.api_enabled(pid, api).await;
            report.apis.push(ApiCheck {
                name: (*label).to_owned(),
                result: if enabled {
                    CheckResult::ok("Enabled")
                } else {
                    CheckResult::fail("Not enabled")
                },
            });
        }

        report
    }

    // ── Artifact Registry ──

    /// Ensure the Artifact Registry Docker repository exists, creating it if needed.
    pub async fn ensure_artifact_repo(
        &self,
        project_id: &str,
        region: &str,
        repo_name: &str,
    ) -> Result<(), DeployError> {
        let exists = self
            .executor
            .exec(&args([
                "artifacts",
                "repositories",
                "describe",
                repo_name,
                "--project",
                project_id,
                "--location",
                region,
            ]))
            .await
            .is_ok();

        if !exists {
            tracing::info!(repo = repo_name, region, "creating Artifact Registry repository");
            self.executor
                .exec(&args([
                    "artifacts",
                    "repositories",
                    "create",
                    repo_name,
                    "--project",
                    project_id,
                    "--location",
                    region,
                    "--repository-format",
                    "docker",
                    "--quiet",
                ]))
                .await
                .map_err(|e| DeployError::Deploy { source: e })?;
        }

        Ok(())
    }

    /// Delete a container image from Artifact Registry.
    pub async fn delete_image(&self, image_tag: &str, project_id: &str) -> Result<(), DeployError> {
        self.executor
            .exec(&args([
                "artifacts",
                "docker",
                "images",
                "delete",
                image_tag,
                "--project",
                project_id,
                "--delete-tags",
                "--quiet",
            ]))
            .await
            .map_err(|e| DeployError::Deploy { source: e })?;

        Ok(())
    }

    // ── Cloud Build ──

    pub async fn submit_build(
        &self,
        bundle_dir: &Path,
        project_id: &str,
        image_tag: &str,
    ) -> Result<(), CloudBuildError> {
        let bundle_str = bundle_dir
            .to_str()
            .ok_or_else(|| CloudBuildError::InvalidPath(bundle_dir.to_path_buf()))?;

        self.executor
            .exec_streaming(&args([
                "builds",
                "submit",
                bundle_str,
                "--project",
                project_id,
                "--tag",
                image_tag,
                "--quiet",
            ]))
            .await
            .map_err(|e| CloudBuildError::Submit { source: e })
    }

    // ── Cloud Run service ──

    /// Deploy the image as a Cloud Run service and return its URL.
    ///
    /// Each name in `secrets` is mounted as the environment variable of the
    /// same name from the latest Secret Manager version. A target that keeps
    /// working after responding gets CPU outside requests.
    pub async fn deploy_service(
        &self,
        target: &RunTarget<'_>,
        image_tag: &str,
        deploy_target: DeployTarget,
        config: &CloudRunConfig,
        secrets: &[String],
    ) -> Result<String, DeployError> {
        let mut cmd = args([
            "run",
            "deploy",
            target.name,
            "--image",
            image_tag,
            "--project",
            target.project_id,
            "--region",
            target.region,
            "--platform",
            "managed",
        ]);
        cmd.extend(args(["--memory", &config.memory]));
        cmd.extend(args(["--cpu", &config.cpu.to_string()]));
        cmd.extend(args(["--min-instances", &config.min_instances.to_string()]));
        cmd.extend(args(["--max-instances", &config.max_instances.to_string()]));
        cmd.extend(args(["--concurrency", &config.concurrency.to_string()]));
        cmd.extend(args(["--port", &config.port.to_string()]));
        cmd.extend(args(["--timeout", &config.timeout]));
        cmd.push(
            if config.allow_unauthenticated {
                "--allow-unauthenticated"
            } else {
                "--no-allow-unauthenticated"
            }
            .to_owned(),
        );
        if deploy_target.works_after_response() {
            cmd.push("--no-cpu-throttling".to_owned());
        }
        if let Some(flag) = secrets_flag(secrets) {
            cmd.extend(["--update-secrets".to_owned(), flag]);
        }
        cmd.extend(args(["--quiet", "--format", "value(status.url)"]));

        let output = self
            .executor
            .exec(&cmd)
            .await
            .map_err(|e| DeployError::Deploy { source: e })?;

        Ok(output.trim().to_owned())
    }

    // ── Cloud Run job ──

    /// Create or update a Cloud Run job running one task per execution.
    pub async fn deploy_job(
        &self,
        target: &RunTarget<'_>,
        image_tag: &str,
        config: &CloudRunConfig,
        secrets: &[String],
    ) -> Result<(), DeployError> {
        let mut cmd = args([
            "run",
            "jobs",
            "deploy",
            target.name,
            "--image",
            image_tag,
            "--project",
            target.project_id,
            "--region",
            target.region,
            "--tasks",
            "1",
        ]);
        cmd.extend(args(["--memory", &config.memory]));
        cmd.extend(args(["--cpu", &config.cpu.to_string()]));
        cmd.extend(args(["--task-timeout", &config.timeout]));
        cmd.extend(args(["--max-retries", &config.max_retries.to_string()]));
        if let Some(flag) = secrets_flag(secrets) {
            cmd.extend(["--set-secrets".to_owned(), flag]);
        }
        cmd.push("--quiet".to_owned());

        self.executor
            .exec(&cmd)
            .await
            .map_err(|e| DeployError::Deploy { source: e })?;

        Ok(())
    }

    pub async fn describe(
        &self,
        target: &RunTarget<'_>,
        kind: RunKind,
    ) -> Result<String, DeployError> {
        let mut cmd = kind.command_prefix();
        cmd.extend(args([
            "describe",
            target.name,
            "--project",
            target.project_id,
            "--region",
            target.region,
            "--format",
            "yaml(status)",
        ]));
        self.executor
            .exec(&cmd)
            .await
            .map_err(|e| DeployError::Deploy { source: e })
    }

    pub async fn delete(&self, target: &RunTarget<'_>, kind: RunKind) -> Result<(), DeployError> {
        let mut cmd = kind.command_prefix();
        cmd.extend(args([
            "delete",
            target.name,
            "--project",
            target.project_id,
            "--region",
            target.region,
            "--quiet",
        ]));
        self.executor
            .exec(&cmd)
            .await
            .map_err(|e| DeployError::Deploy { source: e })?;

        Ok(())
    }

    /// Stream recent log entries to the terminal.
    pub async fn read_logs(
        &self,
        target: &RunTarget<'_>,
        kind: RunKind,
        limit: u32,
    ) -> Result<(), DeployError> {
        let mut cmd = kind.command_prefix();
        cmd.extend(args([
            "logs",
            "read",
            target.name,
            "--project",
            target.project_id,
            "--region",
            target.region,
            "--limit",
            &limit.to_string(),
        ]));
        self.executor
            .exec_streaming(&cmd)
            .await
            .map_err(|e| DeployError::Deploy { source: e })
    }

    pub async fn get_project_number(&self, project_id: &str) -> Result<String, DeployError> {
        let output = self
            .executor
            .exec(&args([
                "projects",
                "describe",
                project_id,
                "--format",
                "value(projectNumber)",
            ]))
            .await
            .map_err(|e| DeployError::Deploy { source: e })?;

        Ok(output.trim().to_owned())
    }

    // ── Secret Manager ──

    pub async fn set_secret(
        &self,
        project_id: &str,
        secret_name: &str,
        secret_value: &str,
    ) -> Result<(), SecretError> {
        let secret_exists = self
            .executor
            .exec(&args([
                "secrets",
                "describe",
                secret_name,
                "--project",
                project_id,
            ]))
            .await
            .is_ok();

        if !secret_exists {
            self.executor
                .exec(&args([
                    "secrets",
                    "create",
                    secret_name,
                    "--project",
                    project_id,
                    "--replication-policy",
                    "automatic",
                ]))
                .await
                .map_err(|e| SecretError::Create { source: e })?;
        }

        // The value goes through stdin so it never appears in argv
        self.executor
            .exec_with_stdin(
                &args([
                    "secrets",
                    "versions",
                    "add",
                    secret_name,
                    "--project",
                    project_id,
                    "--data-file",
                    "-",
                ]),
                secret_value.as_bytes(),
            )
            .await
            .map_err(|e| SecretError::AddVersion { source: e })?;

        Ok(())
    }

    pub async fn grant_secret_access(
        &self,
        project_id: &str,
        secret_name: &str,
        service_account: &str,
    ) -> Result<(), SecretError> {
        let member = format!("serviceAccount:{service_account}");
        self.executor
            .exec(&args([
                "secrets",
                "add-iam-policy-binding",
                secret_name,
                "--project",
                project_id,
                "--member",
                &member,
                "--role",
                "roles/secretmanager.secretAccessor",
            ]))
            .await
            .map_err(|e| SecretError::GrantAccess { source: e })?;

        Ok(())
    }

    pub async fn list_secrets(&self, project_id: &str) -> Result<Vec<String>, SecretError> {
        let output = self
            .executor
            .exec(&args([
                "secrets",
                "list",
                "--project",
                project_id,
                "--format",
                "value(name)",
            ]))
            .await
            .map_err(|e| SecretError::List { source: e })?;

        Ok(output
            .lines()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.rsplit('/').next().unwrap_or(s).to_owned())
            .collect())
    }

    pub async fn delete_secret(&self, project_id: &str, secret_name: &str) -> Result<(), SecretError> {
        self.executor
            .exec(&args([
                "secrets",
                "delete",
                secret_name,
                "--project",
                project_id,
                "--quiet",
            ]))
            .await
            .map_err(|e| SecretError::Delete { source: e })?;

        Ok(())
    }
}

/// Where a Cloud Run resource lives.
#[derive(Debug, Clone, Copy)]
pub struct RunTarget<'a> {
    pub name: &'a str,
    pub project_id: &'a str,
    pub region: &'a str,
}

/// Which `gcloud run` command group addresses the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Service,
    Job,
}

impl RunKind {
    fn command_prefix(self) -> Vec<String> {
        match self {
            Self::Service => args(["run", "services"]),
            Self::Job => args(["run", "jobs"]),
        }
    }
}

impl From<pcosync_core::RunResource> for RunKind {
    fn from(r: pcosync_core::RunResource) -> Self {
        match r {
            pcosync_core::RunResource::Service => Self::Service,
            pcosync_core::RunResource::Job => Self::Job,
        }
    }
}

/// Default compute service account, which Cloud Run uses unless told otherwise.
pub fn compute_service_account(project_number: &str) -> String {
    format!("{project_number}-compute@developer.gserviceaccount.com")
}

// ── Helper ──

fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}

/// `NAME=NAME:latest,...`, or None when there is nothing to mount.
fn secrets_flag(secrets: &[String]) -> Option<String> {
    if secrets.is_empty() {
        return None;
    }
    Some(
        secrets
            .iter()
            .map(|s| format!("{s}={s}:latest"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

// ── Report types ──

#[derive(Debug, Default)]
pub struct PreflightReport {
    pub gcloud_version: Option<String>,
    pub authenticated: bool,
    pub project_name: Option<String>,
    pub disabled_apis: Vec<String>,
}

impl PreflightReport {
    pub fn has_warnings(&self) -> bool {
        !self.disabled_apis.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct DoctorReport {
    pub gcloud: CheckResult,
    pub account: CheckResult,
    pub project: CheckResult,
    pub billing: CheckResult,
    pub apis: Vec<ApiCheck>,
    pub config_file: CheckResult,
    pub secrets: CheckResult,
}

impl DoctorReport {
    pub fn all_passed(&self) -> bool {
        self.gcloud.passed
            && self.account.passed
            && self.project.passed
            && self.billing.passed
            && self.config_file.passed
            && self.secrets.passed
            && self.apis.iter().all(|a| a.result.passed)
    }
}

impl fmt::Display for DoctorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("gcloud CLI", &self.gcloud),
            ("Account", &self.account),
            ("Project", &self.project),
            ("Billing", &self.billing),
            ("pcosync.toml", &self.config_file),
            ("Secrets", &self.secrets),
        ];
        for (label, check) in rows {
            writeln!(f, "[{}] {label:<18} {}", check.icon(), check.detail)?;
        }
        for api in &self.apis {
            writeln!(
                f,
                "[{}] {:<18} {}",
                api.result.icon(),
                format!("API: {}", api.name),
                api.result.detail
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    pub fn ok(detail: &str) -> Self {
        Self {
            passed: true,
            detail: detail.to_owned(),
        }
    }

    pub fn fail(detail: &str) -> Self {
        Self {
            passed: false,
            detail: detail.to_owned(),
        }
    }

    pub fn icon(&self) -> &'static str {
        if self.passed { "OK" } else { "NG" }
    }
}

#[derive(Debug, Clone)]
pub struct ApiCheck {
    pub name: String,
    pub result: CheckResult,
}

// ── Error types ──

#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("gcloud CLI not installed — https://cloud.google.com/sdk/docs/install")]
    GcloudNotInstalled,

    #[error("not authenticated — run: gcloud auth login")]
    NotAuthenticated,

    #[error("GCP project '{0}' is not accessible — check project ID and permissions")]
    ProjectNotAccessible(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CloudBuildError {
    #[error("bundle path is not valid UTF-8: {0}")]
    InvalidPath(std::path::PathBuf),

    #[error("cloud build submission failed")]
    Submit { source: GcloudError },
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("cloud run operation failed")]
    Deploy { source: GcloudError },
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("failed to create secret")]
    Create { source: GcloudError },

    #[error("failed to add secret version")]
    AddVersion { source: GcloudError },

    #[error("failed to list secrets")]
    List { source: GcloudError },

    #[error("failed to delete secret")]
    Delete { source: GcloudError },

    #[error("failed to grant secret access")]
    GrantAccess { source: GcloudError },
}
