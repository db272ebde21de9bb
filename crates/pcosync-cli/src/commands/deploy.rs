use pcosync_build::dockerfile::DockerfileGenerator;
use pcosync_build::{bundle, eject as eject_mod, leak};
use pcosync_cloud::{GcloudClient, compute_service_account};

use super::Deployment;

/// Execute the full deploy pipeline.
pub async fn deploy(allow_dirty: bool) -> anyhow::Result<()> {
    let project_dir = super::project_dir();
    let client = GcloudClient::new();

    // Dirty check: refuse to deploy uncommitted changes unless --allow-dirty
    if !allow_dirty && bundle::is_dirty(&project_dir)? {
        anyhow::bail!(
            "uncommitted changes detected.\n\
             Commit your changes, or use `pcosync deploy --allow-dirty` to deploy anyway."
        );
    }

    let deployment = Deployment::load(&project_dir)?;
    let config = &deployment.config;
    let project_id = deployment.project_id.as_str();
    let target = deployment.run_target();
    let image_tag = format!("{}:latest", deployment.image_repo());

    tracing::debug!(
        package = %deployment.package.name,
        binary = %deployment.package.binary,
        deploy_target = %config.deploy.target,
        image = %image_tag,
        "deploy plan"
    );

    // Pre-flight checks
    println!("Running pre-flight checks...");
    let report = client.check_prerequisites(project_id).await?;
    if report.has_warnings() {
        println!("Warning: the following APIs are not enabled:");
        for api in &report.disabled_apis {
            println!("  - {api}");
        }
        println!("Enable them with: gcloud services enable <api> --project {project_id}");
        anyhow::bail!("required APIs not enabled");
    }

    // Secrets must exist before the revision that mounts them
    let secrets = &config.deploy.secrets;
    if !secrets.is_empty() {
        println!("Checking secrets...");
        let stored = client.list_secrets(project_id).await?;
        let missing: Vec<&str> = secrets
            .iter()
            .filter(|s| !stored.contains(s))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            anyhow::bail!(
                "secrets missing from Secret Manager: {}\n\
                 Set each with `pcosync secret set NAME=VALUE`.",
                missing.join(", ")
            );
        }
    }

    println!("Ensuring Artifact Registry repository...");
    client
        .ensure_artifact_repo(project_id, deployment.region(), super::ARTIFACT_REPO_NAME)
        .await?;

    let dockerfile_content = if eject_mod::is_ejected(&project_dir) {
        println!("Using ejected Dockerfile from .pcosync/Dockerfile");
        eject_mod::load_ejected_dockerfile(&project_dir)?
    } else {
        DockerfileGenerator::new(config, &deployment.package.binary).render()?
    };

    println!("Bundling source...");
    let bundle_dir = bundle::create_bundle(&project_dir, &dockerfile_content)?;

    // Leak scan: no local secret value may ship in the build context
    let known = leak::load_env_secrets(&project_dir.join(".env"), secrets)?;
    let findings = leak::scan_dir(&bundle_dir, &known)?;
    if !findings.is_empty() {
        bundle::remove_bundle(&project_dir)?;
        for finding in &findings {
            eprintln!(
                "  {} contains the value of {}",
                finding.path.display(),
                finding.secret
            );
        }
        anyhow::bail!(
            "secret values found in {} bundled file(s); remove them or exclude the files from git",
            findings.len()
        );
    }

    println!("Submitting build to Cloud Build...");
    client
        .submit_build(&bundle_dir, project_id, &image_tag)
        .await?;

    if !secrets.is_empty() {
        println!("Granting secret access...");
        let project_number = client.get_project_number(project_id).await?;
        let service_account = compute_service_account(&project_number);
        for name in secrets {
            client
                .grant_secret_access(project_id, name, &service_account)
                .await?;
        }
    }

    println!(
        "Deploying {} '{}' to Cloud Run ({})...",
        config.deploy.target,
        target.name,
        target.region
    );
    if config.deploy.target.listens() {
        let url = client
            .deploy_service(
                &target,
                &image_tag,
                config.deploy.target,
                &config.cloud_run,
                secrets,
            )
            .await?;
        println!();
        println!("Deployed: {url}");
        println!("Trigger a sync with: curl {url}/");
    } else {
        client
            .deploy_job(&target, &image_tag, &config.cloud_run, secrets)
            .await?;
        println!();
        println!("Deployed job '{}'", target.name);
        println!(
            "Run it with: gcloud run jobs execute {} --region {} --project {project_id}",
            target.name, target.region
        );
    }

    Ok(())
}
