use pcosync_build::bundle;
use pcosync_cloud::{DeployError, GcloudClient, RunKind, SecretError};

use super::Deployment;

/// Mask a secret name, showing first 5 chars + "***".
fn mask_name(name: &str) -> String {
    let prefix: String = name.chars().take(5).collect();
    format!("{prefix}***")
}

fn resource_label(kind: RunKind) -> &'static str {
    match kind {
        RunKind::Service => "service",
        RunKind::Job => "job",
    }
}

/// Delete the Cloud Run service or job, container image, and local bundle.
pub async fn destroy(skip_confirm: bool, include_secrets: bool) -> anyhow::Result<()> {
    let project_dir = super::project_dir();
    let client = GcloudClient::new();

    let deployment = Deployment::load(&project_dir)?;
    let project_id = deployment.project_id.as_str();
    let target = deployment.run_target();
    let kind = deployment.run_kind();
    let label = resource_label(kind);

    // Only the configured secrets are ever candidates for deletion
    let stored = match client.list_secrets(project_id).await {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(error = %e, "could not list secrets");
            Vec::new()
        }
    };
    let secrets: Vec<&String> = deployment
        .config
        .deploy
        .secrets
        .iter()
        .filter(|s| stored.contains(s))
        .collect();

    if !skip_confirm {
        println!("This will delete:");
        println!(
            "  - Cloud Run {label} '{}' in {}",
            target.name, target.region
        );
        println!("  - Container images in Artifact Registry");
        println!("  - Local {}/", bundle::BUNDLE_DIR);

        if include_secrets && !secrets.is_empty() {
            println!("  - {} secret(s) from Secret Manager:", secrets.len());
            for s in &secrets {
                println!("      {}", mask_name(s));
            }
        }

        println!();
        if !super::confirm("Are you sure?")? {
            println!("Aborted.");
            return Ok(());
        }
    }

    println!("Deleting Cloud Run {label} '{}'...", target.name);
    report_deletion(client.delete(&target, kind).await);

    println!("Deleting container image...");
    report_deletion(client.delete_image(&deployment.image_repo(), project_id).await);

    if include_secrets && !secrets.is_empty() {
        println!("Deleting {} secret(s)...", secrets.len());
        for s in &secrets {
            match client.delete_secret(project_id, s).await {
                Ok(()) => println!("  Deleted {}", mask_name(s)),
                Err(SecretError::Delete { source }) if source.is_not_found() => {
                    println!("  {} already gone", mask_name(s))
                }
                Err(e) => println!("  Skipped {} ({:#})", mask_name(s), anyhow::Error::from(e)),
            }
        }
    }

    if bundle::remove_bundle(&project_dir)? {
        println!("Removed local {}/", bundle::BUNDLE_DIR);
    }

    println!();
    println!("Destroy complete.");

    if !include_secrets && !secrets.is_empty() {
        println!();
        println!(
            "Note: {} secret(s) remain in Secret Manager.",
            secrets.len()
        );
        println!("  To delete them: pcosync destroy --include-secrets");
    }

    Ok(())
}

fn report_deletion(result: Result<(), DeployError>) {
    match result {
        Ok(()) => println!("  Deleted."),
        Err(DeployError::Deploy { source }) if source.is_not_found() => {
            println!("  Not found, nothing to delete.")
        }
        Err(e) => println!("  Skipped ({:#})", anyhow::Error::from(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_name_ascii_long() {
        assert_eq!(mask_name("CLIENT_SECRET"), "CLIEN***");
    }

    #[test]
    fn mask_name_ascii_exact_five() {
        assert_eq!(mask_name("ABCDE"), "ABCDE***");
    }

    #[test]
    fn mask_name_ascii_short() {
        assert_eq!(mask_name("ID"), "ID***");
    }

    #[test]
    fn mask_name_empty() {
        assert_eq!(mask_name(""), "***");
    }

    #[test]
    fn mask_name_non_ascii() {
        assert_eq!(mask_name("秘密のキー値"), "秘密のキー***");
    }

    #[test]
    fn resource_labels() {
        assert_eq!(resource_label(RunKind::Service), "service");
        assert_eq!(resource_label(RunKind::Job), "job");
    }
}
