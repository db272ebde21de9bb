use pcosync_cloud::{CheckResult, GcloudClient};
use pcosync_core::{CONFIG_FILE, PcosyncConfig};

pub async fn doctor() -> anyhow::Result<()> {
    let project_dir = super::project_dir();
    let config = PcosyncConfig::load(&project_dir);
    let project_id = config
        .as_ref()
        // arch-lint: allow(no-silent-result-drop) reason="doctor must report diagnostics even when pcosync.toml is missing or invalid"
        .ok()
        .and_then(|c| c.project.gcp_project_id.as_deref());

    let client = GcloudClient::new();
    let mut report = client.doctor(project_id).await;

    report.config_file = match &config {
        Ok(_) if project_dir.join(CONFIG_FILE).exists() => CheckResult::ok("Found"),
        Ok(_) => CheckResult::fail("Not found (run `pcosync init`)"),
        Err(e) => CheckResult::fail(&format!("Invalid: {e}")),
    };

    report.secrets = match (&config, project_id) {
        (Ok(config), Some(project_id)) => {
            secrets_check(&client, project_id, &config.deploy.secrets).await
        }
        _ => CheckResult::fail("Skipped (no GCP project)"),
    };

    println!();
    println!("{report}");

    if !report.all_passed() {
        anyhow::bail!("some checks failed — see above for details");
    }

    Ok(())
}

async fn secrets_check(client: &GcloudClient, project_id: &str, wanted: &[String]) -> CheckResult {
    match client.list_secrets(project_id).await {
        Ok(stored) => missing_secrets(wanted, &stored),
        Err(e) => CheckResult::fail(&format!("Could not list: {e}")),
    }
}

fn missing_secrets(wanted: &[String], stored: &[String]) -> CheckResult {
    let missing: Vec<&str> = wanted
        .iter()
        .filter(|w| !stored.contains(w))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        CheckResult::ok(&format!("{} configured, all present", wanted.len()))
    } else {
        CheckResult::fail(&format!("Missing: {}", missing.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn all_configured_secrets_present() {
        let check = missing_secrets(
            &names(&["CLIENT_ID", "CLIENT_SECRET"]),
            &names(&["CLIENT_SECRET", "CLIENT_ID", "OTHER"]),
        );
        assert!(check.passed);
        assert_eq!(check.detail, "2 configured, all present");
    }

    #[test]
    fn missing_secrets_are_named() {
        let check = missing_secrets(
            &names(&["CLIENT_ID", "CLIENT_SECRET", "BQ_DATASET"]),
            &names(&["CLIENT_ID"]),
        );
        assert!(!check.passed);
        assert_eq!(check.detail, "Missing: CLIENT_SECRET, BQ_DATASET");
    }
}
