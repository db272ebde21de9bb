use pcosync_cloud::GcloudClient;
use pcosync_core::PcosyncConfig;

/// Load config and return it with the required GCP project.
fn load_project() -> anyhow::Result<(PcosyncConfig, String)> {
    let config = PcosyncConfig::load(&super::project_dir())?;
    let project_id = config.gcp_project_id()?.to_owned();
    Ok((config, project_id))
}

fn parse_key_value(key_value: &str) -> anyhow::Result<(&str, &str)> {
    let (key, value) = key_value
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected KEY=VALUE format"))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("secret name must not be empty (expected KEY=VALUE format)");
    }
    Ok((key, value))
}

pub async fn secret_set(key_value: &str) -> anyhow::Result<()> {
    let (key, value) = parse_key_value(key_value)?;
    let (config, project_id) = load_project()?;

    let client = GcloudClient::new();
    client.set_secret(&project_id, key, value).await?;

    println!("Secret '{key}' set successfully");
    if !config.deploy.secrets.iter().any(|s| s == key) {
        println!("Note: '{key}' is not listed in [deploy].secrets and will not be injected.");
    }
    Ok(())
}

pub async fn secret_list() -> anyhow::Result<()> {
    let (config, project_id) = load_project()?;

    let client = GcloudClient::new();
    let secrets = client.list_secrets(&project_id).await?;

    if secrets.is_empty() {
        println!("No secrets found");
    } else {
        for name in &secrets {
            let marker = if config.deploy.secrets.contains(name) {
                " (injected)"
            } else {
                ""
            };
            println!("{name}{marker}");
        }
    }
    Ok(())
}

pub async fn secret_delete(key: &str, skip_confirm: bool) -> anyhow::Result<()> {
    let (_, project_id) = load_project()?;

    if !skip_confirm && !super::confirm(&format!("Delete secret '{key}'?"))? {
        println!("Aborted.");
        return Ok(());
    }

    let client = GcloudClient::new();
    client.delete_secret(&project_id, key).await?;

    println!("Secret '{key}' deleted");
    Ok(())
}
