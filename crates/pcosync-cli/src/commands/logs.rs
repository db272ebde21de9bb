use pcosync_cloud::GcloudClient;

use super::Deployment;

pub async fn logs(tail: u32) -> anyhow::Result<()> {
    let deployment = Deployment::load(&super::project_dir())?;

    let client = GcloudClient::new();
    client
        .read_logs(&deployment.run_target(), deployment.run_kind(), tail)
        .await?;

    Ok(())
}
