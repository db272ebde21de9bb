use pcosync_cloud::GcloudClient;

use super::Deployment;

pub async fn status() -> anyhow::Result<()> {
    let deployment = Deployment::load(&super::project_dir())?;

    let client = GcloudClient::new();
    let output = client
        .describe(&deployment.run_target(), deployment.run_kind())
        .await?;

    println!("{output}");
    Ok(())
}
