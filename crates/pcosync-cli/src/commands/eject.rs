use pcosync_build::dockerfile::DockerfileGenerator;
use pcosync_core::{PcosyncConfig, WorkerPackage};

pub async fn eject() -> anyhow::Result<()> {
    let project_dir = super::project_dir();
    let config = PcosyncConfig::load(&project_dir)?;
    let package = WorkerPackage::discover(&project_dir.join(&config.build.package_dir))?;

    let dockerfile = DockerfileGenerator::new(&config, &package.binary).render()?;
    pcosync_build::eject::eject(&project_dir, &dockerfile)?;

    println!("Ejected build config to .pcosync/Dockerfile");
    println!("You can now edit it directly. pcosync deploy will use this file.");
    Ok(())
}
