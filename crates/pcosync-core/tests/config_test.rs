use pcosync_core::{DeployTarget, PcosyncConfig};
use tempfile::TempDir;

fn write_config(dir: &std::path::Path, toml: &str) {
    std::fs::write(dir.join("pcosync.toml"), toml).unwrap();
}

#[test]
fn load_returns_defaults_when_no_config_file() {
    let tmp = TempDir::new().unwrap();
    let config = PcosyncConfig::load(tmp.path()).unwrap();

    assert_eq!(config.project.region, "us-central1");
    assert!(config.project.name.is_none());
    assert!(config.project.gcp_project_id.is_none());
    assert_eq!(config.build.base_image, "rust:1.88-bookworm");
    assert_eq!(config.build.runtime_image, "gcr.io/distroless/cc-debian12");
    assert_eq!(config.build.package_dir, std::path::PathBuf::from("."));
    assert!(config.build.extra_packages.is_empty());
    assert_eq!(config.deploy.target, DeployTarget::Service);
    assert_eq!(
        config.deploy.secrets,
        vec!["CLIENT_ID", "CLIENT_SECRET", "BQ_DATASET"]
    );
    assert_eq!(config.cloud_run.memory, "512Mi");
    assert_eq!(config.cloud_run.cpu, 1);
    assert_eq!(config.cloud_run.min_instances, 0);
    assert_eq!(config.cloud_run.max_instances, 10);
    assert_eq!(config.cloud_run.concurrency, 80);
    assert_eq!(config.cloud_run.port, 8080);
    assert!(config.cloud_run.allow_unauthenticated);
    assert_eq!(config.cloud_run.timeout, "3600s");
    assert_eq!(config.cloud_run.max_retries, 1);
}

#[test]
fn load_parses_full_config() {
    let tmp = TempDir::new().unwrap();
    write_config(
        tmp.path(),
        r#"
[project]
name = "giving-sync"
region = "us-east4"
gcp_project_id = "church-data"

[build]
base_image = "rust:1.85-slim"
runtime_image = "debian:bookworm-slim"
extra_packages = ["ca-certificates"]
cargo_chef_version = "0.1.70"
package_dir = "crates/pcosync"

[deploy]
target = "job"
secrets = ["CLIENT_ID", "CLIENT_SECRET"]

[cloud_run]
memory = "1Gi"
cpu = 2
min_instances = 1
max_instances = 3
concurrency = 1
port = 9000
allow_unauthenticated = false
timeout = "900s"
max_retries = 3
"#,
    );

    let config = PcosyncConfig::load(tmp.path()).unwrap();

    assert_eq!(config.project.name.as_deref(), Some("giving-sync"));
    assert_eq!(config.project.region, "us-east4");
    assert_eq!(config.gcp_project_id().unwrap(), "church-data");
    assert_eq!(config.build.base_image, "rust:1.85-slim");
    assert_eq!(config.build.runtime_image, "debian:bookworm-slim");
    assert_eq!(config.build.extra_packages, vec!["ca-certificates"]);
    assert_eq!(config.build.cargo_chef_version, "0.1.70");
    assert_eq!(
        config.build.package_dir,
        std::path::PathBuf::from("crates/pcosync")
    );
    assert_eq!(config.deploy.target, DeployTarget::Job);
    assert_eq!(config.deploy.secrets, vec!["CLIENT_ID", "CLIENT_SECRET"]);
    assert_eq!(config.cloud_run.memory, "1Gi");
    assert_eq!(config.cloud_run.cpu, 2);
    assert_eq!(config.cloud_run.min_instances, 1);
    assert_eq!(config.cloud_run.max_instances, 3);
    assert_eq!(config.cloud_run.concurrency, 1);
    assert_eq!(config.cloud_run.port, 9000);
    assert!(!config.cloud_run.allow_unauthenticated);
    assert_eq!(config.cloud_run.timeout, "900s");
    assert_eq!(config.cloud_run.max_retries, 3);
}

#[test]
fn load_partial_config_fills_defaults() {
    let tmp = TempDir::new().unwrap();
    write_config(
        tmp.path(),
        r#"
[deploy]
target = "function"
"#,
    );

    let config = PcosyncConfig::load(tmp.path()).unwrap();

    assert_eq!(config.deploy.target, DeployTarget::Function);
    assert_eq!(config.deploy.secrets.len(), 3);
    assert_eq!(config.project.region, "us-central1");
    assert_eq!(config.cloud_run.port, 8080);
}

#[test]
fn load_unknown_target_is_parse_error() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "[deploy]\ntarget = \"lambda\"\n");

    let err = PcosyncConfig::load(tmp.path()).unwrap_err().to_string();
    assert!(err.contains("parse"), "got: {err}");
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "not valid {{{{ toml");

    let err = PcosyncConfig::load(tmp.path()).unwrap_err().to_string();
    assert!(err.contains("parse"));
}

#[test]
fn load_empty_config_returns_defaults() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "");

    let config = PcosyncConfig::load(tmp.path()).unwrap();
    assert_eq!(config.project.region, "us-central1");
}

#[test]
fn missing_project_id_is_reported() {
    let config = PcosyncConfig::default();
    let err = config.gcp_project_id().unwrap_err().to_string();
    assert!(err.contains("gcp_project_id"), "got: {err}");
}

#[test]
fn blank_project_id_counts_as_missing() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "[project]\ngcp_project_id = \"  \"\n");

    let config = PcosyncConfig::load(tmp.path()).unwrap();
    assert!(config.gcp_project_id().is_err());
}

#[test]
fn service_name_falls_back_to_package() {
    let mut config = PcosyncConfig::default();
    assert_eq!(config.service_name("pcosync"), "pcosync");

    config.project.name = Some("giving-sync".to_owned());
    assert_eq!(config.service_name("pcosync"), "giving-sync");
}

// ── include / env ──

#[test]
fn load_include_paths() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "[build]\ninclude = [\"config/\", \"schemas/\"]\n");

    let config = PcosyncConfig::load(tmp.path()).unwrap();
    assert_eq!(config.build.include.unwrap(), vec!["config/", "schemas/"]);
}

#[test]
fn load_rejects_parent_include() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "[build]\ninclude = [\"../secrets\"]\n");

    let err = PcosyncConfig::load(tmp.path()).unwrap_err().to_string();
    assert!(err.contains("../secrets"), "got: {err}");
}

#[test]
fn load_rejects_absolute_include() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "[build]\ninclude = [\"/etc\"]\n");

    assert!(PcosyncConfig::load(tmp.path()).is_err());
}

#[test]
fn load_build_env() {
    let tmp = TempDir::new().unwrap();
    write_config(
        tmp.path(),
        r#"
[build.env]
RUST_LOG = "info"
SYNC_LOOKBACK_DAYS = "2"
"#,
    );

    let config = PcosyncConfig::load(tmp.path()).unwrap();

    assert_eq!(config.build.env.len(), 2);
    assert_eq!(config.build.env["RUST_LOG"], "info");
    assert_eq!(config.build.env["SYNC_LOOKBACK_DAYS"], "2");
}
