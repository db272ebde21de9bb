use pcosync_core::WorkerPackage;
use tempfile::TempDir;

fn write_package(dir: &std::path::Path, manifest: &str, bins: &[&str]) {
    std::fs::create_dir_all(dir.join("src/bin")).unwrap();
    std::fs::write(dir.join("Cargo.toml"), manifest).unwrap();
    std::fs::write(dir.join("src/main.rs"), "fn main() {}\n").unwrap();
    for bin in bins {
        std::fs::write(dir.join(format!("src/bin/{bin}.rs")), "fn main() {}\n").unwrap();
    }
}

#[test]
fn discover_single_package() {
    let tmp = TempDir::new().unwrap();
    write_package(
        tmp.path(),
        "[package]\nname = \"giving-sync\"\nversion = \"1.2.3\"\nedition = \"2021\"\n",
        &[],
    );

    let pkg = WorkerPackage::discover(tmp.path()).unwrap();

    assert_eq!(pkg.name, "giving-sync");
    assert_eq!(pkg.version, "1.2.3");
    assert_eq!(pkg.binary, "giving-sync");
    assert!(pkg.manifest_path.ends_with("Cargo.toml"));
    assert_eq!(pkg.package_dir, pkg.workspace_root);
}

#[test]
fn discover_workspace_member_with_default_run() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("Cargo.toml"),
        r#"[workspace]
members = ["crates/worker"]

[workspace.package]
version = "0.4.0"
edition = "2021"
"#,
    )
    .unwrap();

    let member = tmp.path().join("crates/worker");
    write_package(
        &member,
        r#"[package]
name = "worker"
version.workspace = true
edition.workspace = true
default-run = "pcosync-worker"

[[bin]]
name = "pcosync-worker"
path = "src/main.rs"

[[bin]]
name = "backfill"
path = "src/bin/backfill.rs"
"#,
        &["backfill"],
    );

    let pkg = WorkerPackage::discover(&member).unwrap();

    assert_eq!(pkg.version, "0.4.0");
    assert_eq!(pkg.binary, "pcosync-worker");
    assert_eq!(pkg.binaries.len(), 2);
    assert_ne!(pkg.package_dir, pkg.workspace_root);
}

#[test]
fn discover_virtual_workspace_root_errors() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("Cargo.toml"),
        "[workspace]\nmembers = [\"worker\"]\n",
    )
    .unwrap();
    write_package(
        &tmp.path().join("worker"),
        "[package]\nname = \"worker\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
        &[],
    );

    let err = WorkerPackage::discover(tmp.path()).unwrap_err().to_string();
    assert!(err.contains("no package found"), "got: {err}");
    assert!(err.contains("worker"), "got: {err}");
}

#[test]
fn discover_library_only_package_errors() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("src")).unwrap();
    std::fs::write(
        tmp.path().join("Cargo.toml"),
        "[package]\nname = \"shared\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
    )
    .unwrap();
    std::fs::write(tmp.path().join("src/lib.rs"), "").unwrap();

    let err = WorkerPackage::discover(tmp.path()).unwrap_err().to_string();
    assert!(err.contains("no binary target"), "got: {err}");
}

#[test]
fn discover_missing_manifest_errors() {
    let tmp = TempDir::new().unwrap();
    let err = WorkerPackage::discover(tmp.path()).unwrap_err().to_string();
    assert!(err.contains("cargo metadata failed"), "got: {err}");
}
