//! Locating the worker binary via `cargo metadata`.
//!
//! The image builder needs two facts from Cargo: which package owns the
//! worker, and which of its binaries becomes the container's `app`.
//! Both come from the metadata protocol so that workspace inheritance
//! (`version.workspace = true`) and `default-run` are honored.

use cargo_metadata::{MetadataCommand, TargetKind};
use std::path::{Path, PathBuf};

/// A binary target in the worker package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerBinary {
    /// Binary name (used with `cargo build --bin <name>`)
    pub name: String,
    /// Absolute path to the source file
    pub src_path: PathBuf,
}

/// The Cargo package that is built into the image.
///
/// # Examples
///
/// ```no_run
/// use pcosync_core::WorkerPackage;
/// use std::path::Path;
///
/// let pkg = WorkerPackage::discover(Path::new("crates/pcosync")).unwrap();
/// println!("building {} v{} (bin {})", pkg.name, pkg.version, pkg.binary);
/// ```
#[derive(Debug, Clone)]
pub struct WorkerPackage {
    /// Package name from `[package].name`
    pub name: String,
    /// Resolved version
    pub version: String,
    /// Absolute path to the package's `Cargo.toml`
    pub manifest_path: PathBuf,
    /// Absolute path to the package directory
    pub package_dir: PathBuf,
    /// Absolute path to the workspace root directory
    pub workspace_root: PathBuf,
    /// All binary targets in this package
    pub binaries: Vec<WorkerBinary>,
    /// The binary copied into the image.
    ///
    /// **Invariant:** matches a name in [`binaries`](Self::binaries).
    pub binary: String,
}

impl WorkerPackage {
    /// Discover the package whose manifest lives in `package_dir`.
    ///
    /// # Errors
    ///
    /// - [`Error::CargoMetadata`](crate::Error::CargoMetadata) if `cargo metadata` fails
    /// - [`Error::NoPackageInDir`](crate::Error::NoPackageInDir) for a virtual workspace root
    /// - [`Error::NoBinaryTarget`](crate::Error::NoBinaryTarget) if the package has no binaries
    /// - [`Error::MultipleBinaries`](crate::Error::MultipleBinaries) if the choice is ambiguous
    pub fn discover(package_dir: &Path) -> crate::Result<Self> {
        let manifest_path = package_dir.join("Cargo.toml");
        tracing::debug!(path = %manifest_path.display(), "running cargo metadata");

        let metadata = MetadataCommand::new()
            .manifest_path(&manifest_path)
            .no_deps()
            .exec()
            .map_err(|e| crate::Error::CargoMetadata {
                manifest_path: manifest_path.clone(),
                detail: e.to_string(),
            })?;

        let workspace_root = PathBuf::from(metadata.workspace_root.as_std_path());

        let canonical_dir =
            package_dir
                .canonicalize()
                .map_err(|e| crate::Error::PackageDirResolve {
                    path: package_dir.to_path_buf(),
                    source: e,
                })?;

        let package = metadata
            .packages
            .iter()
            .find(|p| manifest_dir_matches(p.manifest_path.as_std_path(), &canonical_dir))
            .ok_or_else(|| crate::Error::NoPackageInDir {
                dir: canonical_dir.clone(),
                workspace_members: metadata
                    .packages
                    .iter()
                    .filter(|p| metadata.workspace_members.contains(&p.id))
                    .map(|p| p.name.to_string())
                    .collect(),
            })?;

        let binaries: Vec<WorkerBinary> = package
            .targets
            .iter()
            .filter(|t| t.kind.contains(&TargetKind::Bin))
            .map(|t| WorkerBinary {
                name: t.name.clone(),
                src_path: PathBuf::from(t.src_path.as_std_path()),
            })
            .collect();

        let binary = select_binary(&binaries, package.default_run.as_deref(), &package.name)?;

        let pkg_manifest = PathBuf::from(package.manifest_path.as_std_path());
        let pkg_dir = pkg_manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| canonical_dir.clone());

        tracing::debug!(
            name = %package.name,
            version = %package.version,
            binary = %binary,
            binaries = binaries.len(),
            "worker package discovered"
        );

        Ok(Self {
            name: package.name.to_string(),
            version: package.version.to_string(),
            manifest_path: pkg_manifest,
            package_dir: pkg_dir,
            workspace_root,
            binaries,
            binary,
        })
    }
}

fn manifest_dir_matches(manifest: &Path, canonical_dir: &Path) -> bool {
    let Some(dir) = manifest.parent() else {
        return false;
    };
    match dir.canonicalize() {
        Ok(c) => c == canonical_dir,
        Err(e) => {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "failed to canonicalize manifest parent; skipping package"
            );
            false
        }
    }
}

/// Pick the binary built into the image.
///
/// Priority:
/// 1. `default-run` from Cargo.toml
/// 2. The only binary
/// 3. The binary named after the package
fn select_binary(
    binaries: &[WorkerBinary],
    default_run: Option<&str>,
    package_name: &str,
) -> crate::Result<String> {
    if let Some(name) = default_run
        && binaries.iter().any(|b| b.name == name)
    {
        return Ok(name.to_owned());
    }

    match binaries {
        [] => Err(crate::Error::NoBinaryTarget {
            package: package_name.to_owned(),
        }),
        [only] => Ok(only.name.clone()),
        _ if binaries.iter().any(|b| b.name == package_name) => Ok(package_name.to_owned()),
        _ => Err(crate::Error::MultipleBinaries {
            names: binaries.iter().map(|b| b.name.clone()).collect(),
        }),
    }
}
