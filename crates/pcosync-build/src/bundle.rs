use std::path::{Component, Path, PathBuf};
use std::process::Command;

/// Directory the bundle is assembled in, relative to the project root.
pub const BUNDLE_DIR: &str = ".pcosync-bundle";

/// Top-level directories never shipped to Cloud Build, regardless of
/// .gitignore content.
const ALWAYS_EXCLUDED_DIRS: &[&str] = &[BUNDLE_DIR, ".pcosync", ".git"];

/// Bundles project files for Cloud Build submission.
///
/// Uses `git ls-files` to respect `.gitignore`, then copies all tracked
/// and untracked-but-not-ignored files into `.pcosync-bundle/`.
/// Local env files (`.env`, `.env.*` except `.env.example`) are skipped
/// even when git would include them. The Dockerfile is written last.
pub fn create_bundle(project_dir: &Path, dockerfile_content: &str) -> Result<PathBuf, BundleError> {
    let bundle_dir = project_dir.join(BUNDLE_DIR);

    if bundle_dir.exists() {
        std::fs::remove_dir_all(&bundle_dir).map_err(|e| BundleError::Cleanup {
            path: bundle_dir.clone(),
            source: e,
        })?;
    }
    std::fs::create_dir_all(&bundle_dir).map_err(|e| BundleError::Create {
        path: bundle_dir.clone(),
        source: e,
    })?;

    let files = git_ls_files(project_dir)?;
    let mut copied = 0usize;

    for relative_path in &files {
        if is_excluded(relative_path) {
            tracing::debug!(path = %relative_path.display(), "excluded from bundle");
            continue;
        }

        let src = project_dir.join(relative_path);
        // Deleted-but-tracked files show up in ls-files until committed
        if !src.is_file() {
            continue;
        }
        let dst = bundle_dir.join(relative_path);

        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BundleError::Create {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::copy(&src, &dst).map_err(|e| BundleError::CopyFile {
            path: src,
            source: e,
        })?;
        copied += 1;
    }

    let dockerfile_path = bundle_dir.join("Dockerfile");
    std::fs::write(&dockerfile_path, dockerfile_content).map_err(|e| {
        BundleError::WriteDockerfile {
            path: dockerfile_path.clone(),
            source: e,
        }
    })?;

    tracing::info!(files = copied, dir = %bundle_dir.display(), "bundle created");
    Ok(bundle_dir)
}

/// Remove the local bundle directory if present.
pub fn remove_bundle(project_dir: &Path) -> Result<bool, BundleError> {
    let bundle_dir = project_dir.join(BUNDLE_DIR);
    if !bundle_dir.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(&bundle_dir).map_err(|e| BundleError::Cleanup {
        path: bundle_dir,
        source: e,
    })?;
    Ok(true)
}

/// Whether a project-relative path stays out of the bundle.
pub fn is_excluded(relative_path: &Path) -> bool {
    let first_is_excluded_dir = match relative_path.components().next() {
        Some(Component::Normal(first)) => ALWAYS_EXCLUDED_DIRS.iter().any(|d| first == *d),
        _ => false,
    };
    if first_is_excluded_dir {
        return true;
    }

    relative_path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(is_local_env_file)
}

fn is_local_env_file(name: &str) -> bool {
    name == ".env" || (name.starts_with(".env.") && name != ".env.example")
}

/// Returns the list of files git considers part of the project:
/// tracked files + untracked files that are not .gitignored.
fn git_ls_files(project_dir: &Path) -> Result<Vec<PathBuf>, BundleError> {
    let output = Command::new("git")
        .args(["ls-files", "--cached", "--others", "--exclude-standard"])
        .current_dir(project_dir)
        .output()
        .map_err(|e| BundleError::GitCommand {
            detail: "failed to execute git ls-files".to_owned(),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BundleError::GitFailed {
            detail: format!(
                "git ls-files exited with {}: {}",
                output.status,
                stderr.trim()
            ),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Checks whether the git working tree has uncommitted changes.
pub fn is_dirty(project_dir: &Path) -> Result<bool, BundleError> {
    let output = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(project_dir)
        .output()
        .map_err(|e| BundleError::GitCommand {
            detail: "failed to execute git status".to_owned(),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BundleError::GitFailed {
            detail: format!(
                "git status exited with {}: {}",
                output.status,
                stderr.trim()
            ),
        });
    }

    Ok(!output.stdout.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("failed to clean up bundle directory {path}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create directory {path}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to copy file {path}")]
    CopyFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write Dockerfile at {path}")]
    WriteDockerfile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("git command failed: {detail}")]
    GitCommand {
        detail: String,
        source: std::io::Error,
    },
    #[error("git failed: {detail}")]
    GitFailed { detail: String },
}
