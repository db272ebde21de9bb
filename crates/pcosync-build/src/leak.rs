//! Secret leak detection for build artifacts.
//!
//! Deploy refuses to ship a bundle in which any configured secret value
//! appears literally. Values come from the developer's local `.env`, the
//! same place the worker reads them during local runs.

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

/// Values shorter than this are too generic to match meaningfully.
pub const MIN_SECRET_LEN: usize = 4;

/// A named secret value to search for.
pub struct KnownSecret {
    pub name: String,
    pub value: SecretString,
}

impl std::fmt::Debug for KnownSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnownSecret")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// A file that contains a secret value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakFinding {
    /// Path relative to the scanned directory
    pub path: PathBuf,
    /// Name of the secret whose value was found
    pub secret: String,
}

/// Read the values of `names` from a dotenv file.
///
/// A missing file yields no secrets. Names absent from the file, or with
/// empty values, are skipped.
pub fn load_env_secrets(env_file: &Path, names: &[String]) -> Result<Vec<KnownSecret>, LeakError> {
    if !env_file.exists() {
        return Ok(Vec::new());
    }

    let iter = dotenvy::from_path_iter(env_file).map_err(|e| LeakError::EnvFile {
        path: env_file.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mut secrets = Vec::new();
    for item in iter {
        let (key, value) = item.map_err(|e| LeakError::EnvFile {
            path: env_file.to_path_buf(),
            detail: e.to_string(),
        })?;
        if names.iter().any(|n| *n == key) && !value.trim().is_empty() {
            secrets.push(KnownSecret {
                name: key,
                value: SecretString::from(value),
            });
        }
    }
    Ok(secrets)
}

/// Names of the secrets whose values occur in `text`.
pub fn scan_text(text: &str, secrets: &[KnownSecret]) -> Vec<String> {
    scan_bytes(text.as_bytes(), secrets)
}

fn scan_bytes(haystack: &[u8], secrets: &[KnownSecret]) -> Vec<String> {
    secrets
        .iter()
        .filter(|s| {
            let needle = s.value.expose_secret().as_bytes();
            needle.len() >= MIN_SECRET_LEN && contains(haystack, needle)
        })
        .map(|s| s.name.clone())
        .collect()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Scan every file under `dir` for secret values.
pub fn scan_dir(dir: &Path, secrets: &[KnownSecret]) -> Result<Vec<LeakFinding>, LeakError> {
    let mut findings = Vec::new();
    if secrets.is_empty() {
        return Ok(findings);
    }
    walk(dir, Path::new(""), secrets, &mut findings)?;
    if !findings.is_empty() {
        tracing::warn!(count = findings.len(), dir = %dir.display(), "secret values found in bundle");
    }
    Ok(findings)
}

fn walk(
    dir: &Path,
    relative_dir: &Path,
    secrets: &[KnownSecret],
    findings: &mut Vec<LeakFinding>,
) -> Result<(), LeakError> {
    let entries = std::fs::read_dir(dir).map_err(|e| LeakError::Read {
        path: dir.to_path_buf(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| LeakError::Read {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let relative = relative_dir.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| LeakError::Read {
            path: path.clone(),
            source: e,
        })?;

        if file_type.is_dir() {
            walk(&path, &relative, secrets, findings)?;
        } else if file_type.is_file() {
            let bytes = std::fs::read(&path).map_err(|e| LeakError::Read {
                path: path.clone(),
                source: e,
            })?;
            findings.extend(scan_bytes(&bytes, secrets).into_iter().map(|secret| {
                LeakFinding {
                    path: relative.clone(),
                    secret,
                }
            }));
        }
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum LeakError {
    #[error("failed to read env file {path}: {detail}")]
    EnvFile { path: PathBuf, detail: String },
    #[error("failed to read {path} while scanning for secrets")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(name: &str, value: &str) -> KnownSecret {
        KnownSecret {
            name: name.to_owned(),
            value: SecretString::from(value.to_owned()),
        }
    }

    #[test]
    fn finds_literal_value() {
        let secrets = vec![secret("CLIENT_SECRET", "pco_sec_9f8e7d")];
        let hits = scan_text("ENV CLIENT_SECRET=pco_sec_9f8e7d\n", &secrets);
        assert_eq!(hits, vec!["CLIENT_SECRET"]);
    }

    #[test]
    fn ignores_short_values() {
        let secrets = vec![secret("BQ_DATASET", "pco")];
        assert!(scan_text("FROM pco-image", &secrets).is_empty());
    }

    #[test]
    fn debug_output_redacts_value() {
        let s = secret("CLIENT_ID", "app-id-12345");
        let debug = format!("{s:?}");
        assert!(!debug.contains("app-id-12345"));
        assert!(debug.contains("REDACTED"));
    }
}
