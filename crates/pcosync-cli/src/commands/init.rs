use std::path::Path;

use pcosync_core::CONFIG_FILE;

const CONFIG_TEMPLATE: &str = r#"[project]
# name = "pcosync"
# region = "us-central1"
# gcp_project_id = "your-project-id"

[build]
# Directory of the package that owns the worker binary
# package_dir = "."
# Extra files copied next to the binary (none by default)
# include = []

[deploy]
# service: GET / starts a sync in the background
# function: GET / waits for the sync and reports the outcome
# job: one sync per execution
# target = "service"
# secrets = ["CLIENT_ID", "CLIENT_SECRET", "BQ_DATASET"]

[cloud_run]
# memory = "512Mi"
# cpu = 1
# max_instances = 10
# timeout = "3600s"
"#;

/// Keys only. Values belong in `.env` (never committed) or Secret Manager.
const ENV_EXAMPLE: &str = "CLIENT_ID=
CLIENT_SECRET=
BQ_DATASET=
# GOOGLE_CLOUD_PROJECT=
# TRIGGER_KEY=
# SYNC_LOOKBACK_DAYS=1
";

const GITIGNORE_ENTRIES: &[&str] = &[".env", ".pcosync-bundle/"];

/// Initialize pcosync in an existing Rust project.
pub async fn init_project() -> anyhow::Result<()> {
    if !Path::new("Cargo.toml").exists() {
        anyhow::bail!("Cargo.toml not found. Run this command from a Rust project root.");
    }

    let mut created = Vec::new();

    let config_path = Path::new(CONFIG_FILE);
    if config_path.exists() {
        eprintln!("{CONFIG_FILE} already exists, skipping");
    } else {
        std::fs::write(config_path, CONFIG_TEMPLATE)?;
        created.push(CONFIG_FILE);
    }

    let env_example_path = Path::new(".env.example");
    if env_example_path.exists() {
        eprintln!(".env.example already exists, skipping");
    } else {
        std::fs::write(env_example_path, ENV_EXAMPLE)?;
        created.push(".env.example");
    }

    let gitignore_path = Path::new(".gitignore");
    let existing = if gitignore_path.exists() {
        std::fs::read_to_string(gitignore_path)?
    } else {
        String::new()
    };
    let updated = with_ignored(&existing, GITIGNORE_ENTRIES);
    if updated != existing {
        std::fs::write(gitignore_path, updated)?;
        created.push(".gitignore entries");
    }

    if created.is_empty() {
        println!("Nothing to create, already initialized.");
    } else {
        for f in &created {
            println!("Created {f}");
        }
    }

    println!();
    println!("Next steps:");
    println!();
    println!("  1. Set gcp_project_id in {CONFIG_FILE}");
    println!();
    println!("  2. For local runs:");
    println!("     cp .env.example .env");
    println!();
    println!("  3. Store runtime secrets:");
    println!("     pcosync secret set CLIENT_ID=...");
    println!("     pcosync secret set CLIENT_SECRET=...");
    println!("     pcosync secret set BQ_DATASET=project.dataset");
    println!();
    println!("  4. Deploy:");
    println!("     pcosync deploy");

    Ok(())
}

/// Append each entry missing from a `.gitignore` body.
fn with_ignored(existing: &str, entries: &[&str]) -> String {
    let mut out = existing.to_owned();
    for entry in entries {
        if existing.lines().any(|l| l.trim() == *entry) {
            continue;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(entry);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_example_has_no_values() {
        for line in ENV_EXAMPLE.lines().filter(|l| !l.starts_with('#')) {
            assert!(line.ends_with('='), "value present in {line:?}");
        }
    }

    #[test]
    fn gitignore_gains_missing_entries() {
        assert_eq!(
            with_ignored("target", GITIGNORE_ENTRIES),
            "target\n.env\n.pcosync-bundle/\n"
        );
    }

    #[test]
    fn gitignore_entries_are_not_duplicated() {
        let existing = "/target\n.env\n.pcosync-bundle/\n";
        assert_eq!(with_ignored(existing, GITIGNORE_ENTRIES), existing);
    }

    #[test]
    fn config_template_parses() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), CONFIG_TEMPLATE).unwrap();
        let config = pcosync_core::PcosyncConfig::load(dir.path()).unwrap();
        assert_eq!(config.deploy.target, pcosync_core::DeployTarget::Service);
    }
}
