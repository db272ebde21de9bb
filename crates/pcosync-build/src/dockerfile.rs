use pcosync_core::{IMAGE_BINARY, PcosyncConfig};

/// Substrings that mark an environment variable name as sensitive.
/// Matching keys are refused as build-time `ENV` and must be injected
/// at deploy time instead.
const SENSITIVE_KEY_MARKERS: &[&str] = &[
    "SECRET",
    "TOKEN",
    "PASSWORD",
    "CREDENTIAL",
    "CLIENT_ID",
    "API_KEY",
    "PRIVATE_KEY",
];

/// Whether an environment variable name looks like it carries a secret.
///
/// ```
/// use pcosync_build::dockerfile::is_sensitive_key;
///
/// assert!(is_sensitive_key("CLIENT_SECRET"));
/// assert!(is_sensitive_key("pco_access_token"));
/// assert!(!is_sensitive_key("RUST_LOG"));
/// ```
pub fn is_sensitive_key(key: &str) -> bool {
    let upper = key.to_ascii_uppercase();
    SENSITIVE_KEY_MARKERS.iter().any(|m| upper.contains(m))
}

/// Generates the worker image definition: a multi-stage Cargo Chef build
/// with a single runtime entry point.
pub struct DockerfileGenerator<'a> {
    config: &'a PcosyncConfig,
    binary: &'a str,
}

impl<'a> DockerfileGenerator<'a> {
    pub fn new(config: &'a PcosyncConfig, binary: &'a str) -> Self {
        Self { config, binary }
    }

    /// Render the Dockerfile.
    ///
    /// # Errors
    ///
    /// [`DockerfileError::SecretInImage`] if `[build.env]` holds a key that is
    /// a configured secret or looks sensitive.
    pub fn render(&self) -> Result<String, DockerfileError> {
        let build = &self.config.build;
        self.check_env()?;

        let extra_packages = if build.extra_packages.is_empty() {
            String::new()
        } else {
            format!(
                "RUN apt-get update && apt-get install -y {} && rm -rf /var/lib/apt/lists/*\n",
                build.extra_packages.join(" ")
            )
        };

        let runtime_content = match &build.include {
            None => String::new(),
            Some(paths) => paths
                .iter()
                .map(|p| {
                    let dst = p.trim_end_matches('/');
                    format!("COPY --from=builder /app/{dst} ./{dst}\n")
                })
                .collect(),
        };

        let env_lines: String = build
            .env
            .iter()
            .map(|(k, v)| format!("ENV {k}=\"{}\"\n", escape_env_value(v)))
            .collect();

        let cmd = self
            .config
            .deploy
            .target
            .entry_command()
            .iter()
            .map(|a| format!("\"{a}\""))
            .collect::<Vec<_>>()
            .join(", ");

        tracing::debug!(
            binary = %self.binary,
            target = %self.config.deploy.target,
            port = self.config.cloud_run.port,
            "rendering Dockerfile"
        );

        Ok(format!(
            r#"# === Base: cargo-chef installed once ===
FROM {base} AS chef
RUN cargo install cargo-chef --version {chef_version} --locked
WORKDIR /app

# === Stage 1: Planner ===
FROM chef AS planner
COPY . .
RUN cargo chef prepare --recipe-path recipe.json

# === Stage 2: Cacher (dependency build) ===
FROM chef AS cacher
{extra_packages}COPY --from=planner /app/recipe.json recipe.json
RUN cargo chef cook --release --recipe-path recipe.json

# === Stage 3: Builder ===
FROM chef AS builder
{extra_packages}COPY --from=cacher /app/target target
COPY --from=cacher /usr/local/cargo /usr/local/cargo
COPY . .
RUN cargo build --release --bin {binary}

# === Stage 4: Runtime ({target}) ===
FROM {runtime}
WORKDIR /app
COPY --from=builder /app/target/release/{binary} /usr/local/bin/{app}
{runtime_content}{env_lines}EXPOSE {port}
CMD [{cmd}]
"#,
            base = build.base_image,
            chef_version = build.cargo_chef_version,
            runtime = build.runtime_image,
            binary = self.binary,
            app = IMAGE_BINARY,
            target = self.config.deploy.target,
            port = self.config.cloud_run.port,
        ))
    }

    fn check_env(&self) -> Result<(), DockerfileError> {
        let secrets = &self.config.deploy.secrets;
        for (key, value) in &self.config.build.env {
            if !is_env_name(key) {
                return Err(DockerfileError::InvalidEnvKey { key: key.clone() });
            }
            if secrets.iter().any(|s| s == key) || is_sensitive_key(key) {
                return Err(DockerfileError::SecretInImage { key: key.clone() });
            }
            if value.chars().any(char::is_control) {
                return Err(DockerfileError::ControlCharInEnv { key: key.clone() });
            }
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_env_name(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Values are emitted inside double quotes and must stay literal.
fn escape_env_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
}

#[derive(Debug, thiserror::Error)]
pub enum DockerfileError {
    #[error(
        "[build.env] key '{key}' looks like a secret — store it with `pcosync secret set {key}=...` and list it in [deploy].secrets"
    )]
    SecretInImage { key: String },

    #[error("[build.env] key '{key}' is not a valid environment variable name")]
    InvalidEnvKey { key: String },

    #[error("[build.env] value of '{key}' contains a control character")]
    ControlCharInEnv { key: String },
}
